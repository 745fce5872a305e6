// Abstractions over x86-64 (only native target for now), NASM syntax

use std::fmt::{self, Write};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Register {
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
}

impl Register {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Register::Rax => "rax",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
            Register::Rsi => "rsi",
            Register::Rdi => "rdi",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer argument registers of the System V calling convention, in order.
pub(crate) const ARGUMENT_REGISTERS: [Register; 6] = [
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::Rcx,
    Register::R8,
    Register::R9,
];

/// Linux syscall registers; the first one carries the syscall number.
pub(crate) const SYSCALL_REGISTERS: [Register; 7] = [
    Register::Rax,
    Register::Rdi,
    Register::Rsi,
    Register::Rdx,
    Register::R10,
    Register::R8,
    Register::R9,
];

pub(crate) const SYS_EXIT: i64 = 60;

/// Accumulates assembly text line by line.
#[derive(Debug, Default)]
pub(crate) struct AsmWriter {
    text: String,
}

impl AsmWriter {
    pub(crate) fn ins(&mut self, args: fmt::Arguments) {
        // writing into a String cannot fail
        _ = writeln!(self.text, "    {args}");
    }

    pub(crate) fn label(&mut self, label: &str) {
        _ = writeln!(self.text, "{label}:");
    }

    pub(crate) fn directive(&mut self, args: fmt::Arguments) {
        _ = writeln!(self.text, "{args}");
    }

    pub(crate) fn blank(&mut self) {
        self.text.push('\n');
    }

    pub(crate) fn finish(self) -> String {
        self.text
    }
}

/// `emit!(out, "mov {}, {}", dst, src)` appends one indented instruction.
macro_rules! emit {
    ($out:expr, $($arg:tt)*) => {
        $out.ins(format_args!($($arg)*))
    };
}

pub(crate) use emit;
