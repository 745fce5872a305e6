use bitflags::bitflags;

use crate::ast::Program;
use crate::codegen::{self, IndexBase};
use crate::error::CompileError;
use crate::labels::LabelGenerator;
use crate::semantics::{SymbolTable, resolve_program};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// NASM x86-64 assembly
    #[default]
    Asm,
    /// block based SSA text
    Ir,
}

bitflags! {
    /// Intermediate state to return next to the generated code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DumpFlags: u8 {
        const TYPED_AST = 0b01;
        const SYMBOLS = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    pub target: Target,
    pub index_base: IndexBase,
    pub dump: DumpFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dumps {
    pub typed_ast: Option<String>,
    pub symbols: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationArtifact {
    pub output: String,
    pub dumps: Dumps,
}

/// Runs resolution, symbol table construction and one backend over `program`.
pub fn compile(program: &Program, options: &CompileOptions) -> Result<CompilationArtifact, CompileError> {
    let typed = resolve_program(program)?;

    let mut labels = LabelGenerator::new();
    let symtab = SymbolTable::build(&typed, &mut labels)?;

    let mut dumps = Dumps::default();
    if options.dump.contains(DumpFlags::TYPED_AST) {
        dumps.typed_ast = Some(format!("{typed:#?}"));
    }
    if options.dump.contains(DumpFlags::SYMBOLS) {
        dumps.symbols = Some(format!("{symtab:#?}"));
    }

    let output = match options.target {
        Target::Asm => codegen::generate_asm(&typed, &symtab, &mut labels, options.index_base)?,
        Target::Ir => codegen::generate_ir(&typed, &symtab, &mut labels, options.index_base)?,
    };
    Ok(CompilationArtifact { output, dumps })
}
