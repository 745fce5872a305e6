//! Compiler core for the nub language: type resolution, symbol tables and
//! code generation for x86-64 NASM assembly or a block based SSA text form.

pub mod ast;
pub mod codegen;
pub mod semantics;
pub mod types;

mod compiler;
mod error;
mod labels;

pub use compiler::{CompilationArtifact, CompileOptions, DumpFlags, Dumps, Target, compile};
pub use error::CompileError;
pub use labels::LabelGenerator;
