use thiserror::Error;

use crate::codegen::CodegenError;
use crate::semantics::{SymbolError, TypeCheckError};

/// First failure of a compilation. Every stage stops at its first error and
/// nothing is emitted.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("type error: {0}")]
    TypeCheck(#[from] TypeCheckError),
    #[error("symbol error: {0}")]
    Symbol(#[from] SymbolError),
    #[error("code generation error: {0}")]
    Codegen(#[from] CodegenError),
}
