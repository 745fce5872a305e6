use bumpalo::Bump;
use thiserror::Error;

use crate::labels::LabelGenerator;
use crate::semantics::constexpr::{ConstantExprError, fold_globals};
use crate::semantics::symtab::{SymbolError, SymbolTable};
use crate::semantics::typed_ast::{Constant, TypedProgram};
use crate::types::Type;

pub(crate) mod asm;
pub(crate) mod layout;
mod ssa_backend;
mod x86_backend;

/// Runtime entry points the generated code links against.
pub const ALLOC_SYMBOL: &str = "nub_alloc";
pub const STRING_EQUALS_SYMBOL: &str = "nub_string_equals";
pub const OUT_OF_BOUNDS_LABEL: &str = "nub_out_of_bounds";

/// Exit status of a process that indexed an array out of bounds.
pub const OUT_OF_BOUNDS_EXIT_CODE: i64 = 134;

#[derive(Debug, Error, PartialEq)]
pub enum CodegenError {
    #[error("operator `{operator}` is not supported on values of type `{ty}`")]
    UnsupportedComparison { operator: &'static str, ty: Type },
    #[error("initializer of global `{name}` is not a compile-time constant: {source}")]
    NonConstantGlobal {
        name: String,
        #[source]
        source: ConstantExprError,
    },
    #[error("`break` used outside of a loop")]
    BreakOutsideLoop,
    #[error("`continue` used outside of a loop")]
    ContinueOutsideLoop,
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

/// Compile-time array indexing policy, shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexBase {
    #[default]
    Zero,
    One,
}

impl IndexBase {
    pub fn lowest(self) -> i64 {
        match self {
            IndexBase::Zero => 0,
            IndexBase::One => 1,
        }
    }
}

/// Emits NASM x86-64 assembly for a resolved program.
pub fn generate_asm(
    program: &TypedProgram,
    symtab: &SymbolTable,
    labels: &mut LabelGenerator,
    index_base: IndexBase,
) -> Result<String, CodegenError> {
    let arena = Bump::new();
    let layouts = layout::compute_layouts(&arena, &program.structs);
    let globals = folded_globals(program)?;
    x86_backend::X86Backend::new(program, symtab, labels, &layouts, index_base).generate(&globals)
}

/// Emits the block-based SSA text form for a resolved program.
pub fn generate_ir(
    program: &TypedProgram,
    symtab: &SymbolTable,
    labels: &mut LabelGenerator,
    index_base: IndexBase,
) -> Result<String, CodegenError> {
    let arena = Bump::new();
    let layouts = layout::compute_layouts(&arena, &program.structs);
    let globals = folded_globals(program)?;
    ssa_backend::SsaBackend::new(program, symtab, labels, &layouts, index_base).generate(&globals)
}

// every global is baked into one 8-byte data word
fn folded_globals(program: &TypedProgram) -> Result<Vec<Constant>, CodegenError> {
    fold_globals(program).map_err(|(name, source)| CodegenError::NonConstantGlobal { name, source })
}

/// Raw 64-bit data word for a folded constant. Strings are emitted as a
/// reference to their pooled label by the callers.
pub(crate) fn constant_bits(constant: &Constant, ty: &Type) -> u64 {
    match constant {
        Constant::Int(v) => *v as u64,
        Constant::UInt(v) => *v,
        Constant::Bool(b) => *b as u64,
        Constant::Float(v) if *ty == Type::F32 => (*v as f32).to_bits() as u64,
        Constant::Float(v) => v.to_bits(),
        Constant::Str(_) => unreachable!("string constants are emitted as labels"),
    }
}
