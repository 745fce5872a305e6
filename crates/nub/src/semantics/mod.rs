pub mod constexpr;
pub mod resolver;
pub mod symtab;
pub mod typed_ast;

pub use resolver::{TypeCheckError, resolve_program};
pub use symtab::{SymbolError, SymbolTable};
