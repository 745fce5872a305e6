use std::collections::HashMap;

use nub_util::make_type_idx;
use thiserror::Error;

use crate::labels::LabelGenerator;
use crate::semantics::typed_ast::{Constant, TypedElse, TypedExpr, TypedIf, TypedProgram, TypedStmt};
use crate::types::{Signature, Type, display_types};

/// Every stack slot is one machine word.
pub const SLOT_SIZE: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("no function `{name}` accepts arguments ({})", display_types(.arg_types))]
    FunctionNotFound { name: String, arg_types: Vec<Type> },
    #[error("call `{name}({})` matches more than one signature: {candidates}", display_types(.arg_types))]
    AmbiguousFunction {
        name: String,
        arg_types: Vec<Type>,
        candidates: String,
    },
    #[error("function `{0}` is defined more than once with the same signature")]
    DuplicateFunction(String),
    #[error("label `{label}` of function `{function}` is already taken by another function")]
    DuplicateLabel { label: String, function: String },
    #[error("global variable `{0}` is defined more than once")]
    DuplicateGlobal(String),
    #[error("global variable `{0}` not found")]
    GlobalNotFound(String),
    #[error("local variable `{name}` not found in function `{function}`")]
    LocalNotFound { function: String, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternFunc {
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalFunc {
    pub signature: Signature,
    pub start_label: String,
    pub end_label: String,
    pub exported: bool,
    // parameters first, then every declaration in pre-order
    pub variables: Vec<LocalVariable>,
}

impl LocalFunc {
    /// Bytes reserved below the frame base, kept 16-byte aligned.
    pub fn stack_allocation(&self) -> u32 {
        (self.variables.len() as u32 * SLOT_SIZE).next_multiple_of(16)
    }

    pub fn parameter_count(&self) -> usize {
        self.signature.parameters.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Func {
    Extern(ExternFunc),
    Local(LocalFunc),
}

make_type_idx!(pub FuncIdx, Func);

impl Func {
    pub fn signature(&self) -> &Signature {
        match self {
            Func::Extern(ExternFunc { signature }) => signature,
            Func::Local(LocalFunc { signature, .. }) => signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature().name
    }

    pub fn start_label(&self) -> &str {
        match self {
            // externs are called by their own symbol name
            Func::Extern(ExternFunc { signature }) => &signature.name,
            Func::Local(LocalFunc { start_label, .. }) => start_label,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub ty: Type,
    // distance below the frame base pointer
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variable<'a> {
    Global(&'a GlobalVariable),
    Local(&'a LocalVariable),
}

impl Variable<'_> {
    pub fn ty(&self) -> &Type {
        match self {
            Variable::Global(global) => &global.ty,
            Variable::Local(local) => &local.ty,
        }
    }
}

/// Immutable registry of every callable, global and string literal of a
/// program, plus the flat frame layout of each local function.
#[derive(Debug, Default, PartialEq)]
pub struct SymbolTable {
    funcs: Vec<Func>,
    globals: Vec<GlobalVariable>,
    // literal text -> data label, in first-appearance order
    strings: Vec<(String, String)>,
    string_labels: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn build(program: &TypedProgram, labels: &mut LabelGenerator) -> Result<SymbolTable, SymbolError> {
        let mut symtab = SymbolTable::default();

        for expr in &program.exprs {
            if let TypedExpr::Literal(_, Constant::Str(text)) = expr {
                symtab.intern_string(text, labels);
            }
        }

        for signature in &program.externs {
            symtab.add_func(
                Func::Extern(ExternFunc {
                    signature: signature.clone(),
                }),
            )?;
        }

        for function in &program.functions {
            let start_label = if function.exported {
                function.signature.name.clone()
            } else {
                labels.function_label(&function.signature.name)
            };
            let end_label = labels.next_label(&format!("{}_end", function.signature.name));

            let local_func = LocalFunc {
                signature: function.signature.clone(),
                start_label,
                end_label,
                exported: function.exported,
                variables: frame_layout(&function.signature, &function.body),
            };
            symtab.add_func(Func::Local(local_func))?;
        }

        for global in &program.globals {
            if symtab.globals.iter().any(|g| g.name == global.name) {
                return Err(SymbolError::DuplicateGlobal(global.name.clone()));
            }
            symtab.globals.push(GlobalVariable {
                name: global.name.clone(),
                ty: global.ty.clone(),
                label: labels.next_label(&format!("global_{}", global.name)),
            });
        }

        Ok(symtab)
    }

    fn intern_string(&mut self, text: &str, labels: &mut LabelGenerator) {
        if !self.string_labels.contains_key(text) {
            self.string_labels.insert(text.to_string(), self.strings.len());
            self.strings.push((text.to_string(), labels.next_label("str")));
        }
    }

    fn add_func(&mut self, func: Func) -> Result<FuncIdx, SymbolError> {
        if self
            .funcs
            .iter()
            .any(|existing| existing.signature().same_identity(func.signature()))
        {
            return Err(SymbolError::DuplicateFunction(func.signature().to_string()));
        }
        // exported functions define their bare name, which externs and other
        // exports also claim
        if matches!(&func, Func::Local(LocalFunc { exported: true, .. }))
            && self.funcs.iter().any(|existing| existing.start_label() == func.start_label())
        {
            return Err(SymbolError::DuplicateLabel {
                label: func.start_label().to_string(),
                function: func.signature().to_string(),
            });
        }
        Ok(FuncIdx::from_push(&mut self.funcs, func))
    }

    pub fn func(&self, idx: FuncIdx) -> &Func {
        &self.funcs[idx]
    }

    pub fn local_funcs(&self) -> impl Iterator<Item = (FuncIdx, &LocalFunc)> {
        self.funcs.iter().enumerate().filter_map(|(i, func)| match func {
            Func::Local(local) => Some((FuncIdx::from_index(i), local)),
            Func::Extern(_) => None,
        })
    }

    pub fn extern_funcs(&self) -> impl Iterator<Item = &ExternFunc> {
        self.funcs.iter().filter_map(|func| match func {
            Func::Extern(ext) => Some(ext),
            Func::Local(_) => None,
        })
    }

    /// Panics when `idx` names an extern.
    pub fn local_func(&self, idx: FuncIdx) -> &LocalFunc {
        match &self.funcs[idx] {
            Func::Local(local) => local,
            Func::Extern(_) => panic!("function index does not refer to a local function"),
        }
    }

    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    pub fn strings(&self) -> &[(String, String)] {
        &self.strings
    }

    pub fn string_label(&self, text: &str) -> &str {
        let idx = self
            .string_labels
            .get(text)
            .copied()
            .expect("string literal was not interned by the symbol table");
        &self.strings[idx].1
    }

    /// Exactly one function may accept `arg_types` under `name`.
    ///
    /// Matching is by compatibility, not type equality: a parameter of type
    /// `any` accepts every argument type. Declaring `f(any)` next to `f(i64)`
    /// is therefore allowed, but a call `f(i64)` matches both and is reported
    /// as ambiguous.
    pub fn resolve_func(&self, name: &str, arg_types: &[Type]) -> Result<FuncIdx, SymbolError> {
        let candidates = self
            .funcs
            .iter()
            .enumerate()
            .map(|(i, func)| (FuncIdx::from_index(i), func.signature()));
        select_unique(candidates, name, arg_types)
    }

    pub fn resolve_global_variable(&self, name: &str) -> Result<&GlobalVariable, SymbolError> {
        self.globals
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| SymbolError::GlobalNotFound(name.to_string()))
    }

    pub fn resolve_local_variable(&self, func: FuncIdx, name: &str) -> Result<&LocalVariable, SymbolError> {
        let local = self.local_func(func);
        local
            .variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| SymbolError::LocalNotFound {
                function: local.signature.name.clone(),
                name: name.to_string(),
            })
    }
}

/// Function lookup shared with the resolver, which runs before the table is
/// built and only has signatures to work with.
pub fn resolve_signature<'a>(
    signatures: impl IntoIterator<Item = &'a Signature>,
    name: &str,
    arg_types: &[Type],
) -> Result<&'a Signature, SymbolError> {
    select_unique(signatures.into_iter().map(|s| (s, s)), name, arg_types)
}

fn select_unique<'a, T>(
    candidates: impl Iterator<Item = (T, &'a Signature)>,
    name: &str,
    arg_types: &[Type],
) -> Result<T, SymbolError> {
    let mut matches: Vec<(T, &Signature)> = candidates
        .filter(|(_, sig)| sig.name == name && sig.accepts(arg_types))
        .collect();

    match matches.len() {
        0 => Err(SymbolError::FunctionNotFound {
            name: name.to_string(),
            arg_types: arg_types.to_vec(),
        }),
        1 => Ok(matches.remove(0).0),
        _ => Err(SymbolError::AmbiguousFunction {
            name: name.to_string(),
            arg_types: arg_types.to_vec(),
            candidates: matches
                .iter()
                .map(|(_, sig)| sig.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

// parameters get the first slots, then one slot per declaration anywhere in
// the body in pre-order; no two declarations share a slot
fn frame_layout(signature: &Signature, body: &[TypedStmt]) -> Vec<LocalVariable> {
    let mut variables = Vec::new();
    for param in &signature.parameters {
        let ty = if param.variadic {
            Type::array_of(param.ty.clone())
        } else {
            param.ty.clone()
        };
        push_slot(&mut variables, &param.name, ty);
    }
    collect_declarations(body, &mut variables);
    variables
}

fn push_slot(variables: &mut Vec<LocalVariable>, name: &str, ty: Type) {
    let offset = (variables.len() as u32 + 1) * SLOT_SIZE;
    variables.push(LocalVariable {
        name: name.to_string(),
        ty,
        offset,
    });
}

fn collect_declarations(stmts: &[TypedStmt], variables: &mut Vec<LocalVariable>) {
    for stmt in stmts {
        match stmt {
            TypedStmt::Declare { name, ty, .. } => push_slot(variables, name, ty.clone()),
            TypedStmt::If(if_stmt) => collect_if_declarations(if_stmt, variables),
            TypedStmt::While { body, .. } => collect_declarations(body, variables),
            TypedStmt::Assign { .. }
            | TypedStmt::AssignIndex { .. }
            | TypedStmt::Return(_)
            | TypedStmt::Break
            | TypedStmt::Continue
            | TypedStmt::Call(_) => {}
        }
    }
}

fn collect_if_declarations(if_stmt: &TypedIf, variables: &mut Vec<LocalVariable>) {
    collect_declarations(&if_stmt.body, variables);
    match &if_stmt.else_branch {
        Some(TypedElse::ElseIf(else_if)) => collect_if_declarations(else_if, variables),
        Some(TypedElse::Block(body)) => collect_declarations(body, variables),
        None => {}
    }
}
