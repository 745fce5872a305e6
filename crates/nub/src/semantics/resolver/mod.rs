use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::ast::{Definition, Program, StructDefinition};
use crate::semantics::symtab::SymbolError;
use crate::semantics::typed_ast::{
    Constant, ExprRef, TypedElse, TypedExpr, TypedField, TypedFunction, TypedGlobal, TypedIf,
    TypedProgram, TypedStmt, TypedStruct,
};
use crate::types::{Signature, Type};

mod resolve_exprs;
mod resolve_stmts;

#[derive(Debug, Error, PartialEq)]
pub enum TypeCheckError {
    #[error("identifier `{0}` is not defined")]
    UndefinedVariable(String),
    #[error("operator `{operator}` expects operands of the same type, found `{left}` and `{right}`")]
    MismatchedOperands {
        operator: &'static str,
        left: Type,
        right: Type,
    },
    #[error("operator `{operator}` expects a numeric operand, found `{found}`")]
    NonNumericOperand { operator: &'static str, found: Type },
    #[error("{context} must be `bool`, found `{found}`")]
    ExpectedBool { context: &'static str, found: Type },
    #[error("function lookup failed: {0}")]
    Symbol(#[from] SymbolError),
    #[error("function `{0}` has no return type and cannot be used as a value")]
    VoidFunctionAsValue(String),
    #[error("function `{function}` returns `{expected}`, but `{found}` was returned")]
    ReturnTypeMismatch {
        function: String,
        expected: Type,
        found: Type,
    },
    #[error("function `{function}` has no return type, but a `{found}` value was returned")]
    UnexpectedReturnValue { function: String, found: Type },
    #[error("function `{function}` must return a `{expected}` value")]
    MissingReturnValue { function: String, expected: Type },
    #[error("function `{function}` declares return type `{expected}` but not every path returns")]
    MissingReturn { function: String, expected: Type },
    #[error("struct `{0}` is not defined")]
    UnknownStruct(String),
    #[error("struct `{0}` is defined more than once")]
    DuplicateStruct(String),
    #[error("struct `{struct_name}` has no field `{field}`")]
    UnknownStructField { struct_name: String, field: String },
    #[error("field `{field}` of struct `{struct_name}` is initialized more than once")]
    DuplicateStructField { struct_name: String, field: String },
    #[error("field `{field}` of struct `{struct_name}` has no default and must be initialized")]
    MissingStructField { struct_name: String, field: String },
    #[error("field `{field}` of struct `{struct_name}` expects `{expected}`, found `{found}`")]
    FieldTypeMismatch {
        struct_name: String,
        field: String,
        expected: Type,
        found: Type,
    },
    #[error("cannot access field `{field}` on non-struct type `{found}`")]
    NotAStruct { field: String, found: Type },
    #[error("variable `{name}` is annotated as `{expected}` but initialized with `{found}`")]
    AnnotationMismatch {
        name: String,
        expected: Type,
        found: Type,
    },
    #[error("cannot assign `{found}` to variable `{name}` of type `{expected}`")]
    AssignmentMismatch {
        name: String,
        expected: Type,
        found: Type,
    },
    #[error("`{name}` is not an array, found `{found}`")]
    NotAnArray { name: String, found: Type },
    #[error("{context} must be an integer, found `{found}`")]
    ExpectedInteger { context: &'static str, found: Type },
    #[error("cannot cast `{from}` to `{to}`")]
    InvalidCast { from: Type, to: Type },
    #[error("literal `{text}` is not a valid `{ty}`")]
    InvalidLiteral { text: String, ty: Type },
    #[error("`break` used outside of a loop")]
    BreakOutsideLoop,
    #[error("`continue` used outside of a loop")]
    ContinueOutsideLoop,
    #[error("only function calls can be used as statements")]
    NotACallStatement,
    #[error("parameter `{name}` of function `{function}` is declared more than once")]
    DuplicateParameter { function: String, name: String },
    #[error("only the last parameter of `{0}` may be variadic")]
    MisplacedVariadic(String),
    #[error("struct defaults construct each other without end: {}", cycle.join(" -> "))]
    RecursiveStructDefault { cycle: Vec<String> },
}

/// Lexical variable scope. Each block gets its own frame chained to the
/// enclosing one; frames are dropped at block exit so bindings can never leak
/// into a sibling block.
#[derive(Debug, Default)]
pub(crate) struct Env<'a> {
    bindings: Vec<(String, Type)>,
    parent: Option<&'a Env<'a>>,
}

impl<'a> Env<'a> {
    pub(crate) fn child(&self) -> Env<'_> {
        Env {
            bindings: Vec::new(),
            parent: Some(self),
        }
    }

    pub(crate) fn bind(&mut self, name: &str, ty: Type) {
        self.bindings.push((name.to_string(), ty));
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Type> {
        let mut env = Some(self);
        while let Some(current) = env {
            if let Some((_, ty)) = current.bindings.iter().rev().find(|(n, _)| n == name) {
                return Some(ty);
            }
            env = current.parent;
        }
        None
    }
}

// Needed for typechecking return / break / continue statements
#[derive(Debug, Clone, Copy)]
pub(crate) struct FunctionContext<'f> {
    signature: &'f Signature,
    loop_depth: usize,
}

impl<'f> FunctionContext<'f> {
    fn enter_loop(self) -> Self {
        FunctionContext {
            loop_depth: self.loop_depth + 1,
            ..self
        }
    }
}

pub(crate) struct Resolver<'p> {
    signatures: Vec<&'p Signature>,
    structs: HashMap<&'p str, &'p StructDefinition>,
    exprs: Vec<TypedExpr>,
}

/// Resolves every expression of the flattened program to a type and checks
/// the statement level rules. Returns a new typed tree; the input is left
/// untouched. Fails on the first violation.
///
/// Order of work:
/// 1. collect struct definitions and function signatures
/// 2. resolve globals in definition order (each may only see earlier globals)
/// 3. resolve struct field defaults against all globals, rejecting defaults
///    that (transitively) construct their own struct
/// 4. resolve function bodies, parameters shadowing globals
pub fn resolve_program(program: &Program) -> Result<TypedProgram, TypeCheckError> {
    let mut resolver = Resolver {
        signatures: Vec::new(),
        structs: HashMap::new(),
        exprs: Vec::new(),
    };

    let mut struct_defs = Vec::new();
    let mut global_defs = Vec::new();
    let mut extern_defs = Vec::new();
    let mut function_defs = Vec::new();
    for definition in program.definitions() {
        match definition {
            Definition::Struct(s) => {
                if resolver.structs.insert(&s.name, s).is_some() {
                    return Err(TypeCheckError::DuplicateStruct(s.name.clone()));
                }
                struct_defs.push(s);
            }
            Definition::GlobalVariable(g) => global_defs.push(g),
            Definition::ExternFunction(e) => {
                resolver.signatures.push(&e.signature);
                extern_defs.push(e);
            }
            Definition::LocalFunction(f) => {
                resolver.signatures.push(&f.signature);
                function_defs.push(f);
            }
        }
    }

    for s in &struct_defs {
        for field in &s.fields {
            resolver.check_type(&field.ty)?;
        }
    }
    for signature in resolver.signatures.clone() {
        resolver.check_signature(signature)?;
    }

    let mut global_env = Env::default();
    let mut globals = Vec::new();
    for g in global_defs {
        let value = resolver.resolve_expr(&g.value, &global_env)?;
        let ty = resolver.exprs[value].expr_type().clone();
        global_env.bind(&g.name, ty.clone());
        globals.push(TypedGlobal {
            name: g.name.clone(),
            ty,
            value,
        });
    }

    let mut structs = Vec::new();
    for s in struct_defs {
        let mut fields = Vec::new();
        for field in &s.fields {
            let default = match &field.default {
                Some(default) => {
                    let value = resolver.resolve_expr(default, &global_env)?;
                    let found = resolver.exprs[value].expr_type();
                    if !found.is_assignable_to(&field.ty) {
                        return Err(TypeCheckError::FieldTypeMismatch {
                            struct_name: s.name.clone(),
                            field: field.name.clone(),
                            expected: field.ty.clone(),
                            found: found.clone(),
                        });
                    }
                    Some(value)
                }
                None => None,
            };
            fields.push(TypedField {
                name: field.name.clone(),
                ty: field.ty.clone(),
                default,
            });
        }
        structs.push(TypedStruct {
            name: s.name.clone(),
            fields,
        });
    }
    check_default_cycles(&resolver.exprs, &structs)?;

    let mut functions = Vec::new();
    for f in function_defs {
        let mut env = global_env.child();
        for param in &f.signature.parameters {
            let ty = if param.variadic {
                Type::array_of(param.ty.clone())
            } else {
                param.ty.clone()
            };
            env.bind(&param.name, ty);
        }

        let ctx = FunctionContext {
            signature: &f.signature,
            loop_depth: 0,
        };
        let body = resolver.resolve_block(&f.body, &env, ctx)?;

        if let Some(expected) = &f.signature.return_type {
            if !always_returns(&resolver.exprs, &body) {
                return Err(TypeCheckError::MissingReturn {
                    function: f.signature.name.clone(),
                    expected: expected.clone(),
                });
            }
        }

        functions.push(TypedFunction {
            signature: f.signature.clone(),
            exported: f.global,
            body,
        });
    }

    Ok(TypedProgram {
        exprs: resolver.exprs,
        structs,
        globals,
        externs: extern_defs.iter().map(|e| e.signature.clone()).collect(),
        functions,
    })
}

impl<'p> Resolver<'p> {
    fn push_expr(&mut self, expr: TypedExpr) -> ExprRef {
        ExprRef::from_push(&mut self.exprs, expr)
    }

    fn expr_type(&self, expr_ref: ExprRef) -> &Type {
        self.exprs[expr_ref].expr_type()
    }

    fn struct_def(&self, name: &str) -> Result<&'p StructDefinition, TypeCheckError> {
        self.structs
            .get(name)
            .copied()
            .ok_or_else(|| TypeCheckError::UnknownStruct(name.to_string()))
    }

    // every struct a type mentions must be defined
    fn check_type(&self, ty: &Type) -> Result<(), TypeCheckError> {
        match ty {
            Type::Primitive(_) => Ok(()),
            Type::Struct(name) => self.struct_def(name).map(|_| ()),
            Type::Array(inner) | Type::Pointer(inner) => self.check_type(inner),
        }
    }

    fn check_signature(&self, signature: &Signature) -> Result<(), TypeCheckError> {
        for (i, param) in signature.parameters.iter().enumerate() {
            if param.variadic && i + 1 != signature.parameters.len() {
                return Err(TypeCheckError::MisplacedVariadic(signature.name.clone()));
            }
            if signature.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(TypeCheckError::DuplicateParameter {
                    function: signature.name.clone(),
                    name: param.name.clone(),
                });
            }
            self.check_type(&param.ty)?;
        }
        if let Some(return_type) = &signature.return_type {
            self.check_type(return_type)?;
        }
        Ok(())
    }
}

// Struct initializers inline the defaults of omitted fields, so a default that
// builds its own struct (directly or through others) would expand forever.
fn check_default_cycles<'a>(exprs: &'a [TypedExpr], structs: &'a [TypedStruct]) -> Result<(), TypeCheckError> {
    let edges: HashMap<&str, Vec<&str>> = structs
        .iter()
        .map(|s| {
            let mut built = Vec::new();
            for default in s.fields.iter().filter_map(|field| field.default) {
                constructed_structs(exprs, default, &mut built);
            }
            (s.name.as_str(), built)
        })
        .collect();

    let mut done = HashSet::new();
    for s in structs {
        visit_defaults(&edges, &s.name, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

fn visit_defaults<'a>(
    edges: &HashMap<&'a str, Vec<&'a str>>,
    name: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Result<(), TypeCheckError> {
    if let Some(start) = path.iter().position(|visited| *visited == name) {
        let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(name.to_string());
        return Err(TypeCheckError::RecursiveStructDefault { cycle });
    }
    if done.contains(name) {
        return Ok(());
    }
    path.push(name);
    for next in edges.get(name).into_iter().flatten() {
        visit_defaults(edges, next, path, done)?;
    }
    path.pop();
    done.insert(name);
    Ok(())
}

// every struct constructed while evaluating `expr`
fn constructed_structs<'a>(exprs: &'a [TypedExpr], expr: ExprRef, out: &mut Vec<&'a str>) {
    match &exprs[expr] {
        TypedExpr::Literal(..) | TypedExpr::Variable(..) => {}
        TypedExpr::Binary(_, _, left, right) => {
            constructed_structs(exprs, *left, out);
            constructed_structs(exprs, *right, out);
        }
        TypedExpr::Unary(_, _, inner)
        | TypedExpr::FieldAccess(_, inner, _)
        | TypedExpr::Cast(_, inner)
        | TypedExpr::ArrayInit(_, inner)
        | TypedExpr::Index(_, _, inner) => constructed_structs(exprs, *inner, out),
        TypedExpr::Call(_, call) => {
            for argument in &call.arguments {
                constructed_structs(exprs, *argument, out);
            }
        }
        TypedExpr::StructInit(ty, initializers) => {
            if let Type::Struct(name) = ty {
                out.push(name);
            }
            for (_, value) in initializers {
                constructed_structs(exprs, *value, out);
            }
        }
    }
}

/// True when control cannot fall off the end of `stmts`: some statement
/// returns on every path, or loops forever.
fn always_returns(exprs: &[TypedExpr], stmts: &[TypedStmt]) -> bool {
    stmts.iter().any(|stmt| stmt_always_returns(exprs, stmt))
}

fn stmt_always_returns(exprs: &[TypedExpr], stmt: &TypedStmt) -> bool {
    match stmt {
        TypedStmt::Return(_) => true,
        TypedStmt::If(if_stmt) => if_always_returns(exprs, if_stmt),
        TypedStmt::While { condition, body } => {
            let forever = matches!(exprs[*condition], TypedExpr::Literal(_, Constant::Bool(true)));
            forever && !breaks_out(body)
        }
        _ => false,
    }
}

fn if_always_returns(exprs: &[TypedExpr], if_stmt: &TypedIf) -> bool {
    let else_returns = match &if_stmt.else_branch {
        Some(TypedElse::ElseIf(else_if)) => if_always_returns(exprs, else_if),
        Some(TypedElse::Block(body)) => always_returns(exprs, body),
        None => false,
    };
    else_returns && always_returns(exprs, &if_stmt.body)
}

// a `break` targeting the loop whose body is `stmts`
fn breaks_out(stmts: &[TypedStmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        TypedStmt::Break => true,
        TypedStmt::If(if_stmt) => if_breaks_out(if_stmt),
        // a nested loop owns its own breaks
        _ => false,
    })
}

fn if_breaks_out(if_stmt: &TypedIf) -> bool {
    breaks_out(&if_stmt.body)
        || match &if_stmt.else_branch {
            Some(TypedElse::ElseIf(else_if)) => if_breaks_out(else_if),
            Some(TypedElse::Block(body)) => breaks_out(body),
            None => false,
        }
}
