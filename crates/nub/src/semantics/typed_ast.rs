use nub_util::make_type_idx;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::types::{Signature, Type};

make_type_idx!(pub ExprRef, TypedExpr);

// index of a field within its struct definition
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct MemberRef(pub u32);

impl MemberRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Literal value, already parsed from its source text.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub name: String,
    pub arguments: Vec<ExprRef>,
}

// First member (.0) is always the type of the expression
#[derive(Debug, Clone, PartialEq)]
pub enum TypedExpr {
    Literal(Type, Constant),
    Variable(Type, String),
    Binary(Type, BinaryOperator, ExprRef, ExprRef),
    Unary(Type, UnaryOperator, ExprRef),
    Call(Type, CallSite),
    // explicit initializers in source order; omitted fields use their defaults
    StructInit(Type, Vec<(MemberRef, ExprRef)>),
    FieldAccess(Type, ExprRef, MemberRef),
    // destination type, source expression
    Cast(Type, ExprRef),
    // array type, length expression
    ArrayInit(Type, ExprRef),
    // element type, array variable, index expression
    Index(Type, String, ExprRef),
}

impl TypedExpr {
    pub fn expr_type(&self) -> &Type {
        match self {
            TypedExpr::Literal(ty, _)
            | TypedExpr::Variable(ty, _)
            | TypedExpr::Binary(ty, _, _, _)
            | TypedExpr::Unary(ty, _, _)
            | TypedExpr::Call(ty, _)
            | TypedExpr::StructInit(ty, _)
            | TypedExpr::FieldAccess(ty, _, _)
            | TypedExpr::Cast(ty, _)
            | TypedExpr::ArrayInit(ty, _)
            | TypedExpr::Index(ty, _, _) => ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedStmt {
    Declare {
        name: String,
        ty: Type,
        value: ExprRef,
    },
    Assign {
        name: String,
        value: ExprRef,
    },
    AssignIndex {
        array: String,
        index: ExprRef,
        value: ExprRef,
    },
    If(TypedIf),
    While {
        condition: ExprRef,
        body: Vec<TypedStmt>,
    },
    Return(Option<ExprRef>),
    Break,
    Continue,
    Call(CallSite),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedIf {
    pub condition: ExprRef,
    pub body: Vec<TypedStmt>,
    pub else_branch: Option<TypedElse>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedElse {
    ElseIf(Box<TypedIf>),
    Block(Vec<TypedStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedField {
    pub name: String,
    pub ty: Type,
    pub default: Option<ExprRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedStruct {
    pub name: String,
    pub fields: Vec<TypedField>,
}

impl TypedStruct {
    pub fn member(&self, field: &str) -> Option<MemberRef> {
        self.fields
            .iter()
            .position(|f| f.name == field)
            .map(|i| MemberRef(i as u32))
    }

    pub fn field(&self, member: MemberRef) -> &TypedField {
        &self.fields[member.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedGlobal {
    pub name: String,
    pub ty: Type,
    pub value: ExprRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub signature: Signature,
    pub exported: bool,
    pub body: Vec<TypedStmt>,
}

/// Output of the type resolver. Every expression lives in `exprs` and carries
/// its type from the moment it is pushed; nothing in here is mutated later.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedProgram {
    pub exprs: Vec<TypedExpr>,
    pub structs: Vec<TypedStruct>,
    pub globals: Vec<TypedGlobal>,
    pub externs: Vec<Signature>,
    pub functions: Vec<TypedFunction>,
}

impl TypedProgram {
    pub fn expr(&self, expr_ref: ExprRef) -> &TypedExpr {
        &self.exprs[expr_ref]
    }

    pub fn expr_type(&self, expr_ref: ExprRef) -> &Type {
        self.exprs[expr_ref].expr_type()
    }

    pub fn argument_types(&self, call: &CallSite) -> Vec<Type> {
        call.arguments
            .iter()
            .map(|arg| self.expr_type(*arg).clone())
            .collect()
    }

    pub fn struct_def(&self, name: &str) -> Option<&TypedStruct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&TypedFunction> {
        self.functions.iter().find(|f| f.signature.name == name)
    }
}
