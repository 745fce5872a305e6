//! Untyped definition tree handed over by the frontend.
//!
//! Lexing, parsing and module discovery happen outside of this crate; they
//! produce a [`Program`] whose expressions carry no resolved types yet. The
//! tree is never mutated by later stages, the resolver builds a separate typed
//! tree from it.

use serde::{Deserialize, Serialize};

use crate::types::{Parameter, PrimitiveKind, Signature, Type};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub modules: Vec<Module>,
}

impl Program {
    pub fn new(modules: Vec<Module>) -> Self {
        Program { modules }
    }

    pub fn single(definitions: Vec<Definition>) -> Self {
        Program {
            modules: vec![Module {
                name: "main".into(),
                imports: Vec::new(),
                definitions,
            }],
        }
    }

    // flattened union of every module's definitions, in module order
    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.modules.iter().flat_map(|m| m.definitions.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    // only consulted by the module loader
    pub imports: Vec<String>,
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Definition {
    GlobalVariable(GlobalVariableDefinition),
    ExternFunction(ExternFunctionDefinition),
    LocalFunction(LocalFunctionDefinition),
    Struct(StructDefinition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariableDefinition {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternFunctionDefinition {
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalFunctionDefinition {
    pub signature: Signature,
    pub body: Vec<Statement>,
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDefinition {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        !self.is_arithmetic()
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Not,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Not => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal {
        text: String,
        kind: PrimitiveKind,
    },
    Identifier(String),
    Binary {
        left: Box<Expression>,
        operator: BinaryOperator,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    FunctionCall {
        name: String,
        arguments: Vec<Expression>,
    },
    StructInitializer {
        struct_name: String,
        fields: Vec<(String, Expression)>,
    },
    StructFieldAccessor {
        base: Box<Expression>,
        field: String,
    },
    Cast {
        target: Type,
        expression: Box<Expression>,
    },
    ArrayInitializer {
        length: Box<Expression>,
        inner_type: Type,
    },
    ArrayIndexAccess {
        array: String,
        index: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    VariableDeclaration {
        name: String,
        explicit_type: Option<Type>,
        value: Expression,
    },
    VariableReassignment {
        name: String,
        value: Expression,
    },
    ArrayIndexAssignment {
        array: String,
        index: Expression,
        value: Expression,
    },
    If(IfStatement),
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    Break,
    Continue,
    // only function calls are valid expression statements
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub else_branch: Option<ElseBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElseBranch {
    ElseIf(Box<IfStatement>),
    Block(Vec<Statement>),
}

// Builders used by frontends and tests to assemble trees without spelling out
// every box.

impl Expression {
    pub fn literal(text: impl Into<String>, kind: PrimitiveKind) -> Self {
        Expression::Literal {
            text: text.into(),
            kind,
        }
    }

    pub fn int(value: i64) -> Self {
        Expression::literal(value.to_string(), PrimitiveKind::I64)
    }

    pub fn bool(value: bool) -> Self {
        Expression::literal(value.to_string(), PrimitiveKind::Bool)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::literal(value, PrimitiveKind::String)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Self {
        Expression::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    pub fn unary(operator: UnaryOperator, operand: Expression) -> Self {
        Expression::Unary {
            operator,
            operand: Box::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name: name.into(),
            arguments,
        }
    }

    pub fn new_struct(struct_name: impl Into<String>, fields: Vec<(&str, Expression)>) -> Self {
        Expression::StructInitializer {
            struct_name: struct_name.into(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn field(base: Expression, field: impl Into<String>) -> Self {
        Expression::StructFieldAccessor {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn cast(target: Type, expression: Expression) -> Self {
        Expression::Cast {
            target,
            expression: Box::new(expression),
        }
    }

    pub fn new_array(length: Expression, inner_type: Type) -> Self {
        Expression::ArrayInitializer {
            length: Box::new(length),
            inner_type,
        }
    }

    pub fn index(array: impl Into<String>, index: Expression) -> Self {
        Expression::ArrayIndexAccess {
            array: array.into(),
            index: Box::new(index),
        }
    }
}

impl Statement {
    pub fn let_(name: impl Into<String>, value: Expression) -> Self {
        Statement::VariableDeclaration {
            name: name.into(),
            explicit_type: None,
            value,
        }
    }

    pub fn let_typed(name: impl Into<String>, ty: Type, value: Expression) -> Self {
        Statement::VariableDeclaration {
            name: name.into(),
            explicit_type: Some(ty),
            value,
        }
    }

    pub fn assign(name: impl Into<String>, value: Expression) -> Self {
        Statement::VariableReassignment {
            name: name.into(),
            value,
        }
    }

    pub fn assign_index(array: impl Into<String>, index: Expression, value: Expression) -> Self {
        Statement::ArrayIndexAssignment {
            array: array.into(),
            index,
            value,
        }
    }

    pub fn if_(condition: Expression, body: Vec<Statement>, else_branch: Option<ElseBranch>) -> Self {
        Statement::If(IfStatement {
            condition,
            body,
            else_branch,
        })
    }

    pub fn while_(condition: Expression, body: Vec<Statement>) -> Self {
        Statement::While { condition, body }
    }

    pub fn ret(value: Expression) -> Self {
        Statement::Return(Some(value))
    }

    pub fn call(name: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Statement::Expression(Expression::call(name, arguments))
    }
}

impl Definition {
    pub fn global(name: impl Into<String>, value: Expression) -> Self {
        Definition::GlobalVariable(GlobalVariableDefinition {
            name: name.into(),
            value,
        })
    }

    pub fn extern_func(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: Option<Type>,
    ) -> Self {
        Definition::ExternFunction(ExternFunctionDefinition {
            signature: Signature {
                name: name.into(),
                parameters,
                return_type,
            },
        })
    }

    pub fn func(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: Option<Type>,
        body: Vec<Statement>,
    ) -> Self {
        Definition::LocalFunction(LocalFunctionDefinition {
            signature: Signature {
                name: name.into(),
                parameters,
                return_type,
            },
            body,
            global: false,
        })
    }

    pub fn exported(self) -> Self {
        match self {
            Definition::LocalFunction(func) => Definition::LocalFunction(LocalFunctionDefinition {
                global: true,
                ..func
            }),
            other => other,
        }
    }

    pub fn struct_def(name: impl Into<String>, fields: Vec<StructField>) -> Self {
        Definition::Struct(StructDefinition {
            name: name.into(),
            fields,
        })
    }
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        StructField {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, ty: Type, default: Expression) -> Self {
        StructField {
            name: name.into(),
            ty,
            default: Some(default),
        }
    }
}
