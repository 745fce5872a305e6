use std::cmp::Ordering;
use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::semantics::typed_ast::{Constant, ExprRef, TypedExpr, TypedProgram};
use crate::types::{PrimitiveKind, Type};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstantExprError {
    #[error("{0} cannot be evaluated at compile time")]
    NotFoldable(&'static str),
    #[error("`{0}` is not a global defined earlier")]
    UnknownGlobal(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("mismatched types")]
    MismatchedTypes,
    #[error("NaN comparison")]
    NaNComparison,
}

impl Constant {
    // bring a raw result back into the range of its declared kind
    fn wrap(self, kind: PrimitiveKind) -> Self {
        match (self, kind) {
            (Constant::Int(v), PrimitiveKind::I8) => Constant::Int(v as i8 as i64),
            (Constant::Int(v), PrimitiveKind::I16) => Constant::Int(v as i16 as i64),
            (Constant::Int(v), PrimitiveKind::I32) => Constant::Int(v as i32 as i64),
            (Constant::UInt(v), PrimitiveKind::U8) => Constant::UInt(v as u8 as u64),
            (Constant::UInt(v), PrimitiveKind::U16) => Constant::UInt(v as u16 as u64),
            (Constant::UInt(v), PrimitiveKind::U32) => Constant::UInt(v as u32 as u64),
            (Constant::Float(v), PrimitiveKind::F32) => Constant::Float(v as f32 as f64),
            (other, _) => other,
        }
    }

    fn convert(self, kind: PrimitiveKind) -> Result<Self, ConstantExprError> {
        let converted = match (self, kind) {
            (Constant::Int(v), k) if k.is_signed() => Constant::Int(v),
            (Constant::UInt(v), k) if k.is_signed() => Constant::Int(v as i64),
            (Constant::Float(v), k) if k.is_signed() => Constant::Int(v as i64),
            (Constant::Int(v), k) if k.is_integral() => Constant::UInt(v as u64),
            (Constant::UInt(v), k) if k.is_integral() => Constant::UInt(v),
            (Constant::Float(v), k) if k.is_integral() => Constant::UInt(v as u64),
            (Constant::Int(v), k) if k.is_fp() => Constant::Float(v as f64),
            (Constant::UInt(v), k) if k.is_fp() => Constant::Float(v as f64),
            (Constant::Float(v), k) if k.is_fp() => Constant::Float(v),
            (same @ Constant::Bool(_), PrimitiveKind::Bool) => same,
            (same @ Constant::Str(_), PrimitiveKind::String) => same,
            _ => return Err(ConstantExprError::MismatchedTypes),
        };
        Ok(converted.wrap(kind))
    }

    fn add(lhs: Self, rhs: Self) -> Result<Self, ConstantExprError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_add(b))),
            (Constant::UInt(a), Constant::UInt(b)) => Ok(Constant::UInt(a.wrapping_add(b))),
            (Constant::Float(a), Constant::Float(b)) => Ok(Constant::Float(a + b)),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    fn sub(lhs: Self, rhs: Self) -> Result<Self, ConstantExprError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_sub(b))),
            (Constant::UInt(a), Constant::UInt(b)) => Ok(Constant::UInt(a.wrapping_sub(b))),
            (Constant::Float(a), Constant::Float(b)) => Ok(Constant::Float(a - b)),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    fn mul(lhs: Self, rhs: Self) -> Result<Self, ConstantExprError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_mul(b))),
            (Constant::UInt(a), Constant::UInt(b)) => Ok(Constant::UInt(a.wrapping_mul(b))),
            (Constant::Float(a), Constant::Float(b)) => Ok(Constant::Float(a * b)),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    // integer division truncates toward zero, same as idiv / div
    fn div(lhs: Self, rhs: Self) -> Result<Self, ConstantExprError> {
        match (lhs, rhs) {
            (Constant::Int(_), Constant::Int(0)) | (Constant::UInt(_), Constant::UInt(0)) => {
                Err(ConstantExprError::DivisionByZero)
            }
            (Constant::Int(a), Constant::Int(b)) => Ok(Constant::Int(a.wrapping_div(b))),
            (Constant::UInt(a), Constant::UInt(b)) => Ok(Constant::UInt(a / b)),
            (Constant::Float(a), Constant::Float(b)) => Ok(Constant::Float(a / b)),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    fn equal(lhs: &Self, rhs: &Self) -> Result<bool, ConstantExprError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(a == b),
            (Constant::UInt(a), Constant::UInt(b)) => Ok(a == b),
            (Constant::Float(a), Constant::Float(b)) => Ok(a == b),
            (Constant::Bool(a), Constant::Bool(b)) => Ok(a == b),
            (Constant::Str(a), Constant::Str(b)) => Ok(a == b),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    fn ord(lhs: &Self, rhs: &Self) -> Result<Ordering, ConstantExprError> {
        match (lhs, rhs) {
            (Constant::Int(a), Constant::Int(b)) => Ok(a.cmp(b)),
            (Constant::UInt(a), Constant::UInt(b)) => Ok(a.cmp(b)),
            (Constant::Float(a), Constant::Float(b)) => {
                a.partial_cmp(b).ok_or(ConstantExprError::NaNComparison)
            }
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    fn neg(self) -> Result<Self, ConstantExprError> {
        match self {
            Constant::Int(a) => Ok(Constant::Int(a.wrapping_neg())),
            Constant::UInt(a) => Ok(Constant::UInt(a.wrapping_neg())),
            Constant::Float(a) => Ok(Constant::Float(-a)),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }

    fn not(self) -> Result<Self, ConstantExprError> {
        match self {
            Constant::Bool(b) => Ok(Constant::Bool(!b)),
            _ => Err(ConstantExprError::MismatchedTypes),
        }
    }
}

/// Evaluates a global initializer at compile time. `folded` holds the values
/// of the globals defined before this one; nothing else may be referenced.
pub fn fold_constant(
    program: &TypedProgram,
    expr: ExprRef,
    folded: &HashMap<String, Constant>,
) -> Result<Constant, ConstantExprError> {
    match program.expr(expr) {
        TypedExpr::Literal(_, constant) => Ok(constant.clone()),
        TypedExpr::Variable(_, name) => folded
            .get(name)
            .cloned()
            .ok_or_else(|| ConstantExprError::UnknownGlobal(name.clone())),
        TypedExpr::Binary(ty, operator, lhs, rhs) => {
            let lhs = fold_constant(program, *lhs, folded)?;
            let rhs = fold_constant(program, *rhs, folded)?;
            let value = match operator {
                BinaryOperator::Plus => Constant::add(lhs, rhs)?,
                BinaryOperator::Minus => Constant::sub(lhs, rhs)?,
                BinaryOperator::Multiply => Constant::mul(lhs, rhs)?,
                BinaryOperator::Divide => Constant::div(lhs, rhs)?,
                BinaryOperator::Equal => Constant::Bool(Constant::equal(&lhs, &rhs)?),
                BinaryOperator::NotEqual => Constant::Bool(!Constant::equal(&lhs, &rhs)?),
                BinaryOperator::LessThan => Constant::Bool(Constant::ord(&lhs, &rhs)?.is_lt()),
                BinaryOperator::LessThanOrEqual => Constant::Bool(Constant::ord(&lhs, &rhs)?.is_le()),
                BinaryOperator::GreaterThan => Constant::Bool(Constant::ord(&lhs, &rhs)?.is_gt()),
                BinaryOperator::GreaterThanOrEqual => {
                    Constant::Bool(Constant::ord(&lhs, &rhs)?.is_ge())
                }
            };
            Ok(wrap_to(value, ty))
        }
        TypedExpr::Unary(ty, operator, operand) => {
            let operand = fold_constant(program, *operand, folded)?;
            let value = match operator {
                UnaryOperator::Negate => operand.neg()?,
                UnaryOperator::Not => operand.not()?,
            };
            Ok(wrap_to(value, ty))
        }
        TypedExpr::Cast(ty, source) => {
            let value = fold_constant(program, *source, folded)?;
            match ty {
                Type::Primitive(PrimitiveKind::Any) => Ok(value),
                Type::Primitive(kind) => value.convert(*kind),
                _ => Err(ConstantExprError::NotFoldable("a non-primitive cast")),
            }
        }
        TypedExpr::Call(..) => Err(ConstantExprError::NotFoldable("a function call")),
        TypedExpr::StructInit(..) => Err(ConstantExprError::NotFoldable("a struct initializer")),
        TypedExpr::FieldAccess(..) => Err(ConstantExprError::NotFoldable("a field access")),
        TypedExpr::ArrayInit(..) => Err(ConstantExprError::NotFoldable("an array initializer")),
        TypedExpr::Index(..) => Err(ConstantExprError::NotFoldable("an array access")),
    }
}

fn wrap_to(value: Constant, ty: &Type) -> Constant {
    match ty.primitive() {
        Some(kind) => value.wrap(kind),
        None => value,
    }
}

/// Folds every global initializer in definition order.
pub fn fold_globals(program: &TypedProgram) -> Result<Vec<Constant>, (String, ConstantExprError)> {
    let mut folded = HashMap::new();
    let mut values = Vec::with_capacity(program.globals.len());
    for global in &program.globals {
        let value = fold_constant(program, global.value, &folded).map_err(|e| (global.name.clone(), e))?;
        folded.insert(global.name.clone(), value.clone());
        values.push(value);
    }
    Ok(values)
}
