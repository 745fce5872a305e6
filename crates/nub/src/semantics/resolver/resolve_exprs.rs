use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::semantics::symtab::resolve_signature;
use crate::semantics::typed_ast::{CallSite, Constant, ExprRef, MemberRef, TypedExpr};
use crate::types::{PrimitiveKind, Type};

use super::{Env, Resolver, TypeCheckError};

impl<'p> Resolver<'p> {
    pub(crate) fn resolve_expr(&mut self, expr: &Expression, env: &Env) -> Result<ExprRef, TypeCheckError> {
        let typed = match expr {
            Expression::Literal { text, kind } => {
                let constant = parse_literal(text, *kind)?;
                TypedExpr::Literal(Type::Primitive(*kind), constant)
            }
            Expression::Identifier(name) => {
                let ty = env
                    .lookup(name)
                    .ok_or_else(|| TypeCheckError::UndefinedVariable(name.clone()))?;
                TypedExpr::Variable(ty.clone(), name.clone())
            }
            Expression::Binary {
                left,
                operator,
                right,
            } => self.resolve_binary(left, *operator, right, env)?,
            Expression::Unary { operator, operand } => {
                let operand = self.resolve_expr(operand, env)?;
                let ty = self.expr_type(operand).clone();
                match operator {
                    UnaryOperator::Negate if !ty.is_numeric() => {
                        return Err(TypeCheckError::NonNumericOperand {
                            operator: operator.symbol(),
                            found: ty,
                        });
                    }
                    UnaryOperator::Not if ty != Type::BOOL => {
                        return Err(TypeCheckError::ExpectedBool {
                            context: "operand of `!`",
                            found: ty,
                        });
                    }
                    _ => TypedExpr::Unary(ty, *operator, operand),
                }
            }
            Expression::FunctionCall { name, arguments } => {
                let (call, return_type) = self.resolve_call(name, arguments, env)?;
                let ty = return_type.ok_or_else(|| TypeCheckError::VoidFunctionAsValue(name.clone()))?;
                TypedExpr::Call(ty, call)
            }
            Expression::StructInitializer { struct_name, fields } => {
                self.resolve_struct_init(struct_name, fields, env)?
            }
            Expression::StructFieldAccessor { base, field } => {
                let base = self.resolve_expr(base, env)?;
                let Type::Struct(struct_name) = self.expr_type(base).clone() else {
                    return Err(TypeCheckError::NotAStruct {
                        field: field.clone(),
                        found: self.expr_type(base).clone(),
                    });
                };
                let struct_def = self.struct_def(&struct_name)?;
                let (index, field_def) = struct_def
                    .fields
                    .iter()
                    .enumerate()
                    .find(|(_, f)| f.name == *field)
                    .ok_or_else(|| TypeCheckError::UnknownStructField {
                        struct_name: struct_name.clone(),
                        field: field.clone(),
                    })?;
                TypedExpr::FieldAccess(field_def.ty.clone(), base, MemberRef(index as u32))
            }
            Expression::Cast { target, expression } => {
                self.check_type(target)?;
                let source = self.resolve_expr(expression, env)?;
                let from = self.expr_type(source);
                if !is_valid_cast(from, target) {
                    return Err(TypeCheckError::InvalidCast {
                        from: from.clone(),
                        to: target.clone(),
                    });
                }
                TypedExpr::Cast(target.clone(), source)
            }
            Expression::ArrayInitializer { length, inner_type } => {
                self.check_type(inner_type)?;
                let length = self.resolve_expr(length, env)?;
                self.expect_integer(length, "array length")?;
                TypedExpr::ArrayInit(Type::array_of(inner_type.clone()), length)
            }
            Expression::ArrayIndexAccess { array, index } => {
                let element = self.array_element_type(array, env)?;
                let index = self.resolve_expr(index, env)?;
                self.expect_integer(index, "array index")?;
                TypedExpr::Index(element, array.clone(), index)
            }
        };
        Ok(self.push_expr(typed))
    }

    fn resolve_binary(
        &mut self,
        left: &Expression,
        operator: BinaryOperator,
        right: &Expression,
        env: &Env,
    ) -> Result<TypedExpr, TypeCheckError> {
        let left = self.resolve_expr(left, env)?;
        let right = self.resolve_expr(right, env)?;
        let left_ty = self.expr_type(left);
        let right_ty = self.expr_type(right);

        if left_ty != right_ty {
            return Err(TypeCheckError::MismatchedOperands {
                operator: operator.symbol(),
                left: left_ty.clone(),
                right: right_ty.clone(),
            });
        }
        // equality is accepted on every type here; the backends reject the
        // ones they cannot compare
        if (operator.is_arithmetic() || operator.is_ordering()) && !left_ty.is_numeric() {
            return Err(TypeCheckError::NonNumericOperand {
                operator: operator.symbol(),
                found: left_ty.clone(),
            });
        }

        let ty = if operator.is_comparison() {
            Type::BOOL
        } else {
            left_ty.clone()
        };
        Ok(TypedExpr::Binary(ty, operator, left, right))
    }

    /// Resolves a call's arguments and picks the single matching signature.
    /// The return type is `None` for procedures.
    pub(crate) fn resolve_call(
        &mut self,
        name: &str,
        arguments: &[Expression],
        env: &Env,
    ) -> Result<(CallSite, Option<Type>), TypeCheckError> {
        let arguments = arguments
            .iter()
            .map(|arg| self.resolve_expr(arg, env))
            .collect::<Result<Vec<_>, _>>()?;
        let arg_types: Vec<Type> = arguments.iter().map(|arg| self.expr_type(*arg).clone()).collect();

        let signature = resolve_signature(self.signatures.iter().copied(), name, &arg_types)?;
        let call = CallSite {
            name: name.to_string(),
            arguments,
        };
        Ok((call, signature.return_type.clone()))
    }

    fn resolve_struct_init(
        &mut self,
        struct_name: &str,
        fields: &[(String, Expression)],
        env: &Env,
    ) -> Result<TypedExpr, TypeCheckError> {
        let struct_def = self.struct_def(struct_name)?;
        let mut initializers: Vec<(MemberRef, ExprRef)> = Vec::new();

        for (field, value) in fields {
            let index = struct_def
                .fields
                .iter()
                .position(|f| f.name == *field)
                .ok_or_else(|| TypeCheckError::UnknownStructField {
                    struct_name: struct_name.to_string(),
                    field: field.clone(),
                })?;
            let member = MemberRef(index as u32);
            if initializers.iter().any(|(m, _)| *m == member) {
                return Err(TypeCheckError::DuplicateStructField {
                    struct_name: struct_name.to_string(),
                    field: field.clone(),
                });
            }

            let value = self.resolve_expr(value, env)?;
            let expected = &struct_def.fields[index].ty;
            let found = self.expr_type(value);
            if !found.is_assignable_to(expected) {
                return Err(TypeCheckError::FieldTypeMismatch {
                    struct_name: struct_name.to_string(),
                    field: field.clone(),
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
            initializers.push((member, value));
        }

        for (i, field) in struct_def.fields.iter().enumerate() {
            let initialized = initializers.iter().any(|(m, _)| m.index() == i);
            if !initialized && field.default.is_none() {
                return Err(TypeCheckError::MissingStructField {
                    struct_name: struct_name.to_string(),
                    field: field.name.clone(),
                });
            }
        }

        Ok(TypedExpr::StructInit(Type::named(struct_name), initializers))
    }

    pub(crate) fn array_element_type(&self, array: &str, env: &Env) -> Result<Type, TypeCheckError> {
        let ty = env
            .lookup(array)
            .ok_or_else(|| TypeCheckError::UndefinedVariable(array.to_string()))?;
        ty.element_type()
            .cloned()
            .ok_or_else(|| TypeCheckError::NotAnArray {
                name: array.to_string(),
                found: ty.clone(),
            })
    }

    pub(crate) fn expect_integer(&self, expr: ExprRef, context: &'static str) -> Result<(), TypeCheckError> {
        let found = self.expr_type(expr);
        if found.is_integral() {
            Ok(())
        } else {
            Err(TypeCheckError::ExpectedInteger {
                context,
                found: found.clone(),
            })
        }
    }

    pub(crate) fn expect_bool(&self, expr: ExprRef, context: &'static str) -> Result<(), TypeCheckError> {
        let found = self.expr_type(expr);
        if *found == Type::BOOL {
            Ok(())
        } else {
            Err(TypeCheckError::ExpectedBool {
                context,
                found: found.clone(),
            })
        }
    }
}

fn parse_literal(text: &str, kind: PrimitiveKind) -> Result<Constant, TypeCheckError> {
    let invalid = || TypeCheckError::InvalidLiteral {
        text: text.to_string(),
        ty: Type::Primitive(kind),
    };

    let constant = match kind {
        PrimitiveKind::Bool => match text {
            "true" => Constant::Bool(true),
            "false" => Constant::Bool(false),
            _ => return Err(invalid()),
        },
        PrimitiveKind::I8 => Constant::Int(text.parse::<i8>().map_err(|_| invalid())?.into()),
        PrimitiveKind::I16 => Constant::Int(text.parse::<i16>().map_err(|_| invalid())?.into()),
        PrimitiveKind::I32 => Constant::Int(text.parse::<i32>().map_err(|_| invalid())?.into()),
        PrimitiveKind::I64 => Constant::Int(text.parse::<i64>().map_err(|_| invalid())?),
        PrimitiveKind::U8 => Constant::UInt(text.parse::<u8>().map_err(|_| invalid())?.into()),
        PrimitiveKind::U16 => Constant::UInt(text.parse::<u16>().map_err(|_| invalid())?.into()),
        PrimitiveKind::U32 => Constant::UInt(text.parse::<u32>().map_err(|_| invalid())?.into()),
        PrimitiveKind::U64 => Constant::UInt(text.parse::<u64>().map_err(|_| invalid())?),
        // f32 literals are rounded to single precision up front
        PrimitiveKind::F32 => Constant::Float(text.parse::<f32>().map_err(|_| invalid())?.into()),
        PrimitiveKind::F64 => Constant::Float(text.parse::<f64>().map_err(|_| invalid())?),
        PrimitiveKind::String => Constant::Str(text.to_string()),
        PrimitiveKind::Any => return Err(invalid()),
    };
    Ok(constant)
}

fn is_valid_cast(from: &Type, to: &Type) -> bool {
    from == to
        || to.is_any()
        || from.is_any()
        || (from.is_numeric() && to.is_numeric())
        || matches!((from, to), (Type::Pointer(_), Type::Pointer(_)))
}
