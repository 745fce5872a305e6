use crate::ast::{ElseBranch, Expression, IfStatement, Statement};
use crate::semantics::typed_ast::{TypedElse, TypedIf, TypedStmt};

use super::{Env, FunctionContext, Resolver, TypeCheckError};

impl<'p> Resolver<'p> {
    /// Resolves a block in a fresh child scope of `env`. Declarations made
    /// inside are gone once the block is done.
    pub(crate) fn resolve_block(
        &mut self,
        stmts: &[Statement],
        env: &Env,
        ctx: FunctionContext,
    ) -> Result<Vec<TypedStmt>, TypeCheckError> {
        let mut scope = env.child();
        let mut typed = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            typed.push(self.resolve_stmt(stmt, &mut scope, ctx)?);
        }
        Ok(typed)
    }

    fn resolve_stmt(
        &mut self,
        stmt: &Statement,
        scope: &mut Env,
        ctx: FunctionContext,
    ) -> Result<TypedStmt, TypeCheckError> {
        let typed = match stmt {
            Statement::VariableDeclaration {
                name,
                explicit_type,
                value,
            } => {
                // the initializer still sees any outer binding of `name`
                let value = self.resolve_expr(value, scope)?;
                let found = self.expr_type(value).clone();
                let ty = match explicit_type {
                    Some(expected) => {
                        self.check_type(expected)?;
                        if !found.is_assignable_to(expected) {
                            return Err(TypeCheckError::AnnotationMismatch {
                                name: name.clone(),
                                expected: expected.clone(),
                                found,
                            });
                        }
                        expected.clone()
                    }
                    None => found,
                };
                scope.bind(name, ty.clone());
                TypedStmt::Declare {
                    name: name.clone(),
                    ty,
                    value,
                }
            }
            Statement::VariableReassignment { name, value } => {
                let expected = scope
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| TypeCheckError::UndefinedVariable(name.clone()))?;
                let value = self.resolve_expr(value, scope)?;
                let found = self.expr_type(value);
                if !found.is_assignable_to(&expected) {
                    return Err(TypeCheckError::AssignmentMismatch {
                        name: name.clone(),
                        expected,
                        found: found.clone(),
                    });
                }
                TypedStmt::Assign {
                    name: name.clone(),
                    value,
                }
            }
            Statement::ArrayIndexAssignment {
                array,
                index,
                value,
            } => {
                let element = self.array_element_type(array, scope)?;
                let index = self.resolve_expr(index, scope)?;
                self.expect_integer(index, "array index")?;
                let value = self.resolve_expr(value, scope)?;
                let found = self.expr_type(value);
                if !found.is_assignable_to(&element) {
                    return Err(TypeCheckError::AssignmentMismatch {
                        name: array.clone(),
                        expected: element,
                        found: found.clone(),
                    });
                }
                TypedStmt::AssignIndex {
                    array: array.clone(),
                    index,
                    value,
                }
            }
            Statement::If(if_stmt) => TypedStmt::If(self.resolve_if(if_stmt, scope, ctx)?),
            Statement::While { condition, body } => {
                let condition = self.resolve_expr(condition, scope)?;
                self.expect_bool(condition, "while condition")?;
                let body = self.resolve_block(body, scope, ctx.enter_loop())?;
                TypedStmt::While { condition, body }
            }
            Statement::Return(value) => self.resolve_return(value.as_ref(), scope, ctx)?,
            Statement::Break if ctx.loop_depth == 0 => return Err(TypeCheckError::BreakOutsideLoop),
            Statement::Break => TypedStmt::Break,
            Statement::Continue if ctx.loop_depth == 0 => return Err(TypeCheckError::ContinueOutsideLoop),
            Statement::Continue => TypedStmt::Continue,
            Statement::Expression(Expression::FunctionCall { name, arguments }) => {
                let (call, _) = self.resolve_call(name, arguments, scope)?;
                TypedStmt::Call(call)
            }
            Statement::Expression(_) => return Err(TypeCheckError::NotACallStatement),
        };
        Ok(typed)
    }

    fn resolve_if(
        &mut self,
        if_stmt: &IfStatement,
        env: &Env,
        ctx: FunctionContext,
    ) -> Result<TypedIf, TypeCheckError> {
        let condition = self.resolve_expr(&if_stmt.condition, env)?;
        self.expect_bool(condition, "if condition")?;
        let body = self.resolve_block(&if_stmt.body, env, ctx)?;
        let else_branch = match &if_stmt.else_branch {
            Some(ElseBranch::ElseIf(else_if)) => {
                Some(TypedElse::ElseIf(Box::new(self.resolve_if(else_if, env, ctx)?)))
            }
            Some(ElseBranch::Block(stmts)) => Some(TypedElse::Block(self.resolve_block(stmts, env, ctx)?)),
            None => None,
        };
        Ok(TypedIf {
            condition,
            body,
            else_branch,
        })
    }

    fn resolve_return(
        &mut self,
        value: Option<&Expression>,
        env: &Env,
        ctx: FunctionContext,
    ) -> Result<TypedStmt, TypeCheckError> {
        let function = &ctx.signature.name;
        let value = value.map(|v| self.resolve_expr(v, env)).transpose()?;

        match (&ctx.signature.return_type, value) {
            (Some(expected), Some(value)) => {
                let found = self.expr_type(value);
                if !found.is_assignable_to(expected) {
                    return Err(TypeCheckError::ReturnTypeMismatch {
                        function: function.clone(),
                        expected: expected.clone(),
                        found: found.clone(),
                    });
                }
            }
            (Some(expected), None) => {
                return Err(TypeCheckError::MissingReturnValue {
                    function: function.clone(),
                    expected: expected.clone(),
                });
            }
            (None, Some(value)) => {
                return Err(TypeCheckError::UnexpectedReturnValue {
                    function: function.clone(),
                    found: self.expr_type(value).clone(),
                });
            }
            (None, None) => {}
        }
        Ok(TypedStmt::Return(value))
    }
}
