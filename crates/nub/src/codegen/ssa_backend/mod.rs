use std::fmt::{self, Write};

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::codegen::asm::emit;
use crate::codegen::layout::{ARRAY_HEADER_SIZE, Layouts, WORD_SIZE};
use crate::codegen::{
    ALLOC_SYMBOL, CodegenError, IndexBase, OUT_OF_BOUNDS_EXIT_CODE, STRING_EQUALS_SYMBOL, constant_bits,
};
use crate::labels::LabelGenerator;
use crate::semantics::symtab::{Func, LocalFunc, SymbolTable};
use crate::semantics::typed_ast::{
    CallSite, Constant, ExprRef, MemberRef, TypedElse, TypedExpr, TypedFunction, TypedIf, TypedProgram, TypedStmt,
};
use crate::types::{PrimitiveKind, Type};

// libc, the IR output is linked through a C toolchain
const EXIT_SYMBOL: &str = "exit";

/// Base class of an IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Word,
    Long,
    Single,
    Double,
}

impl Class {
    fn of(ty: &Type) -> Class {
        match ty.primitive() {
            Some(PrimitiveKind::F32) => Class::Single,
            Some(PrimitiveKind::F64) => Class::Double,
            Some(kind) if kind.bits() <= 32 => Class::Word,
            // strings, any, and every heap reference
            _ => Class::Long,
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Class::Word => "w",
            Class::Long => "l",
            Class::Single => "s",
            Class::Double => "d",
        })
    }
}

// Every variable lives in its own stack slot and is loaded / stored around
// each use; a mem2reg style pass could promote them later.
#[derive(Debug, Clone, Copy)]
enum Slot<'a> {
    Local(usize),
    Global(&'a str),
}

impl fmt::Display for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Local(index) => write!(f, "%v{index}"),
            Slot::Global(label) => write!(f, "${label}"),
        }
    }
}

/// Function bodies are written block by block. Once a block is terminated
/// nothing more is written until the next block label.
#[derive(Debug)]
struct IrWriter {
    text: String,
    reachable: bool,
}

impl IrWriter {
    fn new() -> Self {
        IrWriter {
            text: String::new(),
            reachable: true,
        }
    }

    fn ins(&mut self, args: fmt::Arguments) {
        if self.reachable {
            _ = writeln!(self.text, "    {args}");
        }
    }

    // ret, jmp, jnz, hlt
    fn terminate(&mut self, args: fmt::Arguments) {
        self.ins(args);
        self.reachable = false;
    }

    fn label(&mut self, label: &str) {
        _ = writeln!(self.text, "@{label}");
        self.reachable = true;
    }

    fn directive(&mut self, args: fmt::Arguments) {
        _ = writeln!(self.text, "{args}");
    }

    fn blank(&mut self) {
        self.text.push('\n');
    }

    fn finish(self) -> String {
        self.text
    }
}

struct LowerFunctionContext<'a> {
    func: &'a LocalFunc,
    // innermost scope last; names map to indices into `func.variables`
    scopes: Vec<Vec<(&'a str, usize)>>,
    next_slot: usize,
    break_target: Option<String>,
    continue_target: Option<String>,
    // created by the first bounds check of the function
    out_of_bounds: Option<String>,
}

impl LowerFunctionContext<'_> {
    fn local(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|(n, _)| *n == name).map(|(_, index)| *index))
    }
}

pub(crate) struct SsaBackend<'a, 'arena> {
    program: &'a TypedProgram,
    symtab: &'a SymbolTable,
    labels: &'a mut LabelGenerator,
    layouts: &'a Layouts<'arena>,
    index_base: IndexBase,
    out: IrWriter,
}

impl<'a, 'arena> SsaBackend<'a, 'arena> {
    pub(crate) fn new(
        program: &'a TypedProgram,
        symtab: &'a SymbolTable,
        labels: &'a mut LabelGenerator,
        layouts: &'a Layouts<'arena>,
        index_base: IndexBase,
    ) -> Self {
        SsaBackend {
            program,
            symtab,
            labels,
            layouts,
            index_base,
            out: IrWriter::new(),
        }
    }

    pub(crate) fn generate(mut self, globals: &[Constant]) -> Result<String, CodegenError> {
        let program = self.program;
        let symtab = self.symtab;

        for (text, label) in symtab.strings() {
            let bytes: Vec<String> = text.bytes().chain([0]).map(|b| format!("b {b}")).collect();
            self.out.directive(format_args!("data ${label} = {{ {} }}", bytes.join(", ")));
        }
        for (global, value) in program.globals.iter().zip(globals) {
            let label = &symtab.resolve_global_variable(&global.name)?.label;
            match value {
                Constant::Str(text) => {
                    let string_label = symtab.string_label(text);
                    self.out.directive(format_args!("data ${label} = {{ l ${string_label} }}"));
                }
                other => {
                    let bits = constant_bits(other, &global.ty) as i64;
                    self.out.directive(format_args!("data ${label} = {{ l {bits} }}"));
                }
            }
        }

        for (typed, (_, func)) in program.functions.iter().zip(symtab.local_funcs()) {
            debug_assert_eq!(typed.signature.name, func.signature.name);
            self.generate_function(func, typed)?;
        }

        Ok(self.out.finish())
    }

    fn generate_function(&mut self, func: &'a LocalFunc, typed: &'a TypedFunction) -> Result<(), CodegenError> {
        let parameters = &func.variables[..func.parameter_count()];
        let params: Vec<String> = parameters
            .iter()
            .enumerate()
            .map(|(i, variable)| format!("{} %p{i}", Class::of(&variable.ty)))
            .collect();
        let linkage = if func.exported { "export " } else { "" };
        let return_class = match &func.signature.return_type {
            Some(ty) => format!("{} ", Class::of(ty)),
            None => String::new(),
        };

        self.out.blank();
        self.out.directive(format_args!(
            "{linkage}function {return_class}${}({}) {{",
            func.start_label,
            params.join(", ")
        ));
        self.out.label("start");
        for i in 0..func.variables.len() {
            emit!(self.out, "%v{i} =l alloc8 {WORD_SIZE}");
        }
        let mut bindings = Vec::with_capacity(parameters.len());
        for (i, variable) in parameters.iter().enumerate() {
            emit!(self.out, "store{} %p{i}, %v{i}", Class::of(&variable.ty));
            bindings.push((variable.name.as_str(), i));
        }

        let mut ctx = LowerFunctionContext {
            func,
            scopes: vec![bindings],
            next_slot: parameters.len(),
            break_target: None,
            continue_target: None,
            out_of_bounds: None,
        };
        self.generate_block(&mut ctx, &typed.body)?;
        debug_assert_eq!(ctx.next_slot, func.variables.len());

        // falling off the end of a function with a result cannot happen
        // on any path the resolver accepted
        if func.signature.return_type.is_some() {
            self.out.terminate(format_args!("hlt"));
        } else {
            self.out.terminate(format_args!("ret"));
        }

        if let Some(label) = ctx.out_of_bounds {
            self.out.label(&label);
            emit!(self.out, "call ${EXIT_SYMBOL}(w {OUT_OF_BOUNDS_EXIT_CODE})");
            self.out.terminate(format_args!("hlt"));
        }
        self.out.directive(format_args!("}}"));
        Ok(())
    }

    fn generate_block(&mut self, ctx: &mut LowerFunctionContext<'a>, stmts: &'a [TypedStmt]) -> Result<(), CodegenError> {
        ctx.scopes.push(Vec::new());
        for stmt in stmts {
            self.generate_statement(ctx, stmt)?;
        }
        ctx.scopes.pop();
        Ok(())
    }

    fn generate_statement(&mut self, ctx: &mut LowerFunctionContext<'a>, stmt: &'a TypedStmt) -> Result<(), CodegenError> {
        let program = self.program;
        match stmt {
            TypedStmt::Declare { name, ty, value } => {
                let result = self.generate_expr(ctx, *value)?;
                let result = self.coerce(result, program.expr_type(*value), ty);
                let func = ctx.func;
                let index = ctx.next_slot;
                let variable = &func.variables[index];
                debug_assert_eq!(&variable.name, name);
                ctx.next_slot += 1;
                emit!(self.out, "store{} {result}, %v{index}", Class::of(ty));
                if let Some(scope) = ctx.scopes.last_mut() {
                    scope.push((variable.name.as_str(), index));
                }
            }
            TypedStmt::Assign { name, value } => {
                let result = self.generate_expr(ctx, *value)?;
                let (slot, ty) = self.slot(ctx, name)?;
                let result = self.coerce(result, program.expr_type(*value), ty);
                emit!(self.out, "store{} {result}, {slot}", Class::of(ty));
            }
            TypedStmt::AssignIndex { array, index, value } => {
                let result = self.generate_expr(ctx, *value)?;
                let (_, array_ty) = self.slot(ctx, array)?;
                let Some(element_ty) = array_ty.element_type() else {
                    unreachable!("indexed store into non-array `{array_ty}`");
                };
                let result = self.coerce(result, program.expr_type(*value), element_ty);
                let address = self.generate_element_address(ctx, array, *index)?;
                emit!(self.out, "store{} {result}, {address}", Class::of(element_ty));
            }
            TypedStmt::If(if_stmt) => {
                let end_label = self.labels.next_label("if_end");
                self.generate_if(ctx, if_stmt, &end_label)?;
                self.out.label(&end_label);
            }
            TypedStmt::While { condition, body } => {
                let start_label = self.labels.next_label("while_start");
                let body_label = self.labels.next_label("while_body");
                let end_label = self.labels.next_label("while_end");

                self.out.label(&start_label);
                let condition = self.generate_expr(ctx, *condition)?;
                self.out
                    .terminate(format_args!("jnz {condition}, @{body_label}, @{end_label}"));
                self.out.label(&body_label);

                let old_break_target = ctx.break_target.replace(end_label.clone());
                let old_continue_target = ctx.continue_target.replace(start_label.clone());
                self.generate_block(ctx, body)?;
                ctx.break_target = old_break_target;
                ctx.continue_target = old_continue_target;

                self.out.terminate(format_args!("jmp @{start_label}"));
                self.out.label(&end_label);
            }
            TypedStmt::Return(None) => self.out.terminate(format_args!("ret")),
            TypedStmt::Return(Some(value)) => {
                let func = ctx.func;
                let Some(return_type) = &func.signature.return_type else {
                    unreachable!("value returned from procedure `{}`", func.signature.name);
                };
                let result = self.generate_expr(ctx, *value)?;
                let result = self.coerce(result, program.expr_type(*value), return_type);
                self.out.terminate(format_args!("ret {result}"));
            }
            TypedStmt::Break => {
                let target = ctx.break_target.as_ref().ok_or(CodegenError::BreakOutsideLoop)?;
                self.out.terminate(format_args!("jmp @{target}"));
            }
            TypedStmt::Continue => {
                let target = ctx.continue_target.as_ref().ok_or(CodegenError::ContinueOutsideLoop)?;
                self.out.terminate(format_args!("jmp @{target}"));
            }
            TypedStmt::Call(call) => {
                self.generate_call(ctx, call)?;
            }
        }
        Ok(())
    }

    fn generate_if(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        if_stmt: &'a TypedIf,
        end_label: &str,
    ) -> Result<(), CodegenError> {
        let condition = self.generate_expr(ctx, if_stmt.condition)?;
        let then_label = self.labels.next_label("then");
        let else_label = match &if_stmt.else_branch {
            Some(_) => self.labels.next_label("else"),
            None => end_label.to_string(),
        };
        self.out
            .terminate(format_args!("jnz {condition}, @{then_label}, @{else_label}"));

        self.out.label(&then_label);
        self.generate_block(ctx, &if_stmt.body)?;
        self.out.terminate(format_args!("jmp @{end_label}"));

        let Some(else_branch) = &if_stmt.else_branch else {
            return Ok(());
        };
        self.out.label(&else_label);
        match else_branch {
            TypedElse::ElseIf(else_if) => self.generate_if(ctx, else_if, end_label),
            TypedElse::Block(body) => self.generate_block(ctx, body),
        }
    }

    fn slot(&self, ctx: &LowerFunctionContext<'a>, name: &str) -> Result<(Slot<'a>, &'a Type), CodegenError> {
        if let Some(index) = ctx.local(name) {
            let func = ctx.func;
            return Ok((Slot::Local(index), &func.variables[index].ty));
        }
        let symtab: &'a SymbolTable = self.symtab;
        let global = symtab.resolve_global_variable(name)?;
        Ok((Slot::Global(&global.label), &global.ty))
    }

    // binds a fresh temporary to the result of one instruction
    fn assign(&mut self, class: Class, args: fmt::Arguments) -> String {
        let temp = format!("%{}", self.labels.next_temp());
        emit!(self.out, "{temp} ={class} {args}");
        temp
    }

    /// Moves a value into the class of `to` without changing its meaning.
    /// Only differs from identity around `any`.
    fn coerce(&mut self, value: String, from: &Type, to: &Type) -> String {
        match (Class::of(from), Class::of(to)) {
            (a, b) if a == b => value,
            (Class::Word, Class::Long) => {
                let op = if from.primitive().is_some_and(|k| k.is_signed()) { "extsw" } else { "extuw" };
                self.assign(Class::Long, format_args!("{op} {value}"))
            }
            (Class::Long, Class::Word) => self.assign(Class::Word, format_args!("copy {value}")),
            (Class::Single, Class::Long) => {
                let bits = self.assign(Class::Word, format_args!("cast {value}"));
                self.assign(Class::Long, format_args!("extuw {bits}"))
            }
            (Class::Double, Class::Long)
            | (Class::Long, Class::Double)
            | (Class::Long, Class::Single)
            | (Class::Word, Class::Single)
            | (Class::Single, Class::Word) => self.assign(Class::of(to), format_args!("cast {value}")),
            (a, b) => unreachable!("no reinterpretation from `{from}` ({a}) to `{to}` ({b})"),
        }
    }

    // re-extend a word after an operation on a narrow integer
    fn normalize(&mut self, value: String, kind: PrimitiveKind) -> String {
        let op = match kind {
            PrimitiveKind::I8 => "extsb",
            PrimitiveKind::I16 => "extsh",
            PrimitiveKind::Bool | PrimitiveKind::U8 => "extub",
            PrimitiveKind::U16 => "extuh",
            _ => return value,
        };
        self.assign(Class::Word, format_args!("{op} {value}"))
    }

    /// Returns the temporary holding the result, `None` for procedures.
    fn generate_call(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        call: &'a CallSite,
    ) -> Result<Option<String>, CodegenError> {
        let program = self.program;
        let symtab: &'a SymbolTable = self.symtab;
        let idx = symtab.resolve_func(&call.name, &program.argument_types(call))?;
        let func = symtab.func(idx);
        let signature = func.signature();
        let fixed = signature.fixed_parameters();

        let mut arguments = Vec::with_capacity(call.arguments.len() + 1);
        for (param, argument) in fixed.iter().zip(&call.arguments) {
            let value = self.generate_expr(ctx, *argument)?;
            let value = self.coerce(value, program.expr_type(*argument), &param.ty);
            arguments.push(format!("{} {value}", Class::of(&param.ty)));
        }
        if let Some(variadic) = signature.variadic_parameter() {
            let trailing = &call.arguments[fixed.len()..];
            match func {
                Func::Local(_) => {
                    let array = self.generate_packed_array(ctx, trailing, &variadic.ty)?;
                    arguments.push(format!("l {array}"));
                }
                Func::Extern(_) => {
                    // C varargs: each value is passed in its own class
                    arguments.push("...".to_string());
                    for argument in trailing {
                        let value = self.generate_expr(ctx, *argument)?;
                        arguments.push(format!("{} {value}", Class::of(program.expr_type(*argument))));
                    }
                }
            }
        }

        let target = func.start_label();
        let arguments = arguments.join(", ");
        let Some(return_type) = &signature.return_type else {
            emit!(self.out, "call ${target}({arguments})");
            return Ok(None);
        };
        let result = self.assign(Class::of(return_type), format_args!("call ${target}({arguments})"));
        // C callees leave the upper bits of narrow results undefined
        match (func, return_type.primitive()) {
            (Func::Extern(_), Some(kind)) => Ok(Some(self.normalize(result, kind))),
            _ => Ok(Some(result)),
        }
    }

    fn generate_packed_array(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        exprs: &'a [ExprRef],
        element_ty: &Type,
    ) -> Result<String, CodegenError> {
        let program = self.program;
        let size = ARRAY_HEADER_SIZE + exprs.len() as u32 * WORD_SIZE;
        let array = self.assign(Class::Long, format_args!("call ${ALLOC_SYMBOL}(l {size})"));
        emit!(self.out, "storel {}, {array}", exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            let value = self.generate_expr(ctx, *expr)?;
            let value = self.coerce(value, program.expr_type(*expr), element_ty);
            let address = self.offset_address(&array, ARRAY_HEADER_SIZE + i as u32 * WORD_SIZE);
            emit!(self.out, "store{} {value}, {address}", Class::of(element_ty));
        }
        Ok(array)
    }

    fn offset_address(&mut self, base: &str, offset: u32) -> String {
        if offset == 0 {
            return base.to_string();
        }
        self.assign(Class::Long, format_args!("add {base}, {offset}"))
    }

    // bounds checked; both failed checks branch to the shared exit block
    fn generate_element_address(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        array: &str,
        index: ExprRef,
    ) -> Result<String, CodegenError> {
        let program = self.program;
        let position = self.generate_expr(ctx, index)?;
        let position = self.coerce(position, program.expr_type(index), &Type::I64);
        let (slot, _) = self.slot(ctx, array)?;
        let base = self.assign(Class::Long, format_args!("loadl {slot}"));
        let length = self.assign(Class::Long, format_args!("loadl {base}"));

        let out_of_bounds = ctx
            .out_of_bounds
            .get_or_insert_with(|| self.labels.next_label("out_of_bounds"))
            .clone();

        let lowest = self.index_base.lowest();
        let below = self.assign(Class::Word, format_args!("csltl {position}, {lowest}"));
        let next = self.labels.next_label("in_bounds");
        self.out.terminate(format_args!("jnz {below}, @{out_of_bounds}, @{next}"));
        self.out.label(&next);

        let (past_end, displacement) = match self.index_base {
            IndexBase::Zero => ("csgel", ARRAY_HEADER_SIZE),
            IndexBase::One => ("csgtl", 0),
        };
        let above = self.assign(Class::Word, format_args!("{past_end} {position}, {length}"));
        let next = self.labels.next_label("in_bounds");
        self.out.terminate(format_args!("jnz {above}, @{out_of_bounds}, @{next}"));
        self.out.label(&next);

        let scaled = self.assign(Class::Long, format_args!("mul {position}, {WORD_SIZE}"));
        let address = self.assign(Class::Long, format_args!("add {base}, {scaled}"));
        Ok(self.offset_address(&address, displacement))
    }

    /// Returns the operand (temporary, constant or symbol) holding the value.
    fn generate_expr(&mut self, ctx: &mut LowerFunctionContext<'a>, expr_ref: ExprRef) -> Result<String, CodegenError> {
        let program = self.program;
        let value = match program.expr(expr_ref) {
            TypedExpr::Literal(ty, constant) => match constant {
                Constant::Int(v) => v.to_string(),
                Constant::UInt(v) => (*v as i64).to_string(),
                Constant::Bool(b) => u8::from(*b).to_string(),
                Constant::Float(v) if *ty == Type::F32 => format!("s_{:?}", *v as f32),
                Constant::Float(v) => format!("d_{v:?}"),
                Constant::Str(text) => format!("${}", self.symtab.string_label(text)),
            },
            TypedExpr::Variable(_, name) => {
                let (slot, ty) = self.slot(ctx, name)?;
                let class = Class::of(ty);
                self.assign(class, format_args!("load{class} {slot}"))
            }
            TypedExpr::Binary(ty, operator, lhs, rhs) => {
                let left = self.generate_expr(ctx, *lhs)?;
                let right = self.generate_expr(ctx, *rhs)?;
                if operator.is_comparison() {
                    self.generate_comparison(*operator, program.expr_type(*lhs), &left, &right)?
                } else {
                    self.generate_arithmetic(*operator, ty, &left, &right)
                }
            }
            TypedExpr::Unary(ty, operator, operand) => {
                let value = self.generate_expr(ctx, *operand)?;
                match (operator, ty.primitive()) {
                    (UnaryOperator::Not, _) => self.assign(Class::Word, format_args!("xor {value}, 1")),
                    (UnaryOperator::Negate, Some(kind)) => {
                        let negated = self.assign(Class::of(ty), format_args!("neg {value}"));
                        self.normalize(negated, kind)
                    }
                    (UnaryOperator::Negate, None) => unreachable!("negation of non-primitive `{ty}`"),
                }
            }
            TypedExpr::Call(_, call) => self
                .generate_call(ctx, call)?
                .unwrap_or_else(|| unreachable!("procedure `{}` used as a value", call.name)),
            TypedExpr::StructInit(ty, initializers) => {
                let Type::Struct(struct_name) = ty else {
                    unreachable!("struct initializer of type `{ty}`");
                };
                let layouts: &'a Layouts<'arena> = self.layouts;
                let layout = layouts.struct_layout(struct_name);
                let typed_struct = program
                    .struct_def(struct_name)
                    .unwrap_or_else(|| unreachable!("unknown struct `{struct_name}`"));

                let object = self.assign(Class::Long, format_args!("call ${ALLOC_SYMBOL}(l {})", layout.size));
                for (member, value) in initializers {
                    let field = typed_struct.field(*member);
                    let result = self.generate_expr(ctx, *value)?;
                    let result = self.coerce(result, program.expr_type(*value), &field.ty);
                    let address = self.offset_address(&object, layout.field_offsets[*member]);
                    emit!(self.out, "store{} {result}, {address}", Class::of(&field.ty));
                }

                // defaults were resolved at global scope, locals must not capture them
                let scopes = std::mem::take(&mut ctx.scopes);
                for (i, field) in typed_struct.fields.iter().enumerate() {
                    let member = MemberRef(i as u32);
                    let initialized = initializers.iter().any(|(m, _)| *m == member);
                    if let (false, Some(default)) = (initialized, field.default) {
                        let result = self.generate_expr(ctx, default)?;
                        let result = self.coerce(result, program.expr_type(default), &field.ty);
                        let address = self.offset_address(&object, layout.field_offsets[member]);
                        emit!(self.out, "store{} {result}, {address}", Class::of(&field.ty));
                    }
                }
                ctx.scopes = scopes;
                object
            }
            TypedExpr::FieldAccess(ty, base, member) => {
                let object = self.generate_expr(ctx, *base)?;
                let Type::Struct(struct_name) = program.expr_type(*base) else {
                    unreachable!("field access on non-struct");
                };
                let offset = self.layouts.member_offset(struct_name, *member);
                let address = self.offset_address(&object, offset);
                let class = Class::of(ty);
                self.assign(class, format_args!("load{class} {address}"))
            }
            TypedExpr::Cast(to, source) => {
                let value = self.generate_expr(ctx, *source)?;
                self.generate_cast(value, program.expr_type(*source), to)
            }
            TypedExpr::ArrayInit(_, length) => {
                let count = self.generate_expr(ctx, *length)?;
                let count = self.coerce(count, program.expr_type(*length), &Type::I64);
                let bytes = self.assign(Class::Long, format_args!("mul {count}, {WORD_SIZE}"));
                let size = self.assign(Class::Long, format_args!("add {bytes}, {ARRAY_HEADER_SIZE}"));
                let array = self.assign(Class::Long, format_args!("call ${ALLOC_SYMBOL}(l {size})"));
                emit!(self.out, "storel {count}, {array}");
                array
            }
            TypedExpr::Index(ty, array, index) => {
                let address = self.generate_element_address(ctx, array, *index)?;
                let class = Class::of(ty);
                self.assign(class, format_args!("load{class} {address}"))
            }
        };
        Ok(value)
    }

    fn generate_comparison(
        &mut self,
        operator: BinaryOperator,
        operand_type: &Type,
        left: &str,
        right: &str,
    ) -> Result<String, CodegenError> {
        let result = match operand_type {
            Type::Primitive(PrimitiveKind::String) => {
                let equal = self.assign(
                    Class::Word,
                    format_args!("call ${STRING_EQUALS_SYMBOL}(l {left}, l {right})"),
                );
                // C bool, only the low byte is defined
                let equal = self.normalize(equal, PrimitiveKind::Bool);
                if operator == BinaryOperator::NotEqual {
                    self.assign(Class::Word, format_args!("xor {equal}, 1"))
                } else {
                    equal
                }
            }
            // ordered comparisons, so NaN compares unequal to everything
            Type::Primitive(kind) if kind.is_fp() => {
                let class = Class::of(operand_type);
                let condition = match operator {
                    BinaryOperator::Equal => "eq",
                    BinaryOperator::NotEqual => "ne",
                    BinaryOperator::LessThan => "lt",
                    BinaryOperator::LessThanOrEqual => "le",
                    BinaryOperator::GreaterThan => "gt",
                    BinaryOperator::GreaterThanOrEqual => "ge",
                    _ => unreachable!("arithmetic operator in comparison"),
                };
                self.assign(Class::Word, format_args!("c{condition}{class} {left}, {right}"))
            }
            Type::Primitive(kind) if *kind != PrimitiveKind::Any => {
                let condition = integer_condition(operator, kind.is_signed());
                let class = Class::of(operand_type);
                self.assign(Class::Word, format_args!("c{condition}{class} {left}, {right}"))
            }
            // arrays compare by reference
            Type::Array(_) => {
                let condition = integer_condition(operator, false);
                self.assign(Class::Word, format_args!("c{condition}l {left}, {right}"))
            }
            Type::Primitive(_) | Type::Struct(_) | Type::Pointer(_) => {
                return Err(CodegenError::UnsupportedComparison {
                    operator: operator.symbol(),
                    ty: operand_type.clone(),
                });
            }
        };
        Ok(result)
    }

    fn generate_arithmetic(&mut self, operator: BinaryOperator, ty: &Type, left: &str, right: &str) -> String {
        let Some(kind) = ty.primitive().filter(|k| k.is_numeric()) else {
            unreachable!("arithmetic on non-numeric `{ty}`");
        };
        let op = match operator {
            BinaryOperator::Plus => "add",
            BinaryOperator::Minus => "sub",
            BinaryOperator::Multiply => "mul",
            BinaryOperator::Divide if kind.is_integral() && !kind.is_signed() => "udiv",
            BinaryOperator::Divide => "div",
            _ => unreachable!("comparison operator in arithmetic"),
        };
        let result = self.assign(Class::of(ty), format_args!("{op} {left}, {right}"));
        self.normalize(result, kind)
    }

    fn generate_cast(&mut self, value: String, from: &Type, to: &Type) -> String {
        let (Some(from_kind), Some(to_kind)) = (from.primitive(), to.primitive()) else {
            // pointer to pointer
            return value;
        };
        if from_kind == to_kind {
            return value;
        }
        if from_kind == PrimitiveKind::Any || to_kind == PrimitiveKind::Any {
            return self.coerce(value, from, to);
        }

        let (from_class, to_class) = (Class::of(from), Class::of(to));
        match (from_kind.is_fp(), to_kind.is_fp()) {
            (false, false) => {
                let resized = match (from_class, to_class) {
                    (Class::Word, Class::Long) | (Class::Long, Class::Word) => self.coerce(value, from, to),
                    _ => value,
                };
                self.normalize(resized, to_kind)
            }
            (false, true) => {
                let op = match (from_kind.is_signed(), from_class) {
                    (true, Class::Word) => "swtof",
                    (false, Class::Word) => "uwtof",
                    (true, _) => "sltof",
                    (false, _) => "ultof",
                };
                self.assign(to_class, format_args!("{op} {value}"))
            }
            (true, false) => {
                let source = if from_kind == PrimitiveKind::F32 { "s" } else { "d" };
                let sign = if to_kind.is_signed() { "s" } else { "u" };
                let converted = self.assign(to_class, format_args!("{source}to{sign}i {value}"));
                self.normalize(converted, to_kind)
            }
            (true, true) => {
                let op = if to_kind == PrimitiveKind::F64 { "exts" } else { "truncd" };
                self.assign(to_class, format_args!("{op} {value}"))
            }
        }
    }
}

fn integer_condition(operator: BinaryOperator, signed: bool) -> &'static str {
    match (operator, signed) {
        (BinaryOperator::Equal, _) => "eq",
        (BinaryOperator::NotEqual, _) => "ne",
        (BinaryOperator::LessThan, true) => "slt",
        (BinaryOperator::LessThan, false) => "ult",
        (BinaryOperator::LessThanOrEqual, true) => "sle",
        (BinaryOperator::LessThanOrEqual, false) => "ule",
        (BinaryOperator::GreaterThan, true) => "sgt",
        (BinaryOperator::GreaterThan, false) => "ugt",
        (BinaryOperator::GreaterThanOrEqual, true) => "sge",
        (BinaryOperator::GreaterThanOrEqual, false) => "uge",
        _ => unreachable!("arithmetic operator has no condition code"),
    }
}

#[cfg(test)]
mod tests;
