use std::fmt;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::codegen::asm::{ARGUMENT_REGISTERS, AsmWriter, Register, SYS_EXIT, SYSCALL_REGISTERS, emit};
use crate::codegen::layout::{ARRAY_HEADER_SIZE, Layouts, WORD_SIZE};
use crate::codegen::{
    ALLOC_SYMBOL, CodegenError, IndexBase, OUT_OF_BOUNDS_EXIT_CODE, OUT_OF_BOUNDS_LABEL, STRING_EQUALS_SYMBOL,
    constant_bits,
};
use crate::labels::LabelGenerator;
use crate::semantics::symtab::{Func, LocalFunc, SymbolTable};
use crate::semantics::typed_ast::{
    CallSite, Constant, ExprRef, TypedElse, TypedExpr, TypedFunction, TypedIf, TypedProgram, TypedStmt,
};
use crate::types::{PrimitiveKind, Type};

// Where a named value lives while a function body is generated
#[derive(Debug, Clone, Copy)]
enum Slot<'a> {
    Local(u32),
    Global(&'a str),
}

impl fmt::Display for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Local(offset) => write!(f, "qword [rbp - {offset}]"),
            Slot::Global(label) => write!(f, "qword [{label}]"),
        }
    }
}

// One argument as seen by the callee
enum Argument<'a> {
    Value(ExprRef),
    // trailing arguments of a local variadic function, passed as one array
    Packed(&'a [ExprRef]),
}

struct LowerFunctionContext<'a> {
    func: &'a LocalFunc,
    // innermost scope last; each binding maps a name to its frame slot
    scopes: Vec<Vec<(&'a str, u32)>>,
    // next entry of `func.variables` handed to a declaration
    next_slot: usize,
    break_target: Option<String>,
    continue_target: Option<String>,
    // 8-byte values pushed since the prologue
    stack_depth: usize,
}

impl<'a> LowerFunctionContext<'a> {
    fn local(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|(n, _)| *n == name).map(|(_, offset)| *offset))
    }
}

pub(crate) struct X86Backend<'a, 'arena> {
    program: &'a TypedProgram,
    symtab: &'a SymbolTable,
    labels: &'a mut LabelGenerator,
    layouts: &'a Layouts<'arena>,
    index_base: IndexBase,
    out: AsmWriter,
}

impl<'a, 'arena> X86Backend<'a, 'arena> {
    pub(crate) fn new(
        program: &'a TypedProgram,
        symtab: &'a SymbolTable,
        labels: &'a mut LabelGenerator,
        layouts: &'a Layouts<'arena>,
        index_base: IndexBase,
    ) -> Self {
        X86Backend {
            program,
            symtab,
            labels,
            layouts,
            index_base,
            out: AsmWriter::default(),
        }
    }

    pub(crate) fn generate(mut self, globals: &[Constant]) -> Result<String, CodegenError> {
        let entry = self.entry_point();

        self.out.directive(format_args!("default rel"));
        if entry.is_some() {
            self.out.directive(format_args!("global _start"));
        }
        for (_, func) in self.symtab.local_funcs() {
            if func.exported {
                self.out.directive(format_args!("global {}", func.start_label));
            }
        }
        let mut externs: Vec<&str> = vec![ALLOC_SYMBOL, STRING_EQUALS_SYMBOL];
        for ext in self.symtab.extern_funcs() {
            if !externs.contains(&ext.signature.name.as_str()) {
                externs.push(&ext.signature.name);
            }
        }
        for name in externs {
            self.out.directive(format_args!("extern {name}"));
        }

        self.out.blank();
        self.out.directive(format_args!("section .text"));

        if let Some(main) = entry {
            self.out.label("_start");
            emit!(self.out, "call {}", main.start_label);
            if main.signature.return_type.is_none() {
                emit!(self.out, "xor eax, eax");
            }
            emit!(self.out, "mov {}, rax", SYSCALL_REGISTERS[1]);
            emit!(self.out, "mov {}, {SYS_EXIT}", SYSCALL_REGISTERS[0]);
            emit!(self.out, "syscall");
            self.out.blank();
        }

        let program = self.program;
        let symtab = self.symtab;
        for (typed, (_, func)) in program.functions.iter().zip(symtab.local_funcs()) {
            debug_assert_eq!(typed.signature.name, func.signature.name);
            self.generate_function(func, typed)?;
        }

        self.out.label(OUT_OF_BOUNDS_LABEL);
        emit!(self.out, "mov {}, {SYS_EXIT}", SYSCALL_REGISTERS[0]);
        emit!(self.out, "mov {}, {OUT_OF_BOUNDS_EXIT_CODE}", SYSCALL_REGISTERS[1]);
        emit!(self.out, "syscall");

        self.out.blank();
        self.out.directive(format_args!("section .data"));
        for (text, label) in symtab.strings() {
            let bytes: Vec<String> = text.bytes().chain([0]).map(|b| b.to_string()).collect();
            self.out.directive(format_args!("{label}: db {}", bytes.join(", ")));
        }
        for (global, value) in program.globals.iter().zip(globals) {
            let label = &symtab.resolve_global_variable(&global.name)?.label;
            match value {
                Constant::Str(text) => {
                    let string_label = symtab.string_label(text);
                    self.out.directive(format_args!("{label}: dq {string_label}"));
                }
                Constant::Int(v) => self.out.directive(format_args!("{label}: dq {v}")),
                other => {
                    let bits = constant_bits(other, &global.ty);
                    self.out.directive(format_args!("{label}: dq 0x{bits:x}"));
                }
            }
        }

        Ok(self.out.finish())
    }

    // a parameterless `main` becomes the process entry point
    fn entry_point(&self) -> Option<&'a LocalFunc> {
        let symtab: &'a SymbolTable = self.symtab;
        symtab
            .local_funcs()
            .map(|(_, func)| func)
            .find(|func| func.signature.name == "main" && func.parameter_count() == 0)
    }

    fn generate_function(&mut self, func: &'a LocalFunc, typed: &'a TypedFunction) -> Result<(), CodegenError> {
        self.out.blank();
        self.out.label(&func.start_label);
        emit!(self.out, "push rbp");
        emit!(self.out, "mov rbp, rsp");
        let allocation = func.stack_allocation();
        if allocation > 0 {
            emit!(self.out, "sub rsp, {allocation}");
        }

        let mut params = Vec::with_capacity(func.parameter_count());
        for (i, variable) in func.variables[..func.parameter_count()].iter().enumerate() {
            match ARGUMENT_REGISTERS.get(i) {
                Some(register) => emit!(self.out, "mov qword [rbp - {}], {register}", variable.offset),
                None => {
                    // caller left these above the return address
                    let incoming = 16 + (i - ARGUMENT_REGISTERS.len()) as u32 * WORD_SIZE;
                    emit!(self.out, "mov rax, qword [rbp + {incoming}]");
                    emit!(self.out, "mov qword [rbp - {}], rax", variable.offset);
                }
            }
            params.push((variable.name.as_str(), variable.offset));
        }

        let mut ctx = LowerFunctionContext {
            func,
            scopes: vec![params],
            next_slot: func.parameter_count(),
            break_target: None,
            continue_target: None,
            stack_depth: 0,
        };
        self.generate_block(&mut ctx, &typed.body)?;
        debug_assert_eq!(ctx.next_slot, func.variables.len());

        self.out.label(&func.end_label);
        emit!(self.out, "mov rsp, rbp");
        emit!(self.out, "pop rbp");
        emit!(self.out, "ret");
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
        match stmt {
            TypedStmt::Declare { name, value, .. } => {
                self.generate_expr(ctx, *value)?;
                let func = ctx.func;
                let variable = &func.variables[ctx.next_slot];
                debug_assert_eq!(&variable.name, name);
                ctx.next_slot += 1;
                emit!(self.out, "mov qword [rbp - {}], rax", variable.offset);
                if let Some(scope) = ctx.scopes.last_mut() {
                    scope.push((variable.name.as_str(), variable.offset));
                }
            }
            TypedStmt::Assign { name, value } => {
                self.generate_expr(ctx, *value)?;
                let slot = self.slot(ctx, name)?;
                emit!(self.out, "mov {slot}, rax");
            }
            TypedStmt::AssignIndex { array, index, value } => {
                self.generate_expr(ctx, *value)?;
                self.push_rax(ctx);
                self.generate_element_address(ctx, array, *index)?;
                self.pop(ctx, Register::Rcx);
                emit!(self.out, "mov qword [rax], rcx");
            }
            TypedStmt::If(if_stmt) => {
                let end_label = self.labels.next_label("if_end");
                self.generate_if(ctx, if_stmt, &end_label)?;
                self.out.label(&end_label);
            }
            TypedStmt::While { condition, body } => {
                let start_label = self.labels.next_label("while_start");
                let end_label = self.labels.next_label("while_end");

                self.out.label(&start_label);
                self.generate_expr(ctx, *condition)?;
                emit!(self.out, "cmp rax, 0");
                emit!(self.out, "je {end_label}");

                let old_break_target = ctx.break_target.replace(end_label.clone());
                let old_continue_target = ctx.continue_target.replace(start_label.clone());
                self.generate_block(ctx, body)?;
                ctx.break_target = old_break_target;
                ctx.continue_target = old_continue_target;

                emit!(self.out, "jmp {start_label}");
                self.out.label(&end_label);
            }
            TypedStmt::Return(value) => {
                if let Some(value) = value {
                    self.generate_expr(ctx, *value)?;
                }
                emit!(self.out, "jmp {}", ctx.func.end_label);
            }
            TypedStmt::Break => {
                let target = ctx.break_target.as_ref().ok_or(CodegenError::BreakOutsideLoop)?;
                emit!(self.out, "jmp {target}");
            }
            TypedStmt::Continue => {
                let target = ctx.continue_target.as_ref().ok_or(CodegenError::ContinueOutsideLoop)?;
                emit!(self.out, "jmp {target}");
            }
            TypedStmt::Call(call) => self.generate_call(ctx, call)?,
        }
        Ok(())
    }

    // `end_label` is shared by the whole else-if chain
    fn generate_if(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        if_stmt: &'a TypedIf,
        end_label: &str,
    ) -> Result<(), CodegenError> {
        self.generate_expr(ctx, if_stmt.condition)?;
        emit!(self.out, "cmp rax, 0");

        let Some(else_branch) = &if_stmt.else_branch else {
            emit!(self.out, "je {end_label}");
            return self.generate_block(ctx, &if_stmt.body);
        };

        let else_label = self.labels.next_label("else");
        emit!(self.out, "je {else_label}");
        self.generate_block(ctx, &if_stmt.body)?;
        emit!(self.out, "jmp {end_label}");
        self.out.label(&else_label);
        match else_branch {
            TypedElse::ElseIf(else_if) => self.generate_if(ctx, else_if, end_label),
            TypedElse::Block(body) => self.generate_block(ctx, body),
        }
    }

    fn slot(&self, ctx: &LowerFunctionContext<'a>, name: &str) -> Result<Slot<'a>, CodegenError> {
        if let Some(offset) = ctx.local(name) {
            return Ok(Slot::Local(offset));
        }
        let symtab: &'a SymbolTable = self.symtab;
        let global = symtab.resolve_global_variable(name)?;
        Ok(Slot::Global(&global.label))
    }

    fn push_rax(&mut self, ctx: &mut LowerFunctionContext<'a>) {
        emit!(self.out, "push rax");
        ctx.stack_depth += 1;
    }

    fn pop(&mut self, ctx: &mut LowerFunctionContext<'a>, register: Register) {
        emit!(self.out, "pop {register}");
        ctx.stack_depth -= 1;
    }

    // call with no stack arguments, padded so rsp is 16-byte aligned
    fn emit_aligned_call(&mut self, ctx: &LowerFunctionContext<'a>, target: &str) {
        let pad = ctx.stack_depth % 2 == 1;
        if pad {
            emit!(self.out, "sub rsp, 8");
        }
        emit!(self.out, "call {target}");
        if pad {
            emit!(self.out, "add rsp, 8");
        }
    }

    /// Leaves the result (if any) in rax.
    fn generate_call(&mut self, ctx: &mut LowerFunctionContext<'a>, call: &'a CallSite) -> Result<(), CodegenError> {
        let program = self.program;
        let symtab: &'a SymbolTable = self.symtab;
        let idx = symtab.resolve_func(&call.name, &program.argument_types(call))?;
        let func = symtab.func(idx);
        let signature = func.signature();

        let mut arguments: Vec<Argument> = Vec::with_capacity(signature.parameters.len());
        match func {
            Func::Local(_) if signature.is_variadic() => {
                let fixed = signature.fixed_parameters().len();
                arguments.extend(call.arguments[..fixed].iter().copied().map(Argument::Value));
                arguments.push(Argument::Packed(&call.arguments[fixed..]));
            }
            _ => arguments.extend(call.arguments.iter().copied().map(Argument::Value)),
        }

        let stack_arguments = arguments.len().saturating_sub(ARGUMENT_REGISTERS.len());
        let pad = (ctx.stack_depth + stack_arguments) % 2 == 1;
        if pad {
            emit!(self.out, "sub rsp, 8");
            ctx.stack_depth += 1;
        }

        for argument in arguments.iter().rev() {
            match argument {
                Argument::Value(expr) => self.generate_expr(ctx, *expr)?,
                Argument::Packed(exprs) => self.generate_packed_array(ctx, exprs)?,
            }
            self.push_rax(ctx);
        }
        for register in ARGUMENT_REGISTERS.iter().take(arguments.len()) {
            self.pop(ctx, *register);
        }

        if let Func::Extern(_) = func {
            // no vector registers used for variadic C callees
            emit!(self.out, "xor eax, eax");
        }
        emit!(self.out, "call {}", func.start_label());

        let cleanup = stack_arguments + usize::from(pad);
        if cleanup > 0 {
            emit!(self.out, "add rsp, {}", cleanup as u32 * WORD_SIZE);
            ctx.stack_depth -= cleanup;
        }

        // C callees leave the upper bits of narrow results undefined
        if let (Func::Extern(_), Some(Type::Primitive(kind))) = (func, &signature.return_type) {
            self.normalize(*kind);
        }
        Ok(())
    }

    fn generate_packed_array(&mut self, ctx: &mut LowerFunctionContext<'a>, exprs: &[ExprRef]) -> Result<(), CodegenError> {
        let size = ARRAY_HEADER_SIZE + exprs.len() as u32 * WORD_SIZE;
        emit!(self.out, "mov rdi, {size}");
        self.emit_aligned_call(ctx, ALLOC_SYMBOL);
        emit!(self.out, "mov qword [rax], {}", exprs.len());
        self.push_rax(ctx);
        for (i, expr) in exprs.iter().enumerate() {
            self.generate_expr(ctx, *expr)?;
            emit!(self.out, "mov rcx, qword [rsp]");
            emit!(self.out, "mov qword [rcx + {}], rax", ARRAY_HEADER_SIZE + i as u32 * WORD_SIZE);
        }
        self.pop(ctx, Register::Rax);
        Ok(())
    }

    // bounds checked; leaves the element address in rax
    fn generate_element_address(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        array: &str,
        index: ExprRef,
    ) -> Result<(), CodegenError> {
        self.generate_expr(ctx, index)?;
        emit!(self.out, "mov rcx, rax");
        let slot = self.slot(ctx, array)?;
        emit!(self.out, "mov rax, {slot}");
        emit!(self.out, "mov rdx, qword [rax]");
        emit!(self.out, "cmp rcx, {}", self.index_base.lowest());
        emit!(self.out, "jl {OUT_OF_BOUNDS_LABEL}");
        emit!(self.out, "cmp rcx, rdx");
        let displacement = match self.index_base {
            IndexBase::Zero => {
                emit!(self.out, "jge {OUT_OF_BOUNDS_LABEL}");
                ARRAY_HEADER_SIZE
            }
            IndexBase::One => {
                emit!(self.out, "jg {OUT_OF_BOUNDS_LABEL}");
                0
            }
        };
        emit!(self.out, "lea rax, [rax + rcx * {WORD_SIZE} + {displacement}]");
        Ok(())
    }

    /// Evaluates `expr_ref` into rax. Every value occupies the full register:
    /// narrow integers are sign or zero extended, floats are kept as raw bits.
    fn generate_expr(&mut self, ctx: &mut LowerFunctionContext<'a>, expr_ref: ExprRef) -> Result<(), CodegenError> {
        let program = self.program;
        match program.expr(expr_ref) {
            TypedExpr::Literal(ty, constant) => match constant {
                Constant::Int(v) => emit!(self.out, "mov rax, {v}"),
                Constant::UInt(v) => emit!(self.out, "mov rax, {v}"),
                Constant::Bool(b) => emit!(self.out, "mov rax, {}", u8::from(*b)),
                Constant::Float(_) => emit!(self.out, "mov rax, 0x{:x}", constant_bits(constant, ty)),
                Constant::Str(text) => emit!(self.out, "lea rax, [{}]", self.symtab.string_label(text)),
            },
            TypedExpr::Variable(_, name) => {
                let slot = self.slot(ctx, name)?;
                emit!(self.out, "mov rax, {slot}");
            }
            TypedExpr::Binary(ty, operator, lhs, rhs) => {
                self.generate_expr(ctx, *lhs)?;
                self.push_rax(ctx);
                self.generate_expr(ctx, *rhs)?;
                emit!(self.out, "mov rcx, rax");
                self.pop(ctx, Register::Rax);

                if operator.is_comparison() {
                    self.generate_comparison(ctx, *operator, program.expr_type(*lhs))?;
                } else {
                    self.generate_arithmetic(*operator, ty);
                }
            }
            TypedExpr::Unary(ty, operator, operand) => {
                self.generate_expr(ctx, *operand)?;
                match (operator, ty.primitive()) {
                    (UnaryOperator::Not, _) => emit!(self.out, "xor rax, 1"),
                    (UnaryOperator::Negate, Some(PrimitiveKind::F64)) => {
                        emit!(self.out, "mov rcx, 0x8000000000000000");
                        emit!(self.out, "xor rax, rcx");
                    }
                    (UnaryOperator::Negate, Some(PrimitiveKind::F32)) => emit!(self.out, "xor eax, 0x80000000"),
                    (UnaryOperator::Negate, Some(kind)) => {
                        emit!(self.out, "neg rax");
                        self.normalize(kind);
                    }
                    (UnaryOperator::Negate, None) => unreachable!("negation of non-primitive `{ty}`"),
                }
            }
            TypedExpr::Call(_, call) => self.generate_call(ctx, call)?,
            TypedExpr::StructInit(ty, initializers) => {
                let Type::Struct(struct_name) = ty else {
                    unreachable!("struct initializer of type `{ty}`");
                };
                let layouts: &'a Layouts<'arena> = self.layouts;
                let layout = layouts.struct_layout(struct_name);
                emit!(self.out, "mov rdi, {}", layout.size);
                self.emit_aligned_call(ctx, ALLOC_SYMBOL);
                self.push_rax(ctx);

                for (member, value) in initializers {
                    self.generate_expr(ctx, *value)?;
                    emit!(self.out, "mov rcx, qword [rsp]");
                    emit!(self.out, "mov qword [rcx + {}], rax", layout.field_offsets[*member]);
                }

                let typed_struct = program
                    .struct_def(struct_name)
                    .unwrap_or_else(|| unreachable!("unknown struct `{struct_name}`"));
                // defaults were resolved at global scope, locals must not capture them
                let scopes = std::mem::take(&mut ctx.scopes);
                for (i, field) in typed_struct.fields.iter().enumerate() {
                    let initialized = initializers.iter().any(|(m, _)| m.index() == i);
                    if let (false, Some(default)) = (initialized, field.default) {
                        self.generate_expr(ctx, default)?;
                        emit!(self.out, "mov rcx, qword [rsp]");
                        emit!(self.out, "mov qword [rcx + {}], rax", i as u32 * WORD_SIZE);
                    }
                }
                ctx.scopes = scopes;

                self.pop(ctx, Register::Rax);
            }
            TypedExpr::FieldAccess(_, base, member) => {
                self.generate_expr(ctx, *base)?;
                let Type::Struct(struct_name) = program.expr_type(*base) else {
                    unreachable!("field access on non-struct");
                };
                let offset = self.layouts.member_offset(struct_name, *member);
                emit!(self.out, "mov rax, qword [rax + {offset}]");
            }
            TypedExpr::Cast(to, source) => {
                self.generate_expr(ctx, *source)?;
                self.generate_cast(program.expr_type(*source), to);
            }
            TypedExpr::ArrayInit(_, length) => {
                self.generate_expr(ctx, *length)?;
                self.push_rax(ctx);
                emit!(self.out, "lea rdi, [rax * {WORD_SIZE} + {ARRAY_HEADER_SIZE}]");
                self.emit_aligned_call(ctx, ALLOC_SYMBOL);
                self.pop(ctx, Register::Rcx);
                emit!(self.out, "mov qword [rax], rcx");
            }
            TypedExpr::Index(_, array, index) => {
                self.generate_element_address(ctx, array, *index)?;
                emit!(self.out, "mov rax, qword [rax]");
            }
        }
        Ok(())
    }

    // lhs in rax, rhs in rcx; leaves 0 / 1 in rax
    fn generate_comparison(
        &mut self,
        ctx: &mut LowerFunctionContext<'a>,
        operator: BinaryOperator,
        operand_type: &Type,
    ) -> Result<(), CodegenError> {
        match operand_type {
            Type::Primitive(PrimitiveKind::String) => {
                emit!(self.out, "mov rdi, rax");
                emit!(self.out, "mov rsi, rcx");
                self.emit_aligned_call(ctx, STRING_EQUALS_SYMBOL);
                emit!(self.out, "movzx eax, al");
                if operator == BinaryOperator::NotEqual {
                    emit!(self.out, "xor rax, 1");
                }
            }
            Type::Primitive(kind @ (PrimitiveKind::F32 | PrimitiveKind::F64)) => {
                self.move_to_xmm(*kind);
                let ucomi = if *kind == PrimitiveKind::F32 { "ucomiss" } else { "ucomisd" };
                // unordered operands must compare false (true for `!=`)
                match operator {
                    BinaryOperator::Equal => {
                        emit!(self.out, "{ucomi} xmm0, xmm1");
                        emit!(self.out, "sete al");
                        emit!(self.out, "setnp cl");
                        emit!(self.out, "and al, cl");
                    }
                    BinaryOperator::NotEqual => {
                        emit!(self.out, "{ucomi} xmm0, xmm1");
                        emit!(self.out, "setne al");
                        emit!(self.out, "setp cl");
                        emit!(self.out, "or al, cl");
                    }
                    BinaryOperator::LessThan => {
                        emit!(self.out, "{ucomi} xmm1, xmm0");
                        emit!(self.out, "seta al");
                    }
                    BinaryOperator::LessThanOrEqual => {
                        emit!(self.out, "{ucomi} xmm1, xmm0");
                        emit!(self.out, "setae al");
                    }
                    BinaryOperator::GreaterThan => {
                        emit!(self.out, "{ucomi} xmm0, xmm1");
                        emit!(self.out, "seta al");
                    }
                    BinaryOperator::GreaterThanOrEqual => {
                        emit!(self.out, "{ucomi} xmm0, xmm1");
                        emit!(self.out, "setae al");
                    }
                    _ => unreachable!("arithmetic operator in comparison"),
                }
                emit!(self.out, "movzx eax, al");
            }
            Type::Primitive(kind) if *kind != PrimitiveKind::Any => {
                emit!(self.out, "cmp rax, rcx");
                emit!(self.out, "set{} al", condition_code(operator, kind.is_signed()));
                emit!(self.out, "movzx eax, al");
            }
            // arrays compare by reference
            Type::Array(_) => {
                emit!(self.out, "cmp rax, rcx");
                emit!(self.out, "set{} al", condition_code(operator, false));
                emit!(self.out, "movzx eax, al");
            }
            Type::Primitive(_) | Type::Struct(_) | Type::Pointer(_) => {
                return Err(CodegenError::UnsupportedComparison {
                    operator: operator.symbol(),
                    ty: operand_type.clone(),
                });
            }
        }
        Ok(())
    }

    // lhs in rax, rhs in rcx; result in rax
    fn generate_arithmetic(&mut self, operator: BinaryOperator, ty: &Type) {
        let Some(kind) = ty.primitive().filter(|k| k.is_numeric()) else {
            unreachable!("arithmetic on non-numeric `{ty}`");
        };

        if kind.is_fp() {
            self.move_to_xmm(kind);
            let suffix = if kind == PrimitiveKind::F32 { "ss" } else { "sd" };
            let op = match operator {
                BinaryOperator::Plus => "add",
                BinaryOperator::Minus => "sub",
                BinaryOperator::Multiply => "mul",
                BinaryOperator::Divide => "div",
                _ => unreachable!("comparison operator in arithmetic"),
            };
            emit!(self.out, "{op}{suffix} xmm0, xmm1");
            self.move_from_xmm(kind);
            return;
        }

        // 32-bit forms for everything that fits, the result is re-extended below
        let (acc, rhs) = if kind.bits() <= 32 { ("eax", "ecx") } else { ("rax", "rcx") };
        match operator {
            BinaryOperator::Plus => emit!(self.out, "add {acc}, {rhs}"),
            BinaryOperator::Minus => emit!(self.out, "sub {acc}, {rhs}"),
            BinaryOperator::Multiply => emit!(self.out, "imul {acc}, {rhs}"),
            BinaryOperator::Divide if kind.is_signed() => {
                emit!(self.out, "{}", if kind.bits() <= 32 { "cdq" } else { "cqo" });
                emit!(self.out, "idiv {rhs}");
            }
            BinaryOperator::Divide => {
                emit!(self.out, "xor edx, edx");
                emit!(self.out, "div {rhs}");
            }
            _ => unreachable!("comparison operator in arithmetic"),
        }
        self.normalize(kind);
    }

    fn generate_cast(&mut self, from: &Type, to: &Type) {
        let (Some(from_kind), Some(to_kind)) = (from.primitive(), to.primitive()) else {
            // pointer to pointer
            return;
        };
        if from_kind == to_kind || from_kind == PrimitiveKind::Any || to_kind == PrimitiveKind::Any {
            return;
        }

        match (from_kind.is_fp(), to_kind.is_fp()) {
            (false, false) => self.normalize(to_kind),
            (false, true) => {
                let op = if to_kind == PrimitiveKind::F32 { "cvtsi2ss" } else { "cvtsi2sd" };
                emit!(self.out, "{op} xmm0, rax");
                self.move_from_xmm(to_kind);
            }
            (true, false) => {
                self.move_to_xmm0(from_kind);
                let op = if from_kind == PrimitiveKind::F32 { "cvttss2si" } else { "cvttsd2si" };
                emit!(self.out, "{op} rax, xmm0");
                self.normalize(to_kind);
            }
            (true, true) => {
                self.move_to_xmm0(from_kind);
                let op = if from_kind == PrimitiveKind::F32 { "cvtss2sd" } else { "cvtsd2ss" };
                emit!(self.out, "{op} xmm0, xmm0");
                self.move_from_xmm(to_kind);
            }
        }
    }

    // re-extend rax after an operation on a narrow integer
    fn normalize(&mut self, kind: PrimitiveKind) {
        match kind {
            PrimitiveKind::I8 => emit!(self.out, "movsx rax, al"),
            PrimitiveKind::I16 => emit!(self.out, "movsx rax, ax"),
            PrimitiveKind::I32 => emit!(self.out, "movsxd rax, eax"),
            PrimitiveKind::Bool | PrimitiveKind::U8 => emit!(self.out, "movzx eax, al"),
            PrimitiveKind::U16 => emit!(self.out, "movzx eax, ax"),
            PrimitiveKind::U32 => emit!(self.out, "mov eax, eax"),
            _ => {}
        }
    }

    fn move_to_xmm0(&mut self, kind: PrimitiveKind) {
        if kind == PrimitiveKind::F32 {
            emit!(self.out, "movd xmm0, eax");
        } else {
            emit!(self.out, "movq xmm0, rax");
        }
    }

    fn move_to_xmm(&mut self, kind: PrimitiveKind) {
        self.move_to_xmm0(kind);
        if kind == PrimitiveKind::F32 {
            emit!(self.out, "movd xmm1, ecx");
        } else {
            emit!(self.out, "movq xmm1, rcx");
        }
    }

    fn move_from_xmm(&mut self, kind: PrimitiveKind) {
        if kind == PrimitiveKind::F32 {
            emit!(self.out, "movd eax, xmm0");
        } else {
            emit!(self.out, "movq rax, xmm0");
        }
    }
}

fn condition_code(operator: BinaryOperator, signed: bool) -> &'static str {
    match (operator, signed) {
        (BinaryOperator::Equal, _) => "e",
        (BinaryOperator::NotEqual, _) => "ne",
        (BinaryOperator::LessThan, true) => "l",
        (BinaryOperator::LessThan, false) => "b",
        (BinaryOperator::LessThanOrEqual, true) => "le",
        (BinaryOperator::LessThanOrEqual, false) => "be",
        (BinaryOperator::GreaterThan, true) => "g",
        (BinaryOperator::GreaterThan, false) => "a",
        (BinaryOperator::GreaterThanOrEqual, true) => "ge",
        (BinaryOperator::GreaterThanOrEqual, false) => "ae",
        _ => unreachable!("arithmetic operator has no condition code"),
    }
}

#[cfg(test)]
mod tests;
