use crate::ast::{BinaryOperator, Definition, ElseBranch, Expression, Program, Statement, StructField};
use crate::codegen::{CodegenError, IndexBase, generate_asm};
use crate::labels::LabelGenerator;
use crate::semantics::typed_ast::{TypedFunction, TypedProgram, TypedStmt};
use crate::semantics::{SymbolTable, resolve_program};
use crate::types::{Parameter, PrimitiveKind, Signature, Type};

fn compile_with(definitions: Vec<Definition>, index_base: IndexBase) -> Result<String, CodegenError> {
    let program = resolve_program(&Program::single(definitions)).expect("program should type check");
    let mut labels = LabelGenerator::new();
    let symtab = SymbolTable::build(&program, &mut labels).expect("symbols should resolve");
    generate_asm(&program, &symtab, &mut labels, index_base)
}

fn compile(definitions: Vec<Definition>) -> String {
    compile_with(definitions, IndexBase::Zero).expect("code generation should succeed")
}

fn main_returning(body: Vec<Statement>) -> Definition {
    Definition::func("main", vec![], Some(Type::I64), body).exported()
}

#[test]
fn global_initializer_is_folded() {
    let asm = compile(vec![
        Definition::global(
            "g",
            Expression::binary(
                Expression::int(2),
                BinaryOperator::Plus,
                Expression::binary(Expression::int(3), BinaryOperator::Multiply, Expression::int(4)),
            ),
        ),
        main_returning(vec![Statement::ret(Expression::ident("g"))]),
    ]);

    // main: labels 0; g: label 1
    assert!(asm.contains("global_g_1: dq 14"), "{asm}");
    assert!(asm.contains("mov rax, qword [global_g_1]"), "{asm}");
    assert!(!asm.contains("imul"), "{asm}");
}

#[test]
fn non_constant_global_is_rejected() {
    let err = compile_with(
        vec![
            Definition::func("f", vec![], Some(Type::I64), vec![Statement::ret(Expression::int(1))]),
            Definition::global("g", Expression::call("f", vec![])),
        ],
        IndexBase::Zero,
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::NonConstantGlobal { ref name, .. } if name == "g"));
}

#[test]
fn entry_point_exits_with_main_result() {
    let asm = compile(vec![main_returning(vec![Statement::ret(Expression::int(7))])]);
    assert!(asm.contains("global _start\n"), "{asm}");
    assert!(
        asm.contains("_start:\n    call main\n    mov rdi, rax\n    mov rax, 60\n    syscall\n"),
        "{asm}"
    );
    assert!(
        asm.contains("main:\n    push rbp\n    mov rbp, rsp\n    mov rax, 7\n    jmp main_end_0\nmain_end_0:\n    mov rsp, rbp\n    pop rbp\n    ret\n"),
        "{asm}"
    );
}

#[test]
fn every_return_jumps_to_the_single_epilogue() {
    let asm = compile(vec![Definition::func(
        "pick",
        vec![Parameter::new("c", Type::BOOL)],
        Some(Type::I64),
        vec![Statement::if_(
            Expression::ident("c"),
            vec![Statement::ret(Expression::int(1))],
            Some(ElseBranch::Block(vec![Statement::ret(Expression::int(2))])),
        )],
    )]);

    // pick: nub_pick_0 / pick_end_1
    assert_eq!(asm.matches("jmp pick_end_1").count(), 2, "{asm}");
    assert_eq!(asm.matches("mov rsp, rbp").count(), 1, "{asm}");
    assert!(asm.contains("nub_pick_0:\n    push rbp\n    mov rbp, rsp\n    sub rsp, 16\n    mov qword [rbp - 8], rdi\n"), "{asm}");
    assert!(!asm.contains("_start"), "{asm}");
}

#[test]
fn bounds_check_zero_based() {
    let asm = compile(vec![main_returning(vec![
        Statement::let_("xs", Expression::new_array(Expression::int(3), Type::I64)),
        Statement::ret(Expression::index("xs", Expression::int(2))),
    ])]);
    assert!(asm.contains("lea rdi, [rax * 8 + 8]"), "{asm}");
    assert!(asm.contains("call nub_alloc"), "{asm}");
    assert!(
        asm.contains("    mov rdx, qword [rax]\n    cmp rcx, 0\n    jl nub_out_of_bounds\n    cmp rcx, rdx\n    jge nub_out_of_bounds\n    lea rax, [rax + rcx * 8 + 8]\n"),
        "{asm}"
    );
    assert!(
        asm.contains("nub_out_of_bounds:\n    mov rax, 60\n    mov rdi, 134\n    syscall\n"),
        "{asm}"
    );
}

#[test]
fn bounds_check_one_based() {
    let asm = compile_with(
        vec![main_returning(vec![
            Statement::let_("xs", Expression::new_array(Expression::int(3), Type::I64)),
            Statement::assign_index("xs", Expression::int(1), Expression::int(10)),
            Statement::ret(Expression::index("xs", Expression::int(3))),
        ])],
        IndexBase::One,
    )
    .unwrap();
    assert!(
        asm.contains("    cmp rcx, 1\n    jl nub_out_of_bounds\n    cmp rcx, rdx\n    jg nub_out_of_bounds\n    lea rax, [rax + rcx * 8 + 0]\n"),
        "{asm}"
    );
    // store goes through the same checked address
    assert!(asm.contains("    pop rcx\n    mov qword [rax], rcx\n"), "{asm}");
}

#[test]
fn struct_fields_and_defaults() {
    let asm = compile(vec![
        Definition::struct_def(
            "Point",
            vec![
                StructField::new("x", Type::I64),
                StructField::with_default("y", Type::I64, Expression::int(0)),
            ],
        ),
        main_returning(vec![
            Statement::let_("p", Expression::new_struct("Point", vec![("x", Expression::int(5))])),
            Statement::ret(Expression::field(Expression::ident("p"), "y")),
        ]),
    ]);
    assert!(
        asm.contains("    mov rdi, 16\n    call nub_alloc\n    push rax\n    mov rax, 5\n    mov rcx, qword [rsp]\n    mov qword [rcx + 0], rax\n    mov rax, 0\n    mov rcx, qword [rsp]\n    mov qword [rcx + 8], rax\n    pop rax\n"),
        "{asm}"
    );
    assert!(asm.contains("mov rax, qword [rax + 8]"), "{asm}");
}

#[test]
fn struct_equality_is_a_codegen_error() {
    let point = Definition::struct_def("Point", vec![StructField::new("x", Type::I64)]);
    let p = || Expression::new_struct("Point", vec![("x", Expression::int(1))]);
    let err = compile_with(
        vec![
            point,
            Definition::func(
                "main",
                vec![],
                Some(Type::BOOL),
                vec![Statement::ret(Expression::binary(p(), BinaryOperator::Equal, p()))],
            ),
        ],
        IndexBase::Zero,
    )
    .unwrap_err();
    assert_eq!(
        err,
        CodegenError::UnsupportedComparison {
            operator: "==",
            ty: Type::named("Point"),
        }
    );
    assert!(err.to_string().contains("Point"));
}

#[test]
fn string_and_array_comparisons() {
    let asm = compile(vec![
        Definition::func(
            "same",
            vec![Parameter::new("a", Type::STRING), Parameter::new("b", Type::STRING)],
            Some(Type::BOOL),
            vec![Statement::ret(Expression::binary(
                Expression::ident("a"),
                BinaryOperator::NotEqual,
                Expression::ident("b"),
            ))],
        ),
        Definition::func(
            "alias",
            vec![
                Parameter::new("a", Type::array_of(Type::I64)),
                Parameter::new("b", Type::array_of(Type::I64)),
            ],
            Some(Type::BOOL),
            vec![Statement::ret(Expression::binary(
                Expression::ident("a"),
                BinaryOperator::Equal,
                Expression::ident("b"),
            ))],
        ),
    ]);
    assert!(asm.contains("extern nub_string_equals"), "{asm}");
    assert!(
        asm.contains("    mov rdi, rax\n    mov rsi, rcx\n    call nub_string_equals\n    movzx eax, al\n    xor rax, 1\n"),
        "{asm}"
    );
    assert!(asm.contains("    cmp rax, rcx\n    sete al\n    movzx eax, al\n"), "{asm}");
}

#[test]
fn width_specific_arithmetic() {
    let asm = compile(vec![
        Definition::func(
            "narrow",
            vec![Parameter::new("a", Type::I32), Parameter::new("b", Type::I32)],
            Some(Type::I32),
            vec![Statement::ret(Expression::binary(Expression::ident("a"), BinaryOperator::Plus, Expression::ident("b")))],
        ),
        Definition::func(
            "wide",
            vec![Parameter::new("a", Type::I64), Parameter::new("b", Type::I64)],
            Some(Type::I64),
            vec![Statement::ret(Expression::binary(Expression::ident("a"), BinaryOperator::Divide, Expression::ident("b")))],
        ),
        Definition::func(
            "unsigned",
            vec![
                Parameter::new("a", Type::Primitive(PrimitiveKind::U32)),
                Parameter::new("b", Type::Primitive(PrimitiveKind::U32)),
            ],
            Some(Type::BOOL),
            vec![Statement::ret(Expression::binary(
                Expression::binary(Expression::ident("a"), BinaryOperator::Divide, Expression::ident("b")),
                BinaryOperator::LessThan,
                Expression::ident("b"),
            ))],
        ),
    ]);
    assert!(asm.contains("    add eax, ecx\n    movsxd rax, eax\n"), "{asm}");
    assert!(asm.contains("    cqo\n    idiv rcx\n"), "{asm}");
    assert!(asm.contains("    xor edx, edx\n    div ecx\n    mov eax, eax\n"), "{asm}");
    assert!(asm.contains("    cmp rax, rcx\n    setb al\n"), "{asm}");
}

#[test]
fn float_arithmetic_uses_sse() {
    let asm = compile(vec![Definition::func(
        "half",
        vec![Parameter::new("x", Type::F64)],
        Some(Type::F64),
        vec![Statement::ret(Expression::binary(
            Expression::ident("x"),
            BinaryOperator::Multiply,
            Expression::literal("0.5", PrimitiveKind::F64),
        ))],
    )]);
    assert!(asm.contains("mov rax, 0x3fe0000000000000"), "{asm}");
    assert!(asm.contains("    movq xmm0, rax\n    movq xmm1, rcx\n    mulsd xmm0, xmm1\n    movq rax, xmm0\n"), "{asm}");
}

#[test]
fn calls_pass_registers_then_stack() {
    let params: Vec<Parameter> = (0..8).map(|i| Parameter::new(format!("p{i}"), Type::I64)).collect();
    let asm = compile(vec![
        Definition::func("many", params, Some(Type::I64), vec![Statement::ret(Expression::ident("p7"))]),
        main_returning(vec![Statement::ret(Expression::call(
            "many",
            (1..=8).map(Expression::int).collect(),
        ))]),
    ]);

    // callee spills stack arguments into its own frame
    assert!(asm.contains("    mov rax, qword [rbp + 16]\n    mov qword [rbp - 56], rax\n"), "{asm}");
    assert!(asm.contains("    mov rax, qword [rbp + 24]\n    mov qword [rbp - 64], rax\n"), "{asm}");
    // arguments are pushed last to first, the first six popped into registers
    assert!(asm.contains("    mov rax, 8\n    push rax\n"), "{asm}");
    assert!(
        asm.contains("    pop rdi\n    pop rsi\n    pop rdx\n    pop rcx\n    pop r8\n    pop r9\n    call nub_many_0\n    add rsp, 16\n"),
        "{asm}"
    );
}

#[test]
fn odd_stack_depth_is_padded_before_calls() {
    let asm = compile(vec![
        Definition::func("f", vec![], Some(Type::I64), vec![Statement::ret(Expression::int(1))]),
        main_returning(vec![Statement::ret(Expression::binary(
            Expression::int(1),
            BinaryOperator::Plus,
            Expression::call("f", vec![]),
        ))]),
    ]);
    assert!(asm.contains("    push rax\n    sub rsp, 8\n    call nub_f_0\n    add rsp, 8\n"), "{asm}");
}

#[test]
fn extern_calls_clear_al() {
    let asm = compile(vec![
        Definition::extern_func(
            "printf",
            vec![Parameter::new("fmt", Type::STRING), Parameter::variadic("args", Type::ANY)],
            Some(Type::I32),
        ),
        Definition::func(
            "main",
            vec![],
            None,
            vec![Statement::call("printf", vec![Expression::string("%d\n"), Expression::int(3)])],
        )
        .exported(),
    ]);
    assert!(asm.contains("extern printf"), "{asm}");
    assert!(asm.contains("    pop rdi\n    pop rsi\n    xor eax, eax\n    call printf\n    movsxd rax, eax\n"), "{asm}");
    // main returns nothing: exit status 0
    assert!(asm.contains("    call main\n    xor eax, eax\n    mov rdi, rax\n"), "{asm}");
    assert!(asm.contains("str_0: db 37, 100, 10, 0"), "{asm}");
}

#[test]
fn local_variadic_arguments_are_packed() {
    let asm = compile(vec![
        Definition::func(
            "sum",
            vec![Parameter::new("first", Type::I64), Parameter::variadic("rest", Type::I64)],
            Some(Type::I64),
            vec![Statement::ret(Expression::index("rest", Expression::int(0)))],
        ),
        main_returning(vec![Statement::ret(Expression::call(
            "sum",
            vec![Expression::int(1), Expression::int(2), Expression::int(3)],
        ))]),
    ]);
    assert!(asm.contains("    mov rdi, 24\n"), "{asm}");
    assert!(asm.contains("    mov qword [rax], 2\n    push rax\n    mov rax, 2\n"), "{asm}");
    assert!(asm.contains("    mov qword [rcx + 16], rax\n    pop rax\n    push rax\n"), "{asm}");
}

#[test]
fn identical_strings_share_a_label() {
    let asm = compile(vec![
        Definition::extern_func("puts", vec![Parameter::new("s", Type::STRING)], None),
        Definition::func(
            "main",
            vec![],
            None,
            vec![
                Statement::call("puts", vec![Expression::string("hi")]),
                Statement::call("puts", vec![Expression::string("hi")]),
            ],
        )
        .exported(),
    ]);
    assert_eq!(asm.matches(": db 104, 105, 0").count(), 1, "{asm}");
    assert_eq!(asm.matches("lea rax, [str_0]").count(), 2, "{asm}");
}

#[test]
fn inner_declaration_does_not_clobber_outer() {
    let asm = compile(vec![main_returning(vec![
        Statement::let_("x", Expression::int(1)),
        Statement::if_(Expression::bool(true), vec![Statement::let_("x", Expression::int(2))], None),
        Statement::ret(Expression::ident("x")),
    ])]);
    assert!(asm.contains("    mov rax, 2\n    mov qword [rbp - 16], rax\n"), "{asm}");
    assert!(asm.contains("    mov rax, qword [rbp - 8]\n    jmp main_end_0\n"), "{asm}");
}

#[test]
fn sibling_blocks_get_their_own_slots() {
    let asm = compile(vec![main_returning(vec![
        Statement::let_("x", Expression::int(0)),
        Statement::if_(
            Expression::bool(true),
            vec![
                Statement::let_("y", Expression::int(1)),
                Statement::assign("x", Expression::ident("y")),
            ],
            Some(ElseBranch::Block(vec![
                Statement::let_("y", Expression::int(2)),
                Statement::assign("x", Expression::ident("y")),
            ])),
        ),
        Statement::ret(Expression::ident("x")),
    ])]);
    assert!(asm.contains("    mov rax, 1\n    mov qword [rbp - 16], rax\n    mov rax, qword [rbp - 16]\n"), "{asm}");
    assert!(asm.contains("    mov rax, 2\n    mov qword [rbp - 24], rax\n    mov rax, qword [rbp - 24]\n"), "{asm}");
}

#[test]
fn locals_shadow_globals() {
    let asm = compile(vec![
        Definition::global("x", Expression::int(5)),
        Definition::func(
            "param",
            vec![Parameter::new("x", Type::I64)],
            Some(Type::I64),
            vec![Statement::ret(Expression::ident("x"))],
        ),
        main_returning(vec![
            Statement::let_("x", Expression::int(1)),
            Statement::ret(Expression::ident("x")),
        ]),
    ]);
    assert!(!asm.contains("mov rax, qword [global_x"), "{asm}");
    assert_eq!(asm.matches("mov rax, qword [rbp - 8]").count(), 2, "{asm}");
}

#[test]
fn loops_and_break_targets() {
    let asm = compile(vec![Definition::func(
        "spin",
        vec![],
        None,
        vec![Statement::while_(
            Expression::bool(true),
            vec![Statement::if_(Expression::bool(false), vec![Statement::Continue], None), Statement::Break],
        )],
    )]);
    // spin: nub_spin_0 / spin_end_1, loop labels follow
    assert!(asm.contains("while_start_2:\n    mov rax, 1\n    cmp rax, 0\n    je while_end_3\n"), "{asm}");
    assert!(asm.contains("    je if_end_4\n    jmp while_start_2\nif_end_4:\n    jmp while_end_3\n"), "{asm}");
}

#[test]
fn break_without_loop_is_rejected_by_the_generator() {
    let program = TypedProgram {
        functions: vec![TypedFunction {
            signature: Signature {
                name: "f".into(),
                parameters: vec![],
                return_type: None,
            },
            exported: false,
            body: vec![TypedStmt::Break],
        }],
        ..TypedProgram::default()
    };
    let mut labels = LabelGenerator::new();
    let symtab = SymbolTable::build(&program, &mut labels).unwrap();
    let err = generate_asm(&program, &symtab, &mut labels, IndexBase::Zero).unwrap_err();
    assert_eq!(err, CodegenError::BreakOutsideLoop);
}
