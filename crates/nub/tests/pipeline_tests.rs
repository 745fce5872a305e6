use nub::ast::{BinaryOperator, Definition, ElseBranch, Expression, Program, Statement, StructField};
use nub::codegen::{CodegenError, IndexBase};
use nub::semantics::symtab::SymbolError;
use nub::semantics::typed_ast::{Constant, TypedExpr};
use nub::semantics::{SymbolTable, TypeCheckError, resolve_program};
use nub::types::{Parameter, Type};
use nub::{CompileError, CompileOptions, LabelGenerator, Target, compile};

fn asm(program: &Program, index_base: IndexBase) -> Result<String, CompileError> {
    let options = CompileOptions {
        index_base,
        ..CompileOptions::default()
    };
    compile(program, &options).map(|artifact| artifact.output)
}

fn point() -> Definition {
    Definition::struct_def(
        "Point",
        vec![
            StructField::new("x", Type::I64),
            StructField::with_default("y", Type::I64, Expression::int(0)),
        ],
    )
}

#[test]
fn struct_round_trip() {
    let program = Program::single(vec![
        point(),
        Definition::func(
            "main",
            vec![],
            Some(Type::I64),
            vec![
                Statement::let_("p", Expression::new_struct("Point", vec![("x", Expression::int(5))])),
                Statement::ret(Expression::binary(
                    Expression::field(Expression::ident("p"), "x"),
                    BinaryOperator::Plus,
                    Expression::field(Expression::ident("p"), "y"),
                )),
            ],
        )
        .exported(),
    ]);

    let typed = resolve_program(&program).unwrap();
    let init = typed
        .exprs
        .iter()
        .find_map(|expr| match expr {
            TypedExpr::StructInit(ty, initializers) => Some((ty, initializers)),
            _ => None,
        })
        .unwrap();
    assert_eq!(init.0, &Type::named("Point"));
    assert_eq!(init.1.len(), 1);

    let default = typed.struct_def("Point").unwrap().fields[1].default.unwrap();
    assert_eq!(typed.expr(default), &TypedExpr::Literal(Type::I64, Constant::Int(0)));

    let output = asm(&program, IndexBase::Zero).unwrap();
    assert!(output.contains("mov rdi, 16"), "{output}");
    assert!(output.contains("mov rax, qword [rax + 0]"), "{output}");
    assert!(output.contains("mov rax, qword [rax + 8]"), "{output}");
}

#[test]
fn global_initializers_are_baked() {
    let program = Program::single(vec![
        Definition::global(
            "g",
            Expression::binary(
                Expression::int(2),
                BinaryOperator::Plus,
                Expression::binary(Expression::int(3), BinaryOperator::Multiply, Expression::int(4)),
            ),
        ),
        Definition::func("main", vec![], Some(Type::I64), vec![Statement::ret(Expression::ident("g"))]).exported(),
    ]);

    let output = asm(&program, IndexBase::Zero).unwrap();
    assert!(output.contains(": dq 14"), "{output}");
    assert!(!output.contains("imul"), "{output}");

    let options = CompileOptions {
        target: Target::Ir,
        ..CompileOptions::default()
    };
    let ir = compile(&program, &options).unwrap().output;
    assert!(ir.contains("= { l 14 }"), "{ir}");
    assert!(!ir.contains(" mul "), "{ir}");
}

fn variadic_program(trailing: Vec<Expression>) -> Program {
    let mut arguments = vec![Expression::int(0)];
    arguments.extend(trailing);
    Program::single(vec![
        Definition::func(
            "f",
            vec![Parameter::new("a", Type::I64), Parameter::variadic("rest", Type::I64)],
            Some(Type::I64),
            vec![Statement::ret(Expression::ident("a"))],
        ),
        Definition::func("main", vec![], Some(Type::I64), vec![Statement::ret(Expression::call("f", arguments))])
            .exported(),
    ])
}

#[test]
fn variadic_arity() {
    for count in [1, 2, 5] {
        let trailing = (0..count).map(Expression::int).collect();
        let output = asm(&variadic_program(trailing), IndexBase::Zero).unwrap();
        let size = 8 + 8 * count;
        assert!(output.contains(&format!("mov rdi, {size}\n")), "{output}");
    }

    let err = asm(
        &variadic_program(vec![Expression::int(1), Expression::string("two")]),
        IndexBase::Zero,
    )
    .unwrap_err();
    assert_eq!(
        err,
        CompileError::TypeCheck(TypeCheckError::Symbol(SymbolError::FunctionNotFound {
            name: "f".into(),
            arg_types: vec![Type::I64, Type::I64, Type::STRING],
        }))
    );
}

#[test]
fn undefined_function_is_named() {
    let program = Program::single(vec![Definition::func(
        "main",
        vec![],
        None,
        vec![Statement::call("g", vec![Expression::int(1), Expression::int(2)])],
    )]);
    let err = asm(&program, IndexBase::Zero).unwrap_err();
    assert_eq!(
        err,
        CompileError::TypeCheck(TypeCheckError::Symbol(SymbolError::FunctionNotFound {
            name: "g".into(),
            arg_types: vec![Type::I64, Type::I64],
        }))
    );
    let message = err.to_string();
    assert!(message.contains("`g`"), "{message}");
    assert!(message.contains("i64, i64"), "{message}");
}

#[test]
fn struct_comparison_fails_in_codegen() {
    let p = || Expression::new_struct("Point", vec![("x", Expression::int(1))]);
    let program = Program::single(vec![
        point(),
        Definition::func(
            "same",
            vec![],
            Some(Type::BOOL),
            vec![Statement::ret(Expression::binary(p(), BinaryOperator::Equal, p()))],
        ),
    ]);

    // type checking accepts it
    assert!(resolve_program(&program).is_ok());

    let err = asm(&program, IndexBase::Zero).unwrap_err();
    assert_eq!(
        err,
        CompileError::Codegen(CodegenError::UnsupportedComparison {
            operator: "==",
            ty: Type::named("Point"),
        })
    );
    assert!(err.to_string().contains("Point"));
}

#[test]
fn one_based_indexing_bounds() {
    let program = Program::single(vec![Definition::func(
        "main",
        vec![],
        Some(Type::I64),
        vec![
            Statement::let_("xs", Expression::new_array(Expression::int(3), Type::I64)),
            Statement::assign_index("xs", Expression::int(3), Expression::int(30)),
            Statement::ret(Expression::index("xs", Expression::int(1))),
        ],
    )
    .exported()]);

    let output = asm(&program, IndexBase::One).unwrap();
    // index 0 fails the low check, L + 1 fails the high one
    assert_eq!(output.matches("cmp rcx, 1\n    jl nub_out_of_bounds\n").count(), 2, "{output}");
    assert_eq!(output.matches("cmp rcx, rdx\n    jg nub_out_of_bounds\n").count(), 2, "{output}");
    assert!(output.contains("lea rax, [rax + rcx * 8 + 0]"), "{output}");

    let zero_based = asm(&program, IndexBase::Zero).unwrap();
    assert!(zero_based.contains("cmp rcx, rdx\n    jge nub_out_of_bounds\n"), "{zero_based}");
    assert!(zero_based.contains("lea rax, [rax + rcx * 8 + 8]"), "{zero_based}");
}

#[test]
fn function_resolution_is_stable() {
    let program = Program::single(vec![
        Definition::func(
            "pick",
            vec![Parameter::new("x", Type::I64)],
            Some(Type::I64),
            vec![Statement::ret(Expression::ident("x"))],
        ),
        Definition::func(
            "pick",
            vec![Parameter::new("x", Type::STRING)],
            Some(Type::STRING),
            vec![Statement::ret(Expression::ident("x"))],
        ),
    ]);
    let typed = resolve_program(&program).unwrap();
    let mut labels = LabelGenerator::new();
    let symtab = SymbolTable::build(&typed, &mut labels).unwrap();

    let first = symtab.resolve_func("pick", &[Type::I64]).unwrap();
    let again = symtab.resolve_func("pick", &[Type::I64]).unwrap();
    let other = symtab.resolve_func("pick", &[Type::STRING]).unwrap();
    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_eq!(symtab.func(other).signature().return_type, Some(Type::STRING));
}

#[test]
fn frame_offsets_follow_declaration_order() {
    let program = Program::single(vec![Definition::func(
        "f",
        vec![Parameter::new("a", Type::I64), Parameter::new("b", Type::BOOL)],
        None,
        vec![
            Statement::let_("x", Expression::int(1)),
            Statement::if_(
                Expression::ident("b"),
                vec![Statement::let_("y", Expression::int(2))],
                Some(ElseBranch::Block(vec![Statement::let_("z", Expression::int(3))])),
            ),
            Statement::while_(
                Expression::ident("b"),
                vec![Statement::let_("w", Expression::int(4)), Statement::Break],
            ),
        ],
    )]);
    let typed = resolve_program(&program).unwrap();
    let mut labels = LabelGenerator::new();
    let symtab = SymbolTable::build(&typed, &mut labels).unwrap();

    let (idx, func) = symtab.local_funcs().next().unwrap();
    let offsets: Vec<(&str, u32)> = func.variables.iter().map(|v| (v.name.as_str(), v.offset)).collect();
    assert_eq!(offsets, [("a", 8), ("b", 16), ("x", 24), ("y", 32), ("z", 40), ("w", 48)]);
    assert_eq!(func.stack_allocation(), 48);
    assert_eq!(symtab.resolve_local_variable(idx, "w").unwrap().offset, 48);
}

#[test]
fn missing_return_is_rejected_but_infinite_loops_are_not() {
    let missing = Program::single(vec![Definition::func(
        "f",
        vec![Parameter::new("c", Type::BOOL)],
        Some(Type::I64),
        vec![Statement::if_(Expression::ident("c"), vec![Statement::ret(Expression::int(1))], None)],
    )]);
    assert_eq!(
        resolve_program(&missing).unwrap_err(),
        TypeCheckError::MissingReturn {
            function: "f".into(),
            expected: Type::I64,
        }
    );

    let forever = Program::single(vec![Definition::func(
        "f",
        vec![],
        Some(Type::I64),
        vec![Statement::while_(Expression::bool(true), vec![])],
    )]);
    assert!(resolve_program(&forever).is_ok());
}

#[test]
fn locals_shadow_globals_in_both_backends() {
    let program = Program::single(vec![
        Definition::global("count", Expression::int(10)),
        Definition::func(
            "main",
            vec![],
            Some(Type::I64),
            vec![
                Statement::let_("count", Expression::int(1)),
                Statement::ret(Expression::ident("count")),
            ],
        )
        .exported(),
    ]);
    let output = asm(&program, IndexBase::Zero).unwrap();
    assert!(output.contains("mov rax, qword [rbp - 8]\n    jmp main_end_0\n"), "{output}");
    assert!(!output.contains("mov rax, qword [global_count"), "{output}");

    let options = CompileOptions {
        target: Target::Ir,
        ..CompileOptions::default()
    };
    let ir = compile(&program, &options).unwrap().output;
    assert!(ir.contains("loadl %v0"), "{ir}");
    assert!(!ir.contains("loadl $global_count"), "{ir}");
}

#[test]
fn self_constructing_default_fails_before_codegen() {
    let program = Program::single(vec![
        Definition::struct_def(
            "Node",
            vec![StructField::with_default("next", Type::named("Node"), Expression::new_struct("Node", vec![]))],
        ),
        Definition::func(
            "main",
            vec![],
            None,
            vec![Statement::let_("n", Expression::new_struct("Node", vec![]))],
        )
        .exported(),
    ]);
    for target in [Target::Asm, Target::Ir] {
        let options = CompileOptions {
            target,
            ..CompileOptions::default()
        };
        assert!(matches!(
            compile(&program, &options),
            Err(CompileError::TypeCheck(TypeCheckError::RecursiveStructDefault { .. }))
        ));
    }
}

#[test]
fn exported_overloads_fail_instead_of_emitting_twice() {
    let program = Program::single(vec![
        Definition::func("f", vec![Parameter::new("a", Type::I64)], None, vec![]).exported(),
        Definition::func("f", vec![Parameter::new("a", Type::STRING)], None, vec![]).exported(),
    ]);
    assert!(matches!(
        asm(&program, IndexBase::Zero),
        Err(CompileError::Symbol(SymbolError::DuplicateLabel { label, .. })) if label == "f"
    ));
}
