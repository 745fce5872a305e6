use crate::ast::{BinaryOperator, Definition, ElseBranch, Expression, Program, Statement, StructField};
use crate::codegen::{CodegenError, IndexBase, generate_ir};
use crate::labels::LabelGenerator;
use crate::semantics::{SymbolTable, resolve_program};
use crate::types::{Parameter, PrimitiveKind, Type};

fn compile_with(definitions: Vec<Definition>, index_base: IndexBase) -> Result<String, CodegenError> {
    let program = resolve_program(&Program::single(definitions)).expect("program should type check");
    let mut labels = LabelGenerator::new();
    let symtab = SymbolTable::build(&program, &mut labels).expect("symbols should resolve");
    generate_ir(&program, &symtab, &mut labels, index_base)
}

fn compile(definitions: Vec<Definition>) -> String {
    compile_with(definitions, IndexBase::Zero).expect("code generation should succeed")
}

#[test]
fn values_are_bound_once() {
    let ir = compile(vec![Definition::func(
        "add",
        vec![Parameter::new("a", Type::I64), Parameter::new("b", Type::I64)],
        Some(Type::I64),
        vec![Statement::ret(Expression::binary(
            Expression::ident("a"),
            BinaryOperator::Plus,
            Expression::ident("b"),
        ))],
    )]);
    let expected = "
function l $nub_add_0(l %p0, l %p1) {
@start
    %v0 =l alloc8 8
    %v1 =l alloc8 8
    storel %p0, %v0
    storel %p1, %v1
    %t2 =l loadl %v0
    %t3 =l loadl %v1
    %t4 =l add %t2, %t3
    ret %t4
}
";
    assert_eq!(ir, expected);
}

#[test]
fn nothing_is_emitted_after_a_terminator() {
    let ir = compile(vec![Definition::func(
        "spin",
        vec![],
        None,
        vec![Statement::while_(Expression::bool(true), vec![Statement::Break, Statement::Continue])],
    )]);
    let expected = "
function $nub_spin_0() {
@start
@while_start_2
    jnz 1, @while_body_3, @while_end_4
@while_body_3
    jmp @while_end_4
@while_end_4
    ret
}
";
    assert_eq!(ir, expected);
}

#[test]
fn value_functions_end_in_hlt() {
    let ir = compile(vec![Definition::func(
        "pick",
        vec![Parameter::new("c", Type::BOOL)],
        Some(Type::I64),
        vec![Statement::if_(
            Expression::ident("c"),
            vec![Statement::ret(Expression::int(1))],
            Some(ElseBranch::Block(vec![Statement::ret(Expression::int(2))])),
        )],
    )]);
    let expected = "
function l $nub_pick_0(w %p0) {
@start
    %v0 =l alloc8 8
    storew %p0, %v0
    %t3 =w loadw %v0
    jnz %t3, @then_4, @else_5
@then_4
    ret 1
@else_5
    ret 2
@if_end_2
    hlt
}
";
    assert_eq!(ir, expected);
}

#[test]
fn one_based_bounds_check() {
    let ir = compile_with(
        vec![
            Definition::func(
                "main",
                vec![],
                Some(Type::I64),
                vec![
                    Statement::let_("xs", Expression::new_array(Expression::int(3), Type::I64)),
                    Statement::ret(Expression::index("xs", Expression::int(1))),
                ],
            )
            .exported(),
        ],
        IndexBase::One,
    )
    .unwrap();
    let expected = "
export function l $main() {
@start
    %v0 =l alloc8 8
    %t1 =l mul 3, 8
    %t2 =l add %t1, 8
    %t3 =l call $nub_alloc(l %t2)
    storel 3, %t3
    storel %t3, %v0
    %t4 =l loadl %v0
    %t5 =l loadl %t4
    %t7 =w csltl 1, 1
    jnz %t7, @out_of_bounds_6, @in_bounds_8
@in_bounds_8
    %t9 =w csgtl 1, %t5
    jnz %t9, @out_of_bounds_6, @in_bounds_10
@in_bounds_10
    %t11 =l mul 1, 8
    %t12 =l add %t4, %t11
    %t13 =l loadl %t12
    ret %t13
@out_of_bounds_6
    call $exit(w 134)
    hlt
}
";
    assert_eq!(ir, expected);
}

#[test]
fn zero_based_index_skips_the_header() {
    let ir = compile(vec![Definition::func(
        "first",
        vec![Parameter::new("xs", Type::array_of(Type::I64))],
        Some(Type::I64),
        vec![Statement::ret(Expression::index("xs", Expression::int(0)))],
    )]);
    assert!(ir.contains("=w csltl 0, 0\n"), "{ir}");
    assert!(ir.contains("=w csgel 0, %t"), "{ir}");
    assert!(ir.contains("    %t11 =l add %t10, 8\n    %t12 =l loadl %t11\n"), "{ir}");
}

#[test]
fn globals_and_strings_become_data() {
    let ir = compile(vec![
        Definition::global(
            "g",
            Expression::binary(
                Expression::int(2),
                BinaryOperator::Plus,
                Expression::binary(Expression::int(3), BinaryOperator::Multiply, Expression::int(4)),
            ),
        ),
        Definition::global("greeting", Expression::string("hi")),
        Definition::func("main", vec![], Some(Type::I64), vec![Statement::ret(Expression::ident("g"))]).exported(),
    ]);
    // str_0, main_end_1, then the globals
    assert!(ir.starts_with("data $str_0 = { b 104, b 105, b 0 }\n"), "{ir}");
    assert!(ir.contains("data $global_g_2 = { l 14 }\n"), "{ir}");
    assert!(ir.contains("data $global_greeting_3 = { l $str_0 }\n"), "{ir}");
    assert!(ir.contains("export function l $main() {\n"), "{ir}");
    assert!(ir.contains("=l loadl $global_g_2\n"), "{ir}");
}

#[test]
fn locals_shadow_globals() {
    let ir = compile(vec![
        Definition::global("x", Expression::int(5)),
        Definition::func(
            "f",
            vec![],
            Some(Type::I64),
            vec![
                Statement::let_("x", Expression::int(1)),
                Statement::ret(Expression::ident("x")),
            ],
        ),
    ]);
    assert!(ir.contains("storel 1, %v0\n    %t3 =l loadl %v0\n"), "{ir}");
    assert!(!ir.contains("loadl $global_x"), "{ir}");
}

#[test]
fn narrow_arithmetic_is_re_extended() {
    let ir = compile(vec![Definition::func(
        "add",
        vec![
            Parameter::new("a", Type::Primitive(PrimitiveKind::I8)),
            Parameter::new("b", Type::Primitive(PrimitiveKind::I8)),
        ],
        Some(Type::Primitive(PrimitiveKind::I8)),
        vec![Statement::ret(Expression::binary(
            Expression::ident("a"),
            BinaryOperator::Plus,
            Expression::ident("b"),
        ))],
    )]);
    assert!(ir.contains("    %t4 =w add %t2, %t3\n    %t5 =w extsb %t4\n    ret %t5\n"), "{ir}");
}

#[test]
fn unsigned_division_and_comparison() {
    let ir = compile(vec![Definition::func(
        "small",
        vec![Parameter::new("a", Type::U64), Parameter::new("b", Type::U64)],
        Some(Type::BOOL),
        vec![Statement::ret(Expression::binary(
            Expression::binary(Expression::ident("a"), BinaryOperator::Divide, Expression::ident("b")),
            BinaryOperator::LessThan,
            Expression::ident("b"),
        ))],
    )]);
    assert!(ir.contains("=l udiv"), "{ir}");
    assert!(ir.contains("=w cultl"), "{ir}");
}

#[test]
fn calls_and_variadics() {
    let ir = compile(vec![
        Definition::extern_func(
            "printf",
            vec![Parameter::new("fmt", Type::STRING), Parameter::variadic("args", Type::ANY)],
            Some(Type::I32),
        ),
        Definition::func(
            "sum",
            vec![Parameter::new("first", Type::I64), Parameter::variadic("rest", Type::I64)],
            Some(Type::I64),
            vec![Statement::ret(Expression::ident("first"))],
        ),
        Definition::func(
            "main",
            vec![],
            None,
            vec![
                Statement::call("printf", vec![Expression::string("%d\n"), Expression::int(3)]),
                Statement::call("sum", vec![Expression::int(1), Expression::int(2), Expression::int(3)]),
            ],
        )
        .exported(),
    ]);
    assert!(ir.contains("=w call $printf(l $str_0, ..., l 3)\n"), "{ir}");
    assert!(ir.contains("=l call $nub_alloc(l 24)\n"), "{ir}");
    assert!(ir.contains("storel 2, %t"), "{ir}");
    assert!(ir.contains("=l call $nub_sum_1(l 1, l %t"), "{ir}");
    assert!(ir.ends_with("    ret\n}\n"), "{ir}");
}

#[test]
fn values_are_widened_into_any() {
    let ir = compile(vec![
        Definition::extern_func("show", vec![Parameter::new("value", Type::ANY)], None),
        Definition::func(
            "main",
            vec![],
            None,
            vec![Statement::call(
                "show",
                vec![Expression::cast(Type::I32, Expression::int(3))],
            )],
        )
        .exported(),
    ]);
    assert!(ir.contains("    %t1 =w copy 3\n    %t2 =l extsw %t1\n    call $show(l %t2)\n"), "{ir}");
}

#[test]
fn structs_are_heap_objects() {
    let ir = compile(vec![
        Definition::struct_def(
            "Point",
            vec![
                StructField::new("x", Type::I64),
                StructField::with_default("y", Type::I64, Expression::int(7)),
            ],
        ),
        Definition::func(
            "make",
            vec![],
            Some(Type::I64),
            vec![
                Statement::let_("p", Expression::new_struct("Point", vec![("x", Expression::int(5))])),
                Statement::ret(Expression::field(Expression::ident("p"), "y")),
            ],
        ),
    ]);
    assert!(
        ir.contains("    %t2 =l call $nub_alloc(l 16)\n    storel 5, %t2\n    %t3 =l add %t2, 8\n    storel 7, %t3\n"),
        "{ir}"
    );
    assert!(ir.contains("    %t5 =l add %t4, 8\n    %t6 =l loadl %t5\n"), "{ir}");
}

#[test]
fn float_operations() {
    let ir = compile(vec![Definition::func(
        "check",
        vec![Parameter::new("x", Type::F32)],
        Some(Type::BOOL),
        vec![Statement::ret(Expression::binary(
            Expression::cast(Type::F64, Expression::ident("x")),
            BinaryOperator::Equal,
            Expression::literal("0.5", PrimitiveKind::F64),
        ))],
    )]);
    assert!(ir.contains("(s %p0)"), "{ir}");
    assert!(ir.contains("=d exts %t"), "{ir}");
    assert!(ir.contains("    %t4 =w ceqd %t3, d_0.5\n"), "{ir}");
}

#[test]
fn struct_equality_is_rejected() {
    let p = || Expression::new_struct("Point", vec![("x", Expression::int(1))]);
    let err = compile_with(
        vec![
            Definition::struct_def("Point", vec![StructField::new("x", Type::I64)]),
            Definition::func(
                "same",
                vec![],
                Some(Type::BOOL),
                vec![Statement::ret(Expression::binary(p(), BinaryOperator::NotEqual, p()))],
            ),
        ],
        IndexBase::Zero,
    )
    .unwrap_err();
    assert_eq!(
        err,
        CodegenError::UnsupportedComparison {
            operator: "!=",
            ty: Type::named("Point"),
        }
    );
}

#[test]
fn string_equality_calls_the_runtime() {
    let ir = compile(vec![Definition::func(
        "same",
        vec![Parameter::new("a", Type::STRING), Parameter::new("b", Type::STRING)],
        Some(Type::BOOL),
        vec![Statement::ret(Expression::binary(
            Expression::ident("a"),
            BinaryOperator::Equal,
            Expression::ident("b"),
        ))],
    )]);
    assert!(ir.contains("    %t4 =w call $nub_string_equals(l %t2, l %t3)\n    %t5 =w extub %t4\n    ret %t5\n"), "{ir}");
}
