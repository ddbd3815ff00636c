use em_core::ast::{AggregateDecl, AstBuilder, BinaryOp, FunctionDecl, Modifier, NodeId};
use em_core::lir::LirType;
use em_core::types::{ScalarKind, Type};
use em_core::{CompileOptions, Location};
use em_sema::{ArgClass, CompilationContext};
use em_vm::VmValue;
use pretty_assertions::assert_eq;

mod support;

use support::{compile, compile_error, int, run};

fn scalar(kind: ScalarKind) -> Type {
    Type::Scalar(kind)
}

fn aggregate(b: &mut AstBuilder, name: &str, fields: &[(&str, Type)]) -> NodeId {
    let mut decl = AggregateDecl::new(name);
    for (field, ty) in fields {
        decl = decl.field(*field, ty.clone());
    }
    b.aggregate(decl)
}

/// Declares the aggregates the classification rules distinguish.
fn shapes(b: &mut AstBuilder) -> Vec<NodeId> {
    let char_ty = scalar(ScalarKind::Char);
    let short = scalar(ScalarKind::Short);
    let long = scalar(ScalarKind::Long);
    let float = scalar(ScalarKind::Float);
    vec![
        aggregate(b, "Pair", &[("a", Type::int()), ("b", Type::int())]),
        aggregate(b, "Bytes", &[("a", char_ty.clone()), ("b", char_ty.clone())]),
        aggregate(b, "Floats", &[("x", float.clone()), ("y", float.clone())]),
        aggregate(b, "Wrapper", &[("v", scalar(ScalarKind::Double))]),
        aggregate(
            b,
            "Big",
            &[("a", long.clone()), ("b", long.clone()), ("c", long.clone())],
        ),
        aggregate(
            b,
            "Triple",
            &[("a", Type::int()), ("b", Type::int()), ("c", Type::int())],
        ),
        aggregate(b, "Mixed", &[("a", Type::int()), ("b", float)]),
        aggregate(b, "Empty", &[]),
        aggregate(
            b,
            "Five",
            &[
                ("a", char_ty.clone()),
                ("b", char_ty.clone()),
                ("c", char_ty.clone()),
                ("d", char_ty.clone()),
                ("e", char_ty.clone()),
            ],
        ),
        aggregate(b, "Nested", &[("p", Type::named("Pair")), ("c", Type::int())]),
        aggregate(
            b,
            "Cic",
            &[("a", char_ty.clone()), ("b", Type::int()), ("c", char_ty.clone())],
        ),
        aggregate(
            b,
            "Quad",
            &[("a", short.clone()), ("b", short.clone()), ("c", short.clone()), ("d", short.clone())],
        ),
        aggregate(b, "Trio", &[("a", char_ty.clone()), ("b", char_ty), ("c", short)]),
        aggregate(
            b,
            "Longs",
            &[("a", long.clone()), ("b", long.clone()), ("c", long.clone()), ("d", long)],
        ),
    ]
}

#[test]
fn aggregates_are_classified_by_shape() {
    let mut b = AstBuilder::new("abi.em");
    let roots = shapes(&mut b);
    let mut ctx = CompilationContext::new(b.finish(), CompileOptions::default());
    ctx.check(&roots).expect("check should succeed");
    let at = Location::new("abi.em", 1);

    let mut classify = |name: &str| ctx.classify_param(&Type::named(name), &at);
    assert_eq!(classify("Pair").expect("Pair"), ArgClass::Merged(ScalarKind::Long));
    assert_eq!(classify("Bytes").expect("Bytes"), ArgClass::Merged(ScalarKind::Short));
    assert_eq!(classify("Floats").expect("Floats"), ArgClass::Vector(ScalarKind::Float, 2));
    assert_eq!(
        classify("Wrapper").expect("Wrapper"),
        ArgClass::Field(scalar(ScalarKind::Double))
    );
    assert_eq!(classify("Big").expect("Big"), ArgClass::Indirect);
    assert_eq!(classify("Triple").expect("Triple"), ArgClass::Indirect);
    assert_eq!(classify("Mixed").expect("Mixed"), ArgClass::Indirect);
    assert_eq!(classify("Cic").expect("Cic"), ArgClass::Merged(ScalarKind::Long));
    assert_eq!(classify("Quad").expect("Quad"), ArgClass::Merged(ScalarKind::Long));
    assert_eq!(classify("Trio").expect("Trio"), ArgClass::Merged(ScalarKind::Int));
    assert_eq!(classify("Longs").expect("Longs"), ArgClass::Indirect);

    let err = classify("Empty").expect_err("Empty has no fields");
    assert_eq!(err.message(), "unclassifiable ABI shape for 'Empty': no fields");
    let err = classify("Five").expect_err("Five has too many fields");
    assert!(err.message().starts_with("unclassifiable ABI shape for 'Five'"));
    let err = classify("Nested").expect_err("Nested holds an aggregate");
    assert_eq!(err.message(), "unclassifiable ABI shape for 'Nested': non-scalar fields");

    assert_eq!(ctx.classify_param(&Type::int(), &at).expect("scalar"), ArgClass::Direct);
}

/// `v.f1 + v.f2 ...`
fn field_sum(b: &mut AstBuilder, fields: &[&str]) -> NodeId {
    let mut sum = None;
    for field in fields {
        let v = b.ident("v");
        let read = b.get(v, field);
        sum = Some(match sum {
            Some(acc) => b.binary(BinaryOp::Add, acc, read),
            None => read,
        });
    }
    sum.expect("at least one field")
}

/// `(v.f1 * 10 + v.f2) * 10 ...`, so every field lands in its own digit.
fn field_digits(b: &mut AstBuilder, fields: &[&str]) -> NodeId {
    let mut digits = None;
    for field in fields {
        let v = b.ident("v");
        let read = b.get(v, field);
        digits = Some(match digits {
            Some(acc) => {
                let ten = b.int(10);
                let shifted = b.binary(BinaryOp::Mul, acc, ten);
                b.binary(BinaryOp::Add, shifted, read)
            }
            None => read,
        });
    }
    digits.expect("at least one field")
}

fn round_trip(
    b: &mut AstBuilder,
    ty: &str,
    fields: &[&str],
    ret: Type,
    values: Vec<NodeId>,
) -> Vec<NodeId> {
    let sum = field_sum(b, fields);
    round_trip_with(b, ty, sum, ret, values)
}

/// `ret take_t(T v) [cdecl64] { return <result>; }` and a caller building
/// `T{values}` and passing it by value.
fn round_trip_with(
    b: &mut AstBuilder,
    ty: &str,
    result: NodeId,
    ret: Type,
    values: Vec<NodeId>,
) -> Vec<NodeId> {
    let ret_stmt = b.ret(Some(result));
    let body = b.block(vec![ret_stmt]);
    let callee_name = format!("take_{}", ty.to_lowercase());
    let callee = b.function(
        FunctionDecl::new(callee_name.as_str(), ret.clone())
            .param("v", Type::named(ty))
            .modifier(Modifier::Cdecl64)
            .modifier(Modifier::C)
            .body(body),
    );

    let lit = b.aggregate_lit(Type::named(ty), values);
    let local = b.var("value", Some(Type::named(ty)), Some(lit));
    let value = b.ident("value");
    let call = b.call_named(&callee_name, vec![value]);
    let ret_stmt = b.ret(Some(call));
    let body = b.block(vec![local, ret_stmt]);
    let caller = b.function(
        FunctionDecl::new(format!("call_{}", ty.to_lowercase()), ret)
            .modifier(Modifier::C)
            .body(body),
    );
    vec![callee, caller]
}

#[test]
fn lowered_signatures_follow_the_classes() {
    let mut b = AstBuilder::new("abi.em");
    let mut roots = shapes(&mut b);
    let values = vec![b.int(3), b.int(4)];
    roots.extend(round_trip(&mut b, "Pair", &["a", "b"], Type::int(), values));
    let values = vec![b.float(1.5), b.float(2.25)];
    roots.extend(round_trip(&mut b, "Floats", &["x", "y"], scalar(ScalarKind::Float), values));
    let values = vec![b.float(2.5)];
    roots.extend(round_trip(&mut b, "Wrapper", &["v"], scalar(ScalarKind::Double), values));
    let values = vec![b.int(1), b.int(2), b.int(3)];
    roots.extend(round_trip(&mut b, "Big", &["a", "b", "c"], scalar(ScalarKind::Long), values));

    let unit = compile(b, &roots);
    let params = |name: &str| {
        unit.program
            .function(name)
            .map(|f| f.signature.params.clone())
            .expect("function should be emitted")
    };
    assert_eq!(params("take_pair"), vec![LirType::I64]);
    assert_eq!(params("take_floats"), vec![LirType::Vector(Box::new(LirType::F32), 2)]);
    assert_eq!(params("take_wrapper"), vec![LirType::F64]);
    assert!(matches!(params("take_big").as_slice(), [LirType::Ptr(_)]));

    assert_eq!(run(&unit, "call_pair", vec![]), int(7));
    assert_eq!(run(&unit, "call_floats", vec![]), VmValue::Float(3.75));
    assert_eq!(run(&unit, "call_wrapper", vec![]), VmValue::Float(2.5));
    assert_eq!(run(&unit, "call_big", vec![]), VmValue::int(6, 64));
}

#[test]
fn unclassifiable_parameters_fail_emission() {
    let mut b = AstBuilder::new("abi.em");
    let mut roots = shapes(&mut b);
    b.at_line(20);
    let zero = b.int(0);
    let ret = b.ret(Some(zero));
    let body = b.block(vec![ret]);
    roots.push(b.function(
        FunctionDecl::new("take_five", Type::int())
            .param("f", Type::named("Five"))
            .modifier(Modifier::Cdecl64)
            .modifier(Modifier::C)
            .body(body),
    ));

    let err = compile_error(b, &roots);
    assert!(err.message().starts_with("unclassifiable ABI shape for 'Five'"));
    assert_eq!(err.line(), Some(20));
}

#[test]
fn default_convention_passes_aggregates_unchanged() {
    let mut b = AstBuilder::new("abi.em");
    let mut roots = shapes(&mut b);
    let v = b.ident("v");
    let read = b.get(v, "a");
    let ret = b.ret(Some(read));
    let body = b.block(vec![ret]);
    roots.push(b.function(
        FunctionDecl::new("first", Type::int())
            .param("v", Type::named("Five"))
            .modifier(Modifier::C)
            .body(body),
    ));

    let unit = compile(b, &roots);
    let function = unit.program.function("first").expect("function should be emitted");
    assert!(matches!(function.signature.params.as_slice(), [LirType::Struct { .. }]));
}

#[test]
fn merged_fields_arrive_in_their_own_slots() {
    let mut b = AstBuilder::new("abi.em");
    let mut roots = shapes(&mut b);
    let values = vec![b.int(1), b.int(2)];
    let digits = field_digits(&mut b, &["a", "b"]);
    roots.extend(round_trip_with(&mut b, "Pair", digits, Type::int(), values));
    let values = vec![b.int(-1), b.int(-2), b.int(3)];
    let digits = field_digits(&mut b, &["a", "b", "c"]);
    roots.extend(round_trip_with(&mut b, "Cic", digits, Type::int(), values));
    let values = vec![b.int(1), b.int(2), b.int(3), b.int(4)];
    let digits = field_digits(&mut b, &["a", "b", "c", "d"]);
    roots.extend(round_trip_with(&mut b, "Quad", digits, Type::int(), values));
    let values = vec![b.int(5), b.int(-6), b.int(700)];
    let digits = field_digits(&mut b, &["a", "b", "c"]);
    roots.extend(round_trip_with(&mut b, "Trio", digits, Type::int(), values));

    let unit = compile(b, &roots);
    let params = |name: &str| {
        unit.program
            .function(name)
            .map(|f| f.signature.params.clone())
            .expect("function should be emitted")
    };
    assert_eq!(params("take_cic"), vec![LirType::I64]);
    assert_eq!(params("take_quad"), vec![LirType::I64]);
    assert_eq!(params("take_trio"), vec![LirType::I32]);

    assert_eq!(run(&unit, "call_pair", vec![]), int(12));
    assert_eq!(run(&unit, "call_cic", vec![]), int(-117));
    assert_eq!(run(&unit, "call_quad", vec![]), int(1234));
    assert_eq!(run(&unit, "call_trio", vec![]), int(5 * 100 - 6 * 10 + 700));
}

#[test]
fn merged_pair_fields_compare_separately() {
    // bool take_pair(Pair v) { return v.a == 1 && v.b == 2; }
    let mut b = AstBuilder::new("abi.em");
    let mut roots = shapes(&mut b);
    let v = b.ident("v");
    let a = b.get(v, "a");
    let one = b.int(1);
    let a_is_one = b.binary(BinaryOp::Eq, a, one);
    let v = b.ident("v");
    let second = b.get(v, "b");
    let two = b.int(2);
    let b_is_two = b.binary(BinaryOp::Eq, second, two);
    let both = b.binary(BinaryOp::And, a_is_one, b_is_two);
    let values = vec![b.int(1), b.int(2)];
    roots.extend(round_trip_with(&mut b, "Pair", both, Type::bool(), values));

    let unit = compile(b, &roots);
    assert_eq!(run(&unit, "call_pair", vec![]), VmValue::bool(true));
}

#[test]
fn four_longs_travel_by_pointer() {
    let mut b = AstBuilder::new("abi.em");
    let mut roots = shapes(&mut b);
    let values = vec![b.int(1), b.int(2), b.int(3), b.int(4)];
    let digits = field_digits(&mut b, &["a", "b", "c", "d"]);
    roots.extend(round_trip_with(
        &mut b,
        "Longs",
        digits,
        scalar(ScalarKind::Long),
        values,
    ));

    let unit = compile(b, &roots);
    let function = unit.program.function("take_longs").expect("function should be emitted");
    assert!(matches!(function.signature.params.as_slice(), [LirType::Ptr(_)]));
    assert_eq!(run(&unit, "call_longs", vec![]), VmValue::int(1234, 64));
}
