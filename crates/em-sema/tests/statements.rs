use em_core::ast::{AggregateDecl, AstBuilder, BinaryOp, FunctionDecl, NodeId, TemplateParam, UnaryOp};
use em_core::types::{TemplateArg, Type};
use em_vm::VmValue;
use pretty_assertions::assert_eq;

mod support;

use support::{c_function, compile, compile_error, int, run};

/// `struct Point { int x = 1; int y = 2; this(int y0) { this.y = y0; } }`
fn point(b: &mut AstBuilder) -> NodeId {
    let this = b.ident("this");
    let field = b.get(this, "y");
    let y0 = b.ident("y0");
    let assign = b.assign(field, y0);
    let body = b.block(vec![assign]);
    let ctor = b.function(FunctionDecl::constructor().param("y0", Type::int()).body(body));
    let one = b.int(1);
    let two = b.int(2);
    b.aggregate(
        AggregateDecl::new("Point")
            .field_default("x", Type::int(), one)
            .field_default("y", Type::int(), two)
            .method(ctor),
    )
}

/// `struct Guard { int* hits; ~this() { *this.hits += 1; } }`
fn guard(b: &mut AstBuilder) -> NodeId {
    let this = b.ident("this");
    let hits = b.get(this, "hits");
    let target = b.unary(UnaryOp::Deref, hits);
    let one = b.int(1);
    let bump = b.binary(BinaryOp::AddAssign, target, one);
    let body = b.block(vec![bump]);
    let dtor = b.function(FunctionDecl::destructor().body(body));
    b.aggregate(
        AggregateDecl::new("Guard")
            .field("hits", Type::int().pointer_to())
            .method(dtor),
    )
}

fn sum_fields(b: &mut AstBuilder, name: &str) -> NodeId {
    let x = b.ident(name);
    let x = b.get(x, "x");
    let y = b.ident(name);
    let y = b.get(y, "y");
    let sum = b.binary(BinaryOp::Add, x, y);
    b.ret(Some(sum))
}

#[test]
fn constructors_start_from_field_defaults() {
    let mut b = AstBuilder::new("ctor.em");
    let point = point(&mut b);
    let forty = b.int(40);
    let built = b.call_named("Point", vec![forty]);
    let decl = b.var("p", Some(Type::named("Point")), Some(built));
    let ret = sum_fields(&mut b, "p");
    let f = c_function(&mut b, "build", Type::int(), &[], vec![decl, ret]);

    let unit = compile(b, &[point, f]);
    assert_eq!(run(&unit, "build", vec![]), int(41));
    // called by the aggregate's name, linked like a free function
    assert!(unit.program.function("_EmF9Point[_i]").is_some());
}

#[test]
fn aggregates_without_constructors_build_their_defaults() {
    let mut b = AstBuilder::new("defaults.em");
    let seven = b.int(7);
    let plain = b.aggregate(
        AggregateDecl::new("Plain")
            .field("x", Type::int())
            .field_default("y", Type::int(), seven),
    );
    let built = b.call_named("Plain", vec![]);
    let decl = b.var("p", None, Some(built));
    let ret = sum_fields(&mut b, "p");
    let f = c_function(&mut b, "build", Type::int(), &[], vec![decl, ret]);

    let unit = compile(b, &[plain, f]);
    assert_eq!(run(&unit, "build", vec![]), int(7));
}

#[test]
fn default_constructors_take_no_arguments() {
    let mut b = AstBuilder::new("defaults.em");
    let plain = b.aggregate(AggregateDecl::new("Plain").field("x", Type::int()));
    b.at_line(4);
    let one = b.int(1);
    let built = b.call_named("Plain", vec![one]);
    let f = c_function(&mut b, "build", Type::Void, &[], vec![built]);

    let err = compile_error(b, &[plain, f]);
    assert_eq!(err.message(), "'Plain' has no constructor taking 1 arguments");
    assert_eq!(err.line(), Some(4));
}

#[test]
fn locals_and_literals_pick_up_field_defaults() {
    let mut b = AstBuilder::new("defaults.em");
    let ten = b.int(10);
    let five = b.int(5);
    let config = b.aggregate(
        AggregateDecl::new("Config")
            .field_default("x", Type::int(), ten)
            .field_default("y", Type::int(), five),
    );
    let outer = b.aggregate(
        AggregateDecl::new("Outer")
            .field("inner", Type::named("Config"))
            .field("z", Type::int()),
    );

    // Outer o; Config c = Config { 1 }; return o.inner.x + o.inner.y + c.x + c.y;
    let o = b.var("o", Some(Type::named("Outer")), None);
    let one = b.int(1);
    let lit = b.aggregate_lit(Type::named("Config"), vec![one]);
    let c = b.var("c", Some(Type::named("Config")), Some(lit));
    let o_ref = b.ident("o");
    let inner = b.get(o_ref, "inner");
    let inner_x = b.get(inner, "x");
    let o_ref = b.ident("o");
    let inner = b.get(o_ref, "inner");
    let inner_y = b.get(inner, "y");
    let c_ref = b.ident("c");
    let c_x = b.get(c_ref, "x");
    let c_ref = b.ident("c");
    let c_y = b.get(c_ref, "y");
    let sum = b.binary(BinaryOp::Add, inner_x, inner_y);
    let sum = b.binary(BinaryOp::Add, sum, c_x);
    let sum = b.binary(BinaryOp::Add, sum, c_y);
    let ret = b.ret(Some(sum));
    let f = c_function(&mut b, "defaults", Type::int(), &[], vec![o, c, ret]);

    let unit = compile(b, &[config, outer, f]);
    assert_eq!(run(&unit, "defaults", vec![]), int(21));
}

#[test]
fn generic_aggregates_are_constructed_through_their_instance() {
    let mut b = AstBuilder::new("generic_ctor.em");
    let this = b.ident("this");
    let field = b.get(this, "item");
    let v = b.ident("v");
    let assign = b.assign(field, v);
    let body = b.block(vec![assign]);
    let ctor = b.function(FunctionDecl::constructor().param("v", Type::named("T")).body(body));
    let boxed = b.aggregate(
        AggregateDecl::new("Box")
            .template(TemplateParam::ty("T"))
            .field("item", Type::named("T"))
            .method(ctor),
    );
    let nine = b.int(9);
    let built = b.call_generic("Box", vec![TemplateArg::Type(Type::int())], vec![nine]);
    let item = b.get(built, "item");
    let ret = b.ret(Some(item));
    let f = c_function(&mut b, "unbox", Type::int(), &[], vec![ret]);

    let unit = compile(b, &[boxed, f]);
    assert_eq!(run(&unit, "unbox", vec![]), int(9));
}

#[test]
fn constructors_cannot_return_values() {
    let mut b = AstBuilder::new("ctor.em");
    b.at_line(3);
    let one = b.int(1);
    let ret = b.ret(Some(one));
    let body = b.block(vec![ret]);
    let ctor = b.function(FunctionDecl::constructor().body(body));
    let agg = b.aggregate(AggregateDecl::new("Odd").field("x", Type::int()).method(ctor));

    let err = compile_error(b, &[agg]);
    assert_eq!(err.message(), "a constructor cannot return a value");
    assert_eq!(err.line(), Some(3));
}

#[test]
fn destroying_calls_the_destructor_through_values_and_pointers() {
    let mut b = AstBuilder::new("dtor.em");
    let guard = guard(&mut b);
    let zero = b.int(0);
    let hits = b.var("hits", Some(Type::int()), Some(zero));
    let hits_ref = b.ident("hits");
    let address = b.unary(UnaryOp::AddrOf, hits_ref);
    let lit = b.aggregate_lit(Type::named("Guard"), vec![address]);
    let g = b.var("g", Some(Type::named("Guard")), Some(lit));
    let g_ref = b.ident("g");
    let by_value = b.destroy(g_ref);
    let g_ref = b.ident("g");
    let g_address = b.unary(UnaryOp::AddrOf, g_ref);
    let p = b.var("p", Some(Type::named("Guard").pointer_to()), Some(g_address));
    let p_ref = b.ident("p");
    let by_pointer = b.destroy(p_ref);
    let read = b.ident("hits");
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "destroy_twice", Type::int(), &[], vec![hits, g, by_value, p, by_pointer, ret]);

    let unit = compile(b, &[guard, f]);
    assert_eq!(run(&unit, "destroy_twice", vec![]), int(2));
}

#[test]
fn destroying_without_a_destructor_does_nothing() {
    let mut b = AstBuilder::new("dtor.em");
    let plain = b.aggregate(AggregateDecl::new("Plain").field("x", Type::int()));
    let three = b.int(3);
    let lit = b.aggregate_lit(Type::named("Plain"), vec![three]);
    let decl = b.var("p", None, Some(lit));
    let p = b.ident("p");
    let destroy = b.destroy(p);
    let p = b.ident("p");
    let x = b.get(p, "x");
    let ret = b.ret(Some(x));
    let f = c_function(&mut b, "keep", Type::int(), &[], vec![decl, destroy, ret]);

    let unit = compile(b, &[plain, f]);
    assert_eq!(run(&unit, "keep", vec![]), int(3));
}

#[test]
fn destructors_take_no_parameters() {
    let mut b = AstBuilder::new("dtor.em");
    b.at_line(2);
    let body = b.block(vec![]);
    let dtor = b.function(FunctionDecl::destructor().param("n", Type::int()).body(body));
    let agg = b.aggregate(AggregateDecl::new("Bad").field("x", Type::int()).method(dtor));

    let err = compile_error(b, &[agg]);
    assert_eq!(err.message(), "destructor of 'Bad' cannot take parameters");
    assert_eq!(err.line(), Some(2));
}

#[test]
fn deferred_statements_run_on_exit_when_reached() {
    // int record(int* log, bool early) {
    //     defer *log = *log * 10 + 1;
    //     if (early) return 5;
    //     defer *log = *log * 10 + 2;
    //     return 7;
    // }
    let mut b = AstBuilder::new("defer.em");
    let append = |b: &mut AstBuilder, digit: i128| {
        let log = b.ident("log");
        let target = b.unary(UnaryOp::Deref, log);
        let log = b.ident("log");
        let current = b.unary(UnaryOp::Deref, log);
        let ten = b.int(10);
        let shifted = b.binary(BinaryOp::Mul, current, ten);
        let digit = b.int(digit);
        let next = b.binary(BinaryOp::Add, shifted, digit);
        let assign = b.assign(target, next);
        b.defer(assign)
    };
    let first = append(&mut b, 1);
    let early = b.ident("early");
    let five = b.int(5);
    let ret_early = b.ret(Some(five));
    let check = b.if_(early, ret_early, None);
    let second = append(&mut b, 2);
    let seven = b.int(7);
    let ret = b.ret(Some(seven));
    let record = c_function(
        &mut b,
        "record",
        Type::int(),
        &[("log", Type::int().pointer_to()), ("early", Type::bool())],
        vec![first, check, second, ret],
    );

    // int trace(bool early) { int log = 0; int r = record(&log, early); return log * 100 + r; }
    let zero = b.int(0);
    let log = b.var("log", Some(Type::int()), Some(zero));
    let log_ref = b.ident("log");
    let address = b.unary(UnaryOp::AddrOf, log_ref);
    let early = b.ident("early");
    let call = b.call_named("record", vec![address, early]);
    let r = b.var("r", Some(Type::int()), Some(call));
    let log_ref = b.ident("log");
    let hundred = b.int(100);
    let scaled = b.binary(BinaryOp::Mul, log_ref, hundred);
    let r_ref = b.ident("r");
    let total = b.binary(BinaryOp::Add, scaled, r_ref);
    let ret = b.ret(Some(total));
    let trace = c_function(&mut b, "trace", Type::int(), &[("early", Type::bool())], vec![log, r, ret]);

    let unit = compile(b, &[record, trace]);
    assert_eq!(run(&unit, "trace", vec![VmValue::bool(true)]), int(105));
    assert_eq!(run(&unit, "trace", vec![VmValue::bool(false)]), int(1207));
}

#[test]
fn deferred_statements_cannot_return() {
    let mut b = AstBuilder::new("defer.em");
    b.at_line(6);
    let ret = b.ret(None);
    let deferred = b.defer(ret);
    let f = c_function(&mut b, "f", Type::Void, &[], vec![deferred]);

    let err = compile_error(b, &[f]);
    assert_eq!(err.message(), "'return' is not allowed in a deferred statement");
    assert_eq!(err.line(), Some(6));
}

#[test]
fn switch_runs_the_first_matching_case_only() {
    // int pick(int v) { int r = 0; switch (v) { case 1: r = 10; case 2: r = 20; default: r = 99; } return r; }
    let mut b = AstBuilder::new("switch.em");
    let zero = b.int(0);
    let r = b.var("r", Some(Type::int()), Some(zero));
    let set = |b: &mut AstBuilder, value: i128| {
        let target = b.ident("r");
        let value = b.int(value);
        b.assign(target, value)
    };
    let ten = set(&mut b, 10);
    let twenty = set(&mut b, 20);
    let fallback = set(&mut b, 99);
    let one = b.int(1);
    let two = b.int(2);
    let v = b.ident("v");
    let switch = b.switch(v, vec![(one, ten), (two, twenty)], Some(fallback));
    let read = b.ident("r");
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "pick", Type::int(), &[("v", Type::int())], vec![r, switch, ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "pick", vec![int(1)]), int(10));
    assert_eq!(run(&unit, "pick", vec![int(2)]), int(20));
    assert_eq!(run(&unit, "pick", vec![int(3)]), int(99));
}

#[test]
fn switch_needs_a_case() {
    let mut b = AstBuilder::new("switch.em");
    b.at_line(8);
    let v = b.ident("v");
    let switch = b.switch(v, vec![], None);
    let f = c_function(&mut b, "f", Type::Void, &[("v", Type::int())], vec![switch]);

    let err = compile_error(b, &[f]);
    assert_eq!(err.message(), "at least 1 case is required in 'switch'");
    assert_eq!(err.line(), Some(8));
}

#[test]
fn foreach_walks_array_literals_and_honors_continue() {
    // auto xs = [1, 2, 3, 4]; int sum = 0;
    // foreach (x in xs) { if (x == 2) continue; sum += x; }
    let mut b = AstBuilder::new("foreach.em");
    let items = [1, 2, 3, 4].map(|v| b.int(v));
    let lit = b.array_lit(items.to_vec());
    let xs = b.var("xs", None, Some(lit));
    let zero = b.int(0);
    let sum = b.var("sum", Some(Type::int()), Some(zero));
    let x = b.ident("x");
    let two = b.int(2);
    let is_two = b.binary(BinaryOp::Eq, x, two);
    let skip = b.continue_();
    let check = b.if_(is_two, skip, None);
    let target = b.ident("sum");
    let x = b.ident("x");
    let add = b.binary(BinaryOp::AddAssign, target, x);
    let body = b.block(vec![check, add]);
    let data = b.ident("xs");
    let each = b.foreach("x", data, None, body);
    let read = b.ident("sum");
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "total", Type::int(), &[], vec![xs, sum, each, ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "total", vec![]), int(8));
}

#[test]
fn foreach_over_pointers_uses_the_given_length() {
    let mut b = AstBuilder::new("foreach.em");
    let items = [5, 6, 7].map(|v| b.int(v));
    let lit = b.array_lit(items.to_vec());
    let xs = b.var("xs", Some(Type::int().array_of(3)), Some(lit));
    let xs_ref = b.ident("xs");
    let zero = b.int(0);
    let head = b.index(xs_ref, zero);
    let address = b.unary(UnaryOp::AddrOf, head);
    let p = b.var("p", Some(Type::int().pointer_to()), Some(address));
    let zero = b.int(0);
    let sum = b.var("sum", Some(Type::int()), Some(zero));
    let target = b.ident("sum");
    let x = b.ident("x");
    let add = b.binary(BinaryOp::AddAssign, target, x);
    let data = b.ident("p");
    let two = b.int(2);
    let each = b.foreach("x", data, Some(two), add);
    let read = b.ident("sum");
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "prefix", Type::int(), &[], vec![xs, p, sum, each, ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "prefix", vec![]), int(11));
}

#[test]
fn foreach_over_pointers_needs_a_length() {
    let mut b = AstBuilder::new("foreach.em");
    b.at_line(5);
    let data = b.ident("p");
    let body = b.block(vec![]);
    let each = b.foreach("x", data, None, body);
    let f = c_function(&mut b, "f", Type::Void, &[("p", Type::int().pointer_to())], vec![each]);

    let err = compile_error(b, &[f]);
    assert_eq!(err.message(), "'foreach' over 'int*' needs a length");
    assert_eq!(err.line(), Some(5));
}

#[test]
fn empty_array_literals_are_errors() {
    let mut b = AstBuilder::new("arrays.em");
    b.at_line(3);
    let lit = b.array_lit(vec![]);
    let xs = b.var("xs", None, Some(lit));
    let f = c_function(&mut b, "f", Type::Void, &[], vec![xs]);

    let err = compile_error(b, &[f]);
    assert_eq!(err.message(), "an array literal needs at least one element");
    assert_eq!(err.line(), Some(3));
}
