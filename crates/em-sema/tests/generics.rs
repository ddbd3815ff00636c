use em_core::ast::{
    AggregateDecl, AstBuilder, BinaryOp, FunctionDecl, NodeId, TemplateParam,
};
use em_core::types::{ConstValue, ScalarKind, TemplateArg, Type};
use em_core::CompileOptions;
use em_sema::CompilationContext;
use pretty_assertions::assert_eq;

mod support;

use support::{c_function, compile, compile_error, compile_error_with, int, run};

/// `template<T> T biggest(T a, T b) { if (a > b) return a; return b; }`
fn biggest(b: &mut AstBuilder) -> NodeId {
    let a = b.ident("a");
    let other = b.ident("b");
    let greater = b.binary(BinaryOp::Gt, a, other);
    let a = b.ident("a");
    let early = b.ret(Some(a));
    let check = b.if_(greater, early, None);
    let other = b.ident("b");
    let ret = b.ret(Some(other));
    let body = b.block(vec![check, ret]);
    b.function(
        FunctionDecl::new("biggest", Type::named("T"))
            .template(TemplateParam::ty("T"))
            .param("a", Type::named("T"))
            .param("b", Type::named("T"))
            .body(body),
    )
}

fn int_arg() -> Vec<TemplateArg> {
    vec![TemplateArg::Type(Type::int())]
}

/// `return biggest<int>(x, y) + biggest<int>(y, x);`
fn pick(b: &mut AstBuilder) -> NodeId {
    let x = b.ident("x");
    let y = b.ident("y");
    let first = b.call_generic("biggest", int_arg(), vec![x, y]);
    let y = b.ident("y");
    let x = b.ident("x");
    let second = b.call_generic("biggest", int_arg(), vec![y, x]);
    let sum = b.binary(BinaryOp::Add, first, second);
    let ret = b.ret(Some(sum));
    c_function(
        b,
        "pick",
        Type::int(),
        &[("x", Type::int()), ("y", Type::int())],
        vec![ret],
    )
}

#[test]
fn function_instances_are_emitted_once() {
    let mut b = AstBuilder::new("generic.em");
    let template = biggest(&mut b);
    let caller = pick(&mut b);
    let roots = [template, caller];

    let mut ctx = CompilationContext::new(b.finish(), CompileOptions::default());
    ctx.check(&roots).expect("check should succeed");
    ctx.emit(&roots).expect("emit should succeed");

    let instance = ctx
        .symbols()
        .instance("biggest<int>")
        .expect("instance should be registered");
    assert!(instance.is_instance);
    assert_eq!(instance.params, vec![Type::int(), Type::int()]);
    assert_eq!(ctx.program().definition_count(&instance.link_name), 1);
    assert!(ctx.symbols().is_template("biggest"));

    let unit = ctx.into_unit();
    assert_eq!(run(&unit, "pick", vec![int(3), int(9)]), int(18));
}

#[test]
fn template_values_are_substituted() {
    // template<int N> int times(int x) { return x * N; }
    let mut b = AstBuilder::new("values.em");
    let x = b.ident("x");
    let n = b.ident("N");
    let product = b.binary(BinaryOp::Mul, x, n);
    let ret = b.ret(Some(product));
    let body = b.block(vec![ret]);
    let times = b.function(
        FunctionDecl::new("times", Type::int())
            .template(TemplateParam::value("N", ScalarKind::Int))
            .param("x", Type::int())
            .body(body),
    );
    let five = b.int(5);
    let call = b.call_generic("times", vec![TemplateArg::Value(ConstValue::int(4))], vec![five]);
    let ret = b.ret(Some(call));
    let f = c_function(&mut b, "twenty", Type::int(), &[], vec![ret]);

    let unit = compile(b, &[times, f]);
    assert_eq!(run(&unit, "twenty", vec![]), int(20));
}

#[test]
fn generic_aggregates_get_their_own_fields_and_methods() {
    // template<T> struct Box { T item; T get() { return this.item; } }
    let mut b = AstBuilder::new("box.em");
    let this = b.ident("this");
    let item = b.get(this, "item");
    let ret = b.ret(Some(item));
    let body = b.block(vec![ret]);
    let get = b.function(FunctionDecl::new("get", Type::named("T")).body(body));
    let boxed = b.aggregate(
        AggregateDecl::new("Box")
            .template(TemplateParam::ty("T"))
            .field("item", Type::named("T"))
            .method(get),
    );

    let box_int = Type::generic("Box", int_arg());
    let v = b.ident("v");
    let lit = b.aggregate_lit(box_int.clone(), vec![v]);
    let decl = b.var("b", Some(box_int), Some(lit));
    let br = b.ident("b");
    let read = b.method_call(br, "get", vec![]);
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "unbox", Type::int(), &[("v", Type::int())], vec![decl, ret]);
    let roots = [boxed, f];

    let mut ctx = CompilationContext::new(b.finish(), CompileOptions::default());
    ctx.check(&roots).expect("check should succeed");
    ctx.emit(&roots).expect("emit should succeed");

    let symbol = ctx.symbols().aggregate("Box<int>").expect("instance should exist");
    assert!(symbol.is_instance);
    assert_eq!(symbol.field_types(), vec![Type::int()]);
    assert_eq!(ctx.symbols().methods("Box<int>", "get").len(), 1);
    assert!(ctx.symbols().aggregate("Box").is_none());

    let unit = ctx.into_unit();
    assert_eq!(run(&unit, "unbox", vec![int(7)]), int(7));
}

#[test]
fn template_arity_is_checked() {
    let mut b = AstBuilder::new("arity.em");
    let template = biggest(&mut b);
    let one = b.int(1);
    let two = b.int(2);
    b.at_line(4);
    let args = vec![TemplateArg::Type(Type::int()), TemplateArg::Type(Type::int())];
    let call = b.call_generic("biggest", args, vec![one, two]);
    let ret = b.ret(Some(call));
    let f = c_function(&mut b, "bad", Type::int(), &[], vec![ret]);

    let err = compile_error(b, &[template, f]);
    assert_eq!(err.message(), "'biggest' expects 1 template arguments, got 2");
    assert_eq!(err.line(), Some(4));
}

#[test]
fn templates_need_explicit_arguments() {
    let mut b = AstBuilder::new("implicit.em");
    let template = biggest(&mut b);
    let one = b.int(1);
    let two = b.int(2);
    let call = b.call_named("biggest", vec![one, two]);
    let ret = b.ret(Some(call));
    let f = c_function(&mut b, "bad", Type::int(), &[], vec![ret]);

    let err = compile_error(b, &[template, f]);
    assert_eq!(err.message(), "template function 'biggest' needs explicit template arguments");
}

#[test]
fn runaway_instantiation_hits_the_depth_limit() {
    // template<T> struct Wrap { T inner; }
    // template<T> int nest() { return nest<Wrap<T>>(); }
    let mut b = AstBuilder::new("depth.em");
    let wrap = b.aggregate(
        AggregateDecl::new("Wrap")
            .template(TemplateParam::ty("T"))
            .field("inner", Type::named("T")),
    );
    let deeper = Type::generic("Wrap", vec![TemplateArg::Type(Type::named("T"))]);
    let call = b.call_generic("nest", vec![TemplateArg::Type(deeper)], vec![]);
    let ret = b.ret(Some(call));
    let body = b.block(vec![ret]);
    let nest = b.function(
        FunctionDecl::new("nest", Type::int())
            .template(TemplateParam::ty("T"))
            .body(body),
    );
    let call = b.call_generic("nest", int_arg(), vec![]);
    let ret = b.ret(Some(call));
    let start = c_function(&mut b, "start", Type::int(), &[], vec![ret]);

    let options = CompileOptions {
        max_instantiation_depth: 8,
        ..CompileOptions::default()
    };
    let err = compile_error_with(b, &[wrap, nest, start], options);
    assert_eq!(err.message(), "template instantiation depth exceeds 8");
}
