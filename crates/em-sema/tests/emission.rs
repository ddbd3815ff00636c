use em_core::ast::{AggregateDecl, AstBuilder, BinaryOp, FunctionDecl, UnaryOp};
use em_core::lir::{LirInstructionKind, LirType};
use em_core::types::{ScalarKind, Type};
use em_core::CompileOptions;
use em_vm::{Vm, VmValue};
use pretty_assertions::assert_eq;

mod support;

use support::{c_function, compile, compile_with, int, run};

#[test]
fn runs_integer_arithmetic() {
    let mut b = AstBuilder::new("arith.em");
    let x = b.ident("x");
    let y = b.ident("y");
    let sum = b.binary(BinaryOp::Add, x, y);
    let two = b.int(2);
    let scaled = b.binary(BinaryOp::Mul, sum, two);
    let ret = b.ret(Some(scaled));
    let f = c_function(
        &mut b,
        "scaled_sum",
        Type::int(),
        &[("x", Type::int()), ("y", Type::int())],
        vec![ret],
    );

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "scaled_sum", vec![int(4), int(17)]), int(42));
}

#[test]
fn void_main_returns_zero() {
    let mut b = AstBuilder::new("main.em");
    let one = b.int(1);
    let decl = b.var("x", Some(Type::int()), Some(one));
    let x = b.ident("x");
    let x_again = b.ident("x");
    let one_more = b.int(1);
    let bumped = b.binary(BinaryOp::Add, x_again, one_more);
    let assign = b.assign(x, bumped);
    let body = b.block(vec![decl, assign]);
    let main = b.function(FunctionDecl::new("main", Type::Void).body(body));

    let unit = compile(b, &[main]);
    let function = unit.program.function("main").expect("main should be emitted");
    assert_eq!(function.signature.return_type, LirType::I32);
    assert_eq!(run(&unit, "main", vec![]), int(0));
    assert!(unit.diagnostics.is_empty());
}

#[test]
fn for_loop_with_continue() {
    // int total = 0; for (int i = 1; i <= n; i += 1) { if (i == 3) continue; total += i; }
    let mut b = AstBuilder::new("loops.em");
    let zero = b.int(0);
    let total = b.var("total", Some(Type::int()), Some(zero));
    let one = b.int(1);
    let init = b.var("i", Some(Type::int()), Some(one));
    let i = b.ident("i");
    let n = b.ident("n");
    let cond = b.binary(BinaryOp::Le, i, n);
    let i = b.ident("i");
    let step_by = b.int(1);
    let step = b.binary(BinaryOp::AddAssign, i, step_by);
    let i = b.ident("i");
    let three = b.int(3);
    let is_three = b.binary(BinaryOp::Eq, i, three);
    let skip = b.continue_();
    let guard = b.if_(is_three, skip, None);
    let total_ref = b.ident("total");
    let i = b.ident("i");
    let accumulate = b.binary(BinaryOp::AddAssign, total_ref, i);
    let body = b.block(vec![guard, accumulate]);
    let lp = b.for_(Some(init), Some(cond), Some(step), body);
    let result = b.ident("total");
    let ret = b.ret(Some(result));
    let f = c_function(&mut b, "sum_skipping_three", Type::int(), &[("n", Type::int())], vec![total, lp, ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "sum_skipping_three", vec![int(5)]), int(12));
    assert_eq!(run(&unit, "sum_skipping_three", vec![int(0)]), int(0));
}

#[test]
fn while_loop_with_break() {
    // int i = 0; while (true) { if (i * i > limit) break; i += 1; } return i;
    let mut b = AstBuilder::new("loops.em");
    let zero = b.int(0);
    let decl = b.var("i", Some(Type::int()), Some(zero));
    let forever = b.bool(true);
    let i = b.ident("i");
    let i2 = b.ident("i");
    let square = b.binary(BinaryOp::Mul, i, i2);
    let limit = b.ident("limit");
    let over = b.binary(BinaryOp::Gt, square, limit);
    let stop = b.break_();
    let check = b.if_(over, stop, None);
    let i = b.ident("i");
    let one = b.int(1);
    let inc = b.binary(BinaryOp::AddAssign, i, one);
    let body = b.block(vec![check, inc]);
    let lp = b.while_(forever, body);
    let i = b.ident("i");
    let ret = b.ret(Some(i));
    let f = c_function(&mut b, "first_square_over", Type::int(), &[("limit", Type::int())], vec![decl, lp, ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "first_square_over", vec![int(50)]), int(8));
}

#[test]
fn arrays_and_pointer_indexing() {
    // int[4] values; ... values[i] = i * 10; int* p = &values[1]; return *p + p[2];
    let mut b = AstBuilder::new("arrays.em");
    let values = b.var("values", Some(Type::int().array_of(4)), None);
    let zero = b.int(0);
    let counter = b.var("i", Some(Type::int()), Some(zero));
    let i = b.ident("i");
    let four = b.int(4);
    let cond = b.binary(BinaryOp::Lt, i, four);
    let arr = b.ident("values");
    let i = b.ident("i");
    let slot = b.index(arr, i);
    let i = b.ident("i");
    let ten = b.int(10);
    let scaled = b.binary(BinaryOp::Mul, i, ten);
    let store = b.assign(slot, scaled);
    let i = b.ident("i");
    let one = b.int(1);
    let inc = b.binary(BinaryOp::AddAssign, i, one);
    let body = b.block(vec![store, inc]);
    let fill = b.while_(cond, body);

    let arr = b.ident("values");
    let one = b.int(1);
    let second = b.index(arr, one);
    let address = b.unary(UnaryOp::AddrOf, second);
    let p = b.var("p", Some(Type::int().pointer_to()), Some(address));
    let p_ref = b.ident("p");
    let deref = b.unary(UnaryOp::Deref, p_ref);
    let p_ref = b.ident("p");
    let two = b.int(2);
    let offset = b.index(p_ref, two);
    let sum = b.binary(BinaryOp::Add, deref, offset);
    let ret = b.ret(Some(sum));
    let f = c_function(&mut b, "sum_array", Type::int(), &[], vec![values, counter, fill, p, ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "sum_array", vec![]), int(40));
}

#[test]
fn globals_keep_their_value_across_statements() {
    let mut b = AstBuilder::new("globals.em");
    let five = b.int(5);
    let counter = b.var("counter", Some(Type::int()), Some(five));
    let target = b.ident("counter");
    let two = b.int(2);
    let bump = b.binary(BinaryOp::AddAssign, target, two);
    let read = b.ident("counter");
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "bump", Type::int(), &[], vec![bump, ret]);

    let unit = compile(b, &[counter, f]);
    assert_eq!(run(&unit, "bump", vec![]), int(7));
}

#[test]
fn string_literals_become_private_constants() {
    let mut b = AstBuilder::new("strings.em");
    let hi = b.str("hi");
    let ret = b.ret(Some(hi));
    let char_ptr = Type::Scalar(ScalarKind::Char).pointer_to();
    let f = c_function(&mut b, "greeting", char_ptr, &[], vec![ret]);

    let unit = compile(b, &[f]);
    let mut vm = Vm::new(&unit.program).expect("vm should load the program");
    let VmValue::Ptr(addr) = vm.run_function("greeting", vec![]).expect("function should run") else {
        panic!("expected a pointer");
    };
    let first = vm.load(addr, &LirType::I8).expect("load should succeed");
    let last = vm.load(addr + 2, &LirType::I8).expect("load should succeed");
    assert_eq!(first.as_i128(), Some(b'h' as i128));
    assert_eq!(last.as_i128(), Some(0));
}

#[test]
fn casts_between_integers_and_floats() {
    let mut b = AstBuilder::new("casts.em");
    let x = b.ident("x");
    let widened = b.cast(Type::Scalar(ScalarKind::Double), x);
    let two = b.float(2.0);
    let half = b.binary(BinaryOp::Div, widened, two);
    let ret = b.ret(Some(half));
    let f = c_function(&mut b, "half", Type::Scalar(ScalarKind::Double), &[("x", Type::int())], vec![ret]);

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "half", vec![int(5)]), VmValue::Float(2.5));
}

#[test]
fn unsigned_operands_use_unsigned_division() {
    let mut b = AstBuilder::new("unsigned.em");
    let x = b.ident("x");
    let four = b.int(4);
    let quotient = b.binary(BinaryOp::Div, x, four);
    let ret = b.ret(Some(quotient));
    let uint = Type::Scalar(ScalarKind::Uint);
    let f = c_function(&mut b, "quarter", uint.clone(), &[("x", uint)], vec![ret]);

    let unit = compile(b, &[f]);
    let result = run(&unit, "quarter", vec![int(-4)]);
    assert_eq!(result.as_u128(), Some(0x3fff_ffff));
}

#[test]
fn calls_through_function_pointers() {
    let mut b = AstBuilder::new("fnptr.em");
    let x = b.ident("x");
    let two = b.int(2);
    let doubled = b.binary(BinaryOp::Mul, x, two);
    let ret = b.ret(Some(doubled));
    let twice = c_function(&mut b, "twice", Type::int(), &[("x", Type::int())], vec![ret]);

    let target = b.ident("twice");
    let fn_ty = Type::function(Type::int(), vec![Type::int()], false);
    let f = b.var("f", Some(fn_ty), Some(target));
    let callee = b.ident("f");
    let x = b.ident("x");
    let call = b.call(callee, vec![x]);
    let ret = b.ret(Some(call));
    let apply = c_function(&mut b, "apply", Type::int(), &[("x", Type::int())], vec![f, ret]);

    let unit = compile(b, &[twice, apply]);
    assert_eq!(run(&unit, "apply", vec![int(21)]), int(42));
}

#[test]
fn methods_update_fields_through_this() {
    let mut b = AstBuilder::new("methods.em");
    let this = b.ident("this");
    let field = b.get(this, "value");
    let n = b.ident("n");
    let add_body = b.binary(BinaryOp::AddAssign, field, n);
    let add_body = b.block(vec![add_body]);
    let add = b.function(
        FunctionDecl::new("add", Type::Void)
            .param("n", Type::int())
            .body(add_body),
    );
    let this = b.ident("this");
    let field = b.get(this, "value");
    let ret = b.ret(Some(field));
    let get_body = b.block(vec![ret]);
    let get = b.function(FunctionDecl::new("get", Type::int()).body(get_body));
    let counter = b.aggregate(
        AggregateDecl::new("Counter")
            .field("value", Type::int())
            .method(add)
            .method(get),
    );

    let decl = b.var("c", Some(Type::named("Counter")), None);
    let c = b.ident("c");
    let three = b.int(3);
    let first = b.method_call(c, "add", vec![three]);
    let c = b.ident("c");
    let four = b.int(4);
    let second = b.method_call(c, "add", vec![four]);
    let c = b.ident("c");
    let read = b.method_call(c, "get", vec![]);
    let ret = b.ret(Some(read));
    let f = c_function(&mut b, "use_counter", Type::int(), &[], vec![decl, first, second, ret]);

    let unit = compile(b, &[counter, f]);
    assert_eq!(run(&unit, "use_counter", vec![]), int(7));
}

#[test]
fn short_circuit_skips_the_right_operand() {
    // p != null && *p > 0
    let mut b = AstBuilder::new("logic.em");
    let p = b.ident("p");
    let null = b.null();
    let present = b.binary(BinaryOp::Ne, p, null);
    let p = b.ident("p");
    let value = b.unary(UnaryOp::Deref, p);
    let zero = b.int(0);
    let positive = b.binary(BinaryOp::Gt, value, zero);
    let both = b.binary(BinaryOp::And, present, positive);
    let ret = b.ret(Some(both));
    let f = c_function(
        &mut b,
        "positive_at",
        Type::bool(),
        &[("p", Type::int().pointer_to())],
        vec![ret],
    );

    let unit = compile(b, &[f]);
    assert_eq!(run(&unit, "positive_at", vec![VmValue::Ptr(0)]), VmValue::bool(false));
}

#[test]
fn cent_constants_keep_all_128_bits() {
    let wide: i128 = (1 << 100) + 5;
    let cent = Type::Scalar(ScalarKind::Cent);
    let mut b = AstBuilder::new("wide.em");
    let init = b.int(wide);
    let global = b.var("big", Some(cent.clone()), Some(init));
    let read = b.ident("big");
    let ret = b.ret(Some(read));
    let from_global = c_function(&mut b, "from_global", cent.clone(), &[], vec![ret]);
    let literal = b.int(wide);
    let ret = b.ret(Some(literal));
    let from_literal = c_function(&mut b, "from_literal", cent, &[], vec![ret]);

    let unit = compile(b, &[global, from_global, from_literal]);
    assert_eq!(run(&unit, "from_global", vec![]).as_i128(), Some(wide));
    assert_eq!(run(&unit, "from_literal", vec![]).as_i128(), Some(wide));
}

#[test]
fn pointer_tests_use_the_target_address_width() {
    // bool same_or_set(int* p, int* q) { return p == q || p; }
    let mut b = AstBuilder::new("narrow.em");
    let p = b.ident("p");
    let q = b.ident("q");
    let same = b.binary(BinaryOp::Eq, p, q);
    let p = b.ident("p");
    let either = b.binary(BinaryOp::Or, same, p);
    let ret = b.ret(Some(either));
    let int_ptr = Type::int().pointer_to();
    let f = c_function(
        &mut b,
        "same_or_set",
        Type::bool(),
        &[("p", int_ptr.clone()), ("q", int_ptr)],
        vec![ret],
    );

    let options = CompileOptions {
        pointer_bits: 32,
        ..CompileOptions::default()
    };
    let unit = compile_with(b, &[f], options);
    let function = unit.program.function("same_or_set").expect("function should be emitted");
    let address_types: Vec<_> = function
        .basic_blocks
        .iter()
        .flat_map(|block| &block.instructions)
        .filter(|inst| matches!(inst.kind, LirInstructionKind::PtrToInt(_)))
        .map(|inst| inst.type_hint.clone())
        .collect();
    assert_eq!(address_types.len(), 3);
    assert!(address_types.iter().all(|ty| *ty == Some(LirType::I32)));
}
