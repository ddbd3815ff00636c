//! Shared fixtures for the em-sema integration tests.
#![allow(dead_code)]

use em_core::ast::{AstBuilder, FunctionDecl, Modifier, NodeId};
use em_core::types::Type;
use em_core::{CompileOptions, Error};
use em_sema::{compile_unit, CompiledUnit};
use em_vm::{Vm, VmValue};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn compile(builder: AstBuilder, roots: &[NodeId]) -> CompiledUnit {
    compile_with(builder, roots, CompileOptions::default())
}

pub fn compile_with(builder: AstBuilder, roots: &[NodeId], options: CompileOptions) -> CompiledUnit {
    init_tracing();
    compile_unit(builder.finish(), roots, options).expect("compilation should succeed")
}

pub fn compile_error(builder: AstBuilder, roots: &[NodeId]) -> Error {
    compile_error_with(builder, roots, CompileOptions::default())
}

pub fn compile_error_with(builder: AstBuilder, roots: &[NodeId], options: CompileOptions) -> Error {
    init_tracing();
    compile_unit(builder.finish(), roots, options).expect_err("compilation should fail")
}

pub fn run(unit: &CompiledUnit, name: &str, args: Vec<VmValue>) -> VmValue {
    let mut vm = Vm::new(&unit.program).expect("vm should load the program");
    vm.run_function(name, args).expect("function should run")
}

pub fn int(value: i128) -> VmValue {
    VmValue::int(value, 32)
}

/// A function keeping its source name as the link name.
pub fn c_function(
    b: &mut AstBuilder,
    name: &str,
    ret: Type,
    params: &[(&str, Type)],
    body: Vec<NodeId>,
) -> NodeId {
    let body = b.block(body);
    let mut decl = FunctionDecl::new(name, ret).modifier(Modifier::C).body(body);
    for (param, ty) in params {
        decl = decl.param(*param, ty.clone());
    }
    b.function(decl)
}
