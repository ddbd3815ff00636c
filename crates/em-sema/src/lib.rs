//! Semantic core: checking, compile-time evaluation, generic
//! instantiation, overload resolution, ABI lowering and emission to LIR.

pub mod abi;
mod check;
mod comptime;
mod context;
mod emit;
mod guard;
mod instantiate;
mod lower;
pub mod mangle;
mod resolve;
mod scope;
pub mod state;
pub mod symbols;

pub use abi::ArgClass;
pub use context::{CompilationContext, CompiledUnit, Phase};
pub use state::NodeState;
pub use symbols::{
    AggregateSymbol, AliasEntry, CallConv, FieldSymbol, FunctionSymbol, GlobalSymbol,
    SymbolTables,
};

use em_core::ast::{Ast, NodeId};
use em_core::{CompileOptions, Result};

/// Checks then emits `roots`, returning the lowered program.
pub fn compile_unit(ast: Ast, roots: &[NodeId], options: CompileOptions) -> Result<CompiledUnit> {
    let mut ctx = CompilationContext::new(ast, options);
    ctx.check(roots)?;
    ctx.emit(roots)?;
    Ok(ctx.into_unit())
}
