//! The emit phase: lowers checked declarations to LIR.

mod call;
mod cast;
mod expr;
mod function;
mod init;
mod ops;
mod stmt;

pub(crate) use function::emit_function;

use std::mem;

use em_core::ast::{NodeId, NodeKind};
use em_core::lir::{
    FunctionBuilder, LirConstant, LirGlobal, LirType, LirTypeDefinition, LirValue, Linkage,
    Visibility,
};
use em_core::types::{ConstValue, Type};
use em_core::{bail, debug, Location, Result};

use crate::context::{CompilationContext, Pending};
use crate::scope::LocalVar;

/// An rvalue and its source type.
#[derive(Debug, Clone)]
pub(crate) struct Value {
    pub ty: Type,
    pub value: LirValue,
}

impl Value {
    pub fn new(ty: Type, value: LirValue) -> Self {
        Self { ty, value }
    }

    pub fn void() -> Self {
        Self::new(Type::Void, LirValue::Undef(LirType::Void))
    }
}

/// An addressable location and the type stored there.
#[derive(Debug, Clone)]
pub(crate) struct Place {
    pub ty: Type,
    pub ptr: LirValue,
}

pub(crate) fn emit_roots(ctx: &mut CompilationContext, roots: &[NodeId]) -> Result<()> {
    drain_pending(ctx)?;
    for &root in roots {
        emit_decl(ctx, root)?;
    }
    drain_pending(ctx)?;
    debug!(
        "emitted {} functions, {} globals",
        ctx.program.functions.len(),
        ctx.program.globals.len()
    );
    Ok(())
}

/// Emits instances that were created while checking.
fn drain_pending(ctx: &mut CompilationContext) -> Result<()> {
    while !ctx.pending.is_empty() {
        for item in mem::take(&mut ctx.pending) {
            match item {
                Pending::Function(key) => emit_function(ctx, &key)?,
                Pending::Aggregate(name) => emit_aggregate(ctx, &name)?,
            }
        }
    }
    Ok(())
}

fn emit_decl(ctx: &mut CompilationContext, id: NodeId) -> Result<()> {
    let location = ctx.locate(id);
    match ctx.ast.kind(id).clone() {
        NodeKind::Function(decl) => {
            if decl.is_template() {
                return Ok(());
            }
            let Some(key) = ctx.symbols.decl_functions.get(&id).cloned() else {
                bail!(at location, "function '{}' was not checked", decl.name);
            };
            emit_function(ctx, &key)
        }
        NodeKind::Aggregate(decl) => {
            if decl.is_template() {
                return Ok(());
            }
            let Some(name) = ctx.symbols.decl_aggregates.get(&id).cloned() else {
                bail!(at location, "aggregate '{}' was not checked", decl.name);
            };
            emit_aggregate(ctx, &name)
        }
        NodeKind::Var(_) => emit_global(ctx, id, &location),
        NodeKind::Namespace { name, items } => {
            ctx.namespace.push(name);
            let result = items.iter().try_for_each(|&item| emit_decl(ctx, item));
            ctx.namespace.pop();
            result
        }
        NodeKind::ComptimeIf {
            cond,
            then,
            otherwise,
        } => match ctx.comptime_branch(cond, then, otherwise)? {
            Some(branch) => emit_decl(ctx, branch),
            None => Ok(()),
        },
        NodeKind::Block(items) => items.iter().try_for_each(|&item| emit_decl(ctx, item)),
        NodeKind::Alias(_) | NodeKind::Builtin { .. } => Ok(()),
        _ => bail!(at location, "expected a declaration"),
    }
}

/// Emits an aggregate's type definition followed by its methods.
pub(crate) fn emit_aggregate(ctx: &mut CompilationContext, name: &str) -> Result<()> {
    let Some(symbol) = ctx.symbols.aggregates.get(name).cloned() else {
        bail!("unknown aggregate '{}'", name);
    };
    if !ctx.states.begin_emit(symbol.decl) {
        return Ok(());
    }
    let location = ctx.locate(symbol.decl);
    let ty = ctx.lower_type(&Type::named(name), &location)?;
    ctx.program.type_definitions.push(LirTypeDefinition {
        name: name.to_string(),
        ty,
    });
    for key in &symbol.methods {
        emit_function(ctx, key)?;
    }
    Ok(())
}

fn emit_global(ctx: &mut CompilationContext, id: NodeId, location: &Location) -> Result<()> {
    if !ctx.states.begin_emit(id) {
        return Ok(());
    }
    let Some(symbol) = ctx.symbols.globals.values().find(|g| g.decl == id).cloned() else {
        bail!(at location.clone(), "global was not checked");
    };
    let ty = ctx.lower_type(&symbol.ty, location)?;
    let initializer = match &symbol.value {
        Some(value) => const_initializer(value, &ty, location)?,
        None => LirConstant::ZeroInitializer(ty.clone()),
    };
    ctx.program.add_global(LirGlobal {
        name: symbol.link_name,
        ty,
        initializer: Some(initializer),
        linkage: Linkage::External,
        visibility: Visibility::Default,
        is_constant: symbol.is_const,
        alignment: None,
    });
    Ok(())
}

fn const_initializer(value: &ConstValue, ty: &LirType, location: &Location) -> Result<LirConstant> {
    Ok(match (value, ty) {
        (ConstValue::Bool(b), LirType::I1) => LirConstant::Bool(*b),
        (value, ty) if ty.is_float() => match value.as_float() {
            Some(v) => LirConstant::Float(v, ty.clone()),
            None => bail!(at location.clone(), "cannot initialize '{:?}' with '{}'", ty, value),
        },
        (value, ty) if ty.is_integer() => match value.as_int() {
            Some(v) => LirConstant::Int(v, ty.clone()),
            None => bail!(at location.clone(), "cannot initialize '{:?}' with '{}'", ty, value),
        },
        (ConstValue::Null, ty) if ty.is_pointer() => LirConstant::Null(ty.clone()),
        (value, _) => bail!(at location.clone(), "global cannot be initialized with '{}'", value),
    })
}

impl CompilationContext {
    pub(crate) fn builder(&mut self) -> Result<&mut FunctionBuilder> {
        Ok(&mut self.func()?.builder)
    }

    /// Reports locals left unused when their scope closes.
    pub(crate) fn report_unused(&self, vars: Vec<LocalVar>) {
        if !self.options.warn_unused {
            return;
        }
        for var in vars {
            let location = self.ast.sources().locate(var.span);
            self.warn(
                location,
                format!("unused variable '{}'", var.name),
                "unused-variable",
            );
        }
    }
}
