//! The check phase: registers declarations and resolves their types.

mod aggregate;
mod function;
mod types;

pub(crate) use aggregate::check_aggregate;
pub(crate) use function::check_function;

use em_core::ast::{AliasDecl, AliasTarget, NodeId, NodeKind, VariableDecl};
use em_core::{bail, debug, Result};

use crate::context::{qualify_in, CompilationContext};
use crate::mangle;
use crate::symbols::{AliasEntry, GlobalSymbol, TemplateSymbol};

pub(crate) fn check_roots(ctx: &mut CompilationContext, roots: &[NodeId]) -> Result<()> {
    let mut namespace = Vec::new();
    for &root in roots {
        collect_aggregates(ctx, root, &mut namespace);
    }
    for &root in roots {
        check_node(ctx, root)?;
    }
    debug!(
        "checked {} roots: {} functions, {} aggregates",
        roots.len(),
        ctx.symbols.functions.len(),
        ctx.symbols.aggregates.len()
    );
    Ok(())
}

/// Records non-generic aggregate names up front so bases and field types
/// may refer to aggregates declared later.
fn collect_aggregates(ctx: &mut CompilationContext, id: NodeId, namespace: &mut Vec<String>) {
    match ctx.ast.kind(id) {
        NodeKind::Aggregate(decl) if !decl.is_template() => {
            let name = qualify_in(namespace, &decl.name);
            ctx.symbols
                .declared_aggregates
                .entry(name)
                .or_insert_with(|| TemplateSymbol {
                    decl: id,
                    namespace: namespace.clone(),
                });
        }
        NodeKind::Namespace { name, items } => {
            let items = items.clone();
            namespace.push(name.clone());
            for item in items {
                collect_aggregates(ctx, item, namespace);
            }
            namespace.pop();
        }
        _ => {}
    }
}

pub(crate) fn check_node(ctx: &mut CompilationContext, id: NodeId) -> Result<()> {
    let location = ctx.locate(id);
    match ctx.ast.kind(id).clone() {
        NodeKind::Function(_) => check_function(ctx, id, None, false).map(drop),
        NodeKind::Aggregate(_) => check_aggregate(ctx, id, None).map(drop),
        NodeKind::Var(decl) => check_global(ctx, id, decl),
        NodeKind::Alias(decl) => check_alias(ctx, id, decl),
        NodeKind::Namespace { name, items } => {
            if !ctx.states.begin_check(id) {
                return Ok(());
            }
            if ctx.namespace.len() >= ctx.options.max_nesting_depth {
                bail!(at location, "namespace '{}' is nested too deeply", name);
            }
            ctx.namespace.push(name);
            let result = items.iter().try_for_each(|&item| check_node(ctx, item));
            ctx.namespace.pop();
            result
        }
        NodeKind::ComptimeIf {
            cond,
            then,
            otherwise,
        } => {
            if !ctx.states.begin_check(id) {
                return Ok(());
            }
            match ctx.comptime_branch(cond, then, otherwise)? {
                Some(branch) => check_node(ctx, branch),
                None => Ok(()),
            }
        }
        NodeKind::Block(items) => items.iter().try_for_each(|&item| check_node(ctx, item)),
        NodeKind::Builtin { name, args } => {
            if !ctx.states.begin_check(id) {
                return Ok(());
            }
            ctx.eval_builtin(id, &name, &args).map(drop)
        }
        _ => bail!(at location, "expected a declaration"),
    }
}

fn check_global(ctx: &mut CompilationContext, id: NodeId, decl: VariableDecl) -> Result<()> {
    if !ctx.states.begin_check(id) {
        return Ok(());
    }
    let location = ctx.locate(id);
    let name = ctx.qualify(&decl.name);
    if let Some(existing) = ctx.symbols.globals.get(&name) {
        let line = ctx.locate(existing.decl).line;
        bail!(at location, "a variable with '{}' name already exists on {} line", name, line);
    }
    let value = match decl.init {
        Some(init) => Some(ctx.fold_required(init, "a global initializer")?),
        None => None,
    };
    let ty = match (&decl.ty, &value) {
        (Some(ty), _) => ctx.resolve_type(ty, &location)?,
        (None, Some(value)) => value.ty(),
        (None, None) => bail!(at location, "cannot infer the type of '{}'", decl.name),
    };
    if ty.is_void() {
        bail!(at location, "variable '{}' cannot have type void", decl.name);
    }
    if decl.is_const && value.is_none() {
        bail!(at location, "constant '{}' needs an initializer", decl.name);
    }
    let symbol = GlobalSymbol {
        decl: id,
        link_name: mangle::global_link_name(&name),
        name: name.clone(),
        ty,
        is_const: decl.is_const,
        value,
    };
    ctx.symbols.globals.insert(name, symbol);
    Ok(())
}

fn check_alias(ctx: &mut CompilationContext, id: NodeId, decl: AliasDecl) -> Result<()> {
    if !ctx.states.begin_check(id) {
        return Ok(());
    }
    let location = ctx.locate(id);
    let name = ctx.qualify(&decl.name);
    if ctx.symbols.aliases.contains_key(&name) {
        bail!(at location, "an alias named '{}' already exists", name);
    }
    let entry = ctx.alias_entry(&decl.target, &location)?;
    ctx.symbols.aliases.insert(name, entry);
    Ok(())
}

impl CompilationContext {
    pub(crate) fn alias_entry(
        &mut self,
        target: &AliasTarget,
        location: &em_core::Location,
    ) -> Result<AliasEntry> {
        Ok(match target {
            AliasTarget::Type(ty) => AliasEntry::Type(self.resolve_type(ty, location)?),
            AliasTarget::Value(node) => AliasEntry::Value(self.fold_required(*node, "an alias")?),
        })
    }
}
