use std::collections::{BTreeMap, HashSet};

use em_core::ast::{AggregateDecl, Modifier, NodeId, NodeKind, CONSTRUCTOR};
use em_core::{bail, debug, Location, Result};

use super::check_function;
use crate::context::CompilationContext;
use crate::guard::StateGuard;
use crate::symbols::{AggregateSymbol, FieldSymbol, TemplateSymbol};

/// Registers an aggregate with its fields, methods and operators and
/// returns its canonical name. `instance_name` is set when checking a
/// template instance copy.
pub(crate) fn check_aggregate(
    ctx: &mut CompilationContext,
    id: NodeId,
    instance_name: Option<String>,
) -> Result<Option<String>> {
    let location = ctx.locate(id);
    let NodeKind::Aggregate(decl) = ctx.ast.kind(id).clone() else {
        bail!(at location, "expected an aggregate declaration");
    };
    if !ctx.states.begin_check(id) {
        return Ok(ctx.symbols.decl_aggregates.get(&id).cloned());
    }
    if decl.is_template() && instance_name.is_none() {
        let name = ctx.qualify(&decl.name);
        if let Some(existing) = ctx.symbols.aggregate_templates.get(&name) {
            let line = ctx.locate(existing.decl).line;
            bail!(at location, "a template with '{}' name already exists on {} line", name, line);
        }
        ctx.symbols.aggregate_templates.insert(
            name,
            TemplateSymbol {
                decl: id,
                namespace: ctx.namespace.clone(),
            },
        );
        return Ok(None);
    }

    let is_instance = instance_name.is_some();
    let name = instance_name.unwrap_or_else(|| ctx.qualify(&decl.name));
    if let Some(existing) = ctx.symbols.aggregates.get(&name) {
        let line = ctx.locate(existing.decl).line;
        bail!(at location, "an aggregate with '{}' name already exists on {} line", name, line);
    }

    let base = match &decl.base {
        Some(base) => {
            let base_ty = ctx.resolve_type(base, &location)?;
            let Some(base_name) = base_ty.aggregate_name() else {
                bail!(at location, "'{}' cannot extend non-aggregate '{}'", name, base_ty);
            };
            if base_name == name {
                bail!(at location, "'{}' cannot extend itself", name);
            }
            ctx.ensure_aggregate_checked(&base_name, &location)?;
            Some(base_name)
        }
        None => None,
    };

    let fields = collect_fields(ctx, &name, &decl, base.as_deref(), &location)?;
    for field in &fields {
        ctx.symbols
            .fields
            .insert((name.clone(), field.name.clone()), field.clone());
    }
    ctx.symbols.aggregates.insert(
        name.clone(),
        AggregateSymbol {
            decl: id,
            name: name.clone(),
            fields,
            base: base.clone(),
            operators: BTreeMap::new(),
            methods: Vec::new(),
            is_instance,
            namespace: ctx.namespace.clone(),
            subst: ctx.subst.clone(),
        },
    );
    ctx.symbols.decl_aggregates.insert(id, name.clone());

    let mut methods = Vec::new();
    for &method in &decl.methods {
        if let Some(key) = check_function(ctx, method, Some(&name), is_instance)? {
            methods.push(key);
        }
    }
    if let Some(base) = &base {
        methods.extend(inherit_methods(ctx, &name, base, &decl)?);
    }
    if let Some(symbol) = ctx.symbols.aggregates.get_mut(&name) {
        symbol.methods = methods;
    }
    debug!("checked aggregate {}", name);
    Ok(Some(name))
}

/// Inherited fields come first, in the base's order; a field redeclared
/// by the extending aggregate replaces the inherited one.
fn collect_fields(
    ctx: &mut CompilationContext,
    name: &str,
    decl: &AggregateDecl,
    base: Option<&str>,
    location: &Location,
) -> Result<Vec<FieldSymbol>> {
    let own: HashSet<&str> = decl.fields.iter().map(|f| f.name.as_str()).collect();
    let mut fields = Vec::with_capacity(decl.fields.len());
    if let Some(base) = base.and_then(|base| ctx.symbols.aggregates.get(base)) {
        fields.extend(
            base.fields
                .iter()
                .filter(|field| !own.contains(field.name.as_str()))
                .cloned(),
        );
    }
    let mut seen = HashSet::new();
    for field in &decl.fields {
        if !seen.insert(field.name.as_str()) {
            bail!(at location.clone(), "field '{}' of '{}' is declared twice", field.name, name);
        }
        let ty = ctx.resolve_type(&field.ty, location)?;
        if ty.is_void() {
            bail!(at location.clone(), "field '{}' of '{}' cannot be void", field.name, name);
        }
        if ty.aggregate_name().as_deref() == Some(name) {
            bail!(at location.clone(), "aggregate '{}' contains itself by value", name);
        }
        fields.push(FieldSymbol {
            name: field.name.clone(),
            ty,
            index: 0,
            default: field.default,
        });
    }
    for (index, field) in fields.iter_mut().enumerate() {
        field.index = index as u32;
    }
    Ok(fields)
}

/// Copies the base's methods that `name` does not define itself and that
/// are not marked `nocopy`, re-owned by `name`.
fn inherit_methods(
    ctx: &mut CompilationContext,
    name: &str,
    base: &str,
    decl: &AggregateDecl,
) -> Result<Vec<String>> {
    let own: HashSet<String> = decl
        .methods
        .iter()
        .filter_map(|&method| match ctx.ast.kind(method) {
            NodeKind::Function(func) => Some(func.name.clone()),
            _ => None,
        })
        .collect();
    let Some(base_symbol) = ctx.symbols.aggregates.get(base) else {
        return Ok(Vec::new());
    };
    let base_subst = base_symbol.subst.clone();
    let base_namespace = base_symbol.namespace.clone();
    let inherited = base_symbol
        .methods
        .iter()
        .filter_map(|key| ctx.symbols.functions.get(key))
        .map(|symbol| symbol.decl)
        .filter(|&method| match ctx.ast.kind(method) {
            NodeKind::Function(func) => {
                func.operator.is_none()
                    && func.name != CONSTRUCTOR
                    && !func.has_modifier(&Modifier::NoCopy)
                    && !own.contains(&func.name)
            }
            _ => false,
        })
        .collect::<Vec<_>>();

    let mut keys = Vec::with_capacity(inherited.len());
    for method in inherited {
        let copy = ctx.ast.copy_subtree(method);
        let mut guard = StateGuard::scoped(ctx, base_subst.clone(), base_namespace.clone());
        if let Some(key) = check_function(&mut guard, copy, Some(name), true)? {
            keys.push(key);
        }
    }
    Ok(keys)
}
