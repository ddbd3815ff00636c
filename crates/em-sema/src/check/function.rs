use em_core::ast::{FunctionDecl, Modifier, NodeId, NodeKind, CONSTRUCTOR, DESTRUCTOR};
use em_core::types::Type;
use em_core::{bail, trace, Location, Result};

use crate::context::CompilationContext;
use crate::mangle;
use crate::symbols::{CallConv, FunctionSymbol, TemplateSymbol};

/// Registers a function declaration and returns its key. Generic
/// declarations are only recorded as templates and yield `None`.
///
/// `owner` is the aggregate a method or operator belongs to; `instance`
/// marks template instances and inherited copies.
pub(crate) fn check_function(
    ctx: &mut CompilationContext,
    id: NodeId,
    owner: Option<&str>,
    instance: bool,
) -> Result<Option<String>> {
    let location = ctx.locate(id);
    let NodeKind::Function(decl) = ctx.ast.kind(id).clone() else {
        bail!(at location, "expected a function declaration");
    };
    if !ctx.states.begin_check(id) {
        return Ok(ctx.symbols.decl_functions.get(&id).cloned());
    }
    if decl.is_template() {
        register_template(ctx, id, &decl, owner, &location)?;
        return Ok(None);
    }

    let constructor_of = owner
        .filter(|_| decl.operator.is_none() && decl.name == CONSTRUCTOR)
        .map(str::to_string);
    if let Some(owner) = owner {
        if decl.name == DESTRUCTOR && !decl.params.is_empty() {
            bail!(at location, "destructor of '{}' cannot take parameters", owner);
        }
    }
    if let Some(owner) = constructor_of.as_deref().filter(|_| !decl.ret.is_void()) {
        bail!(at location, "constructor of '{}' cannot declare a return type", owner);
    }

    let mut params = Vec::with_capacity(decl.params.len() + 1);
    let mut param_names = Vec::with_capacity(decl.params.len() + 1);
    if let (Some(owner), None, None) = (owner, decl.operator, &constructor_of) {
        params.push(Type::named(owner).pointer_to());
        param_names.push("this".to_string());
    }
    for param in &decl.params {
        let ty = ctx.resolve_type(&param.ty, &location)?;
        if ty.is_void() {
            bail!(at location, "parameter '{}' of '{}' cannot be void", param.name, decl.name);
        }
        params.push(ty);
        param_names.push(param.name.clone());
    }
    let ret = match &constructor_of {
        Some(owner) => Type::named(owner),
        None => ctx.resolve_type(&decl.ret, &location)?,
    };

    let name = match (owner, &constructor_of) {
        (_, Some(owner)) => owner.clone(),
        (Some(owner), None) => format!("{}.{}", owner, decl.name),
        (None, None) => ctx.qualify(&decl.name),
    };
    if decl.operator.is_some() {
        let Some(owner) = owner else {
            bail!(at location, "operator '{}' must be declared inside an aggregate", decl.name);
        };
        if params.is_empty() {
            bail!(at location, "operator '{}' of '{}' needs operands", decl.name, owner);
        }
    }
    let key = mangle::function_key(&name, &params);

    if let Some(existing) = ctx.symbols.functions.get(&key) {
        if instance {
            ctx.symbols.decl_functions.insert(id, key.clone());
            return Ok(Some(key));
        }
        let line = ctx.locate(existing.decl).line;
        bail!(at location, "a function with '{}' name already exists on {} line", name, line);
    }

    // constructors link like the free function they are called as
    let link_owner = owner.filter(|_| constructor_of.is_none());
    let link_name = link_name(&decl, &key, link_owner, ctx.namespace.is_empty());
    trace!("registering function {} as {}", key, link_name);
    let symbol = FunctionSymbol {
        decl: id,
        name: name.clone(),
        key: key.clone(),
        link_name,
        params,
        param_names,
        ret,
        variadic: decl.has_modifier(&Modifier::Vararg),
        conv: calling_convention(&decl),
        owner: link_owner.map(str::to_string),
        constructor_of,
        namespace: ctx.namespace.clone(),
        is_instance: instance,
        is_extern: decl.body.is_none(),
        subst: ctx.subst.clone(),
    };

    if let (Some(owner), Some(tag)) = (owner, decl.operator) {
        let operands = symbol
            .params
            .iter()
            .map(|ty| operand_type(ty, owner))
            .collect::<Vec<_>>();
        let signature = mangle::signature(&operands);
        let Some(aggregate) = ctx.symbols.aggregates.get_mut(owner) else {
            bail!(at location, "unknown aggregate '{}'", owner);
        };
        let table = aggregate.operators.entry(tag).or_default();
        if table.contains_key(&signature) {
            bail!(at location, "operator '{}' of '{}' is already defined for {}", tag, owner, signature);
        }
        table.insert(signature, key.clone());
    } else if let Some(owner) = link_owner {
        ctx.symbols
            .methods
            .entry((owner.to_string(), decl.name.clone()))
            .or_default()
            .push(key.clone());
    }
    ctx.symbols.overloads.entry(name).or_default().push(key.clone());
    ctx.symbols.decl_functions.insert(id, key.clone());
    ctx.symbols.functions.insert(key.clone(), symbol);
    Ok(Some(key))
}

fn register_template(
    ctx: &mut CompilationContext,
    id: NodeId,
    decl: &FunctionDecl,
    owner: Option<&str>,
    location: &Location,
) -> Result<()> {
    if let Some(owner) = owner {
        bail!(at location.clone(), "generic method '{}' of '{}' is not supported", decl.name, owner);
    }
    let name = ctx.qualify(&decl.name);
    if let Some(existing) = ctx.symbols.templates.get(&name) {
        let line = ctx.locate(existing.decl).line;
        bail!(at location.clone(), "a template with '{}' name already exists on {} line", name, line);
    }
    ctx.symbols.templates.insert(
        name,
        TemplateSymbol {
            decl: id,
            namespace: ctx.namespace.clone(),
        },
    );
    Ok(())
}

fn link_name(decl: &FunctionDecl, key: &str, owner: Option<&str>, top_level: bool) -> String {
    if let Some(name) = decl.link_name() {
        return name.to_string();
    }
    let is_main = owner.is_none() && top_level && decl.name == "main";
    if decl.has_modifier(&Modifier::C) || is_main {
        return decl.name.clone();
    }
    match owner {
        Some(_) => mangle::method_link_name(key),
        None => mangle::function_link_name(key),
    }
}

fn calling_convention(decl: &FunctionDecl) -> CallConv {
    decl.modifiers
        .iter()
        .find_map(|modifier| match modifier {
            Modifier::Cdecl64 => Some(CallConv::Cdecl64),
            Modifier::FastCc => Some(CallConv::Fast),
            Modifier::ColdCc => Some(CallConv::Cold),
            _ => None,
        })
        .unwrap_or_default()
}

/// Operator tables are keyed by operand types; a pointer to the owner
/// stands for the owner itself.
fn operand_type(ty: &Type, owner: &str) -> Type {
    match ty.strip() {
        Type::Pointer(inner) if inner.aggregate_name().as_deref() == Some(owner) => {
            inner.as_ref().clone()
        }
        other => other.clone(),
    }
}
