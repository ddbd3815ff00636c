//! Generic instantiation: explicit template arguments are bound in a fresh
//! environment and a copy of the template is checked and emitted.

use em_core::ast::{NodeKind, TemplateParam, TemplateParamKind};
use em_core::types::{ConstValue, Substitution, TemplateArg, Type};
use em_core::{bail, debug, Location, Result};
use itertools::Itertools;

use crate::check::{check_aggregate, check_function};
use crate::comptime::wrap_int;
use crate::context::{CompilationContext, Pending, Phase};
use crate::guard::StateGuard;
use crate::symbols::TemplateSymbol;

impl CompilationContext {
    /// Returns the key of `name<args>`, instantiating it on first use.
    pub(crate) fn instantiate_function(
        &mut self,
        name: &str,
        args: &[TemplateArg],
        location: &Location,
    ) -> Result<String> {
        let Some((qualified, template)) = self.find_template(name, false) else {
            if self.find_overloads(name).is_some() {
                bail!(at location.clone(), "'{}' is not a template", name);
            }
            bail!(at location.clone(), "unknown template function '{}'", name);
        };
        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            resolved.push(self.resolve_template_arg(arg.clone(), location, 0)?);
        }
        let instance_name = format!("{}<{}>", qualified, resolved.iter().join(","));
        if let Some(key) = self.symbols.instances.get(&instance_name) {
            return Ok(key.clone());
        }

        let NodeKind::Function(decl) = self.ast.kind(template.decl).clone() else {
            bail!(at location.clone(), "template '{}' is not a function", qualified);
        };
        let subst = bind_params(&decl.template_params, &resolved, &qualified, location)?;
        debug!("instantiating {}", instance_name);

        let mut guard =
            StateGuard::instantiation(self, subst, template.namespace.clone(), location.clone())?;
        let copy = guard.ast.copy_subtree(template.decl);
        if let NodeKind::Function(func) = guard.ast.kind_mut(copy) {
            func.name = instance_local_name(&instance_name, &template.namespace);
            func.template_params.clear();
        }
        let Some(key) = check_function(&mut guard, copy, None, true)? else {
            bail!(at location.clone(), "instance '{}' was not registered", instance_name);
        };
        guard.symbols.instances.insert(instance_name, key.clone());
        match guard.phase {
            Phase::Emit => crate::emit::emit_function(&mut guard, &key)?,
            Phase::Check => guard.pending.push(Pending::Function(key.clone())),
        }
        Ok(key)
    }

    /// Makes sure `name<args>` exists as an aggregate and returns the
    /// qualified template name the instance type refers to.
    pub(crate) fn ensure_aggregate_instance(
        &mut self,
        name: &str,
        args: Vec<TemplateArg>,
        location: &Location,
    ) -> Result<String> {
        let Some((qualified, template)) = self.find_template(name, true) else {
            bail!(at location.clone(), "unknown template aggregate '{}'", name);
        };
        let canonical = Type::generic(&qualified, args.clone()).canonical();
        if self.symbols.aggregates.contains_key(&canonical)
            || self.symbols.declared_aggregates.contains_key(&canonical)
        {
            return Ok(qualified);
        }
        if args.iter().any(|arg| match arg {
            TemplateArg::Type(ty) => ty.has_template_params(),
            TemplateArg::Value(_) => false,
        }) {
            bail!(at location.clone(), "'{}' has unbound template arguments", canonical);
        }

        let NodeKind::Aggregate(decl) = self.ast.kind(template.decl).clone() else {
            bail!(at location.clone(), "template '{}' is not an aggregate", qualified);
        };
        let subst = bind_params(&decl.template_params, &args, &qualified, location)?;
        debug!("instantiating {}", canonical);

        let mut guard =
            StateGuard::instantiation(self, subst, template.namespace.clone(), location.clone())?;
        let copy = guard.ast.copy_subtree(template.decl);
        if let NodeKind::Aggregate(agg) = guard.ast.kind_mut(copy) {
            agg.template_params.clear();
        }
        // visible by name while its own fields and methods are checked
        guard.symbols.declared_aggregates.insert(
            canonical.clone(),
            TemplateSymbol {
                decl: copy,
                namespace: template.namespace.clone(),
            },
        );
        check_aggregate(&mut guard, copy, Some(canonical.clone()))?;
        match guard.phase {
            Phase::Emit => crate::emit::emit_aggregate(&mut guard, &canonical)?,
            Phase::Check => guard.pending.push(Pending::Aggregate(canonical.clone())),
        }
        Ok(qualified)
    }

    /// The instance `name<args>` names when `name` is an aggregate
    /// template rather than a function template.
    pub(crate) fn constructed_instance(
        &mut self,
        name: &str,
        args: &[TemplateArg],
        location: &Location,
    ) -> Result<Option<String>> {
        if self.find_template(name, false).is_some() || self.find_template(name, true).is_none() {
            return Ok(None);
        }
        let ty = self.resolve_type(&Type::generic(name, args.to_vec()), location)?;
        Ok(ty.aggregate_name())
    }

    fn find_template(&self, name: &str, aggregate: bool) -> Option<(String, TemplateSymbol)> {
        let table = if aggregate {
            &self.symbols.aggregate_templates
        } else {
            &self.symbols.templates
        };
        self.candidates(name)
            .into_iter()
            .find_map(|candidate| table.get(&candidate).cloned().map(|t| (candidate, t)))
    }
}

/// The unqualified part of an instance name; checking re-qualifies it
/// with the template's namespace.
fn instance_local_name(instance: &str, namespace: &[String]) -> String {
    if namespace.is_empty() {
        return instance.to_string();
    }
    let prefix = format!("{}::", namespace.join("::"));
    instance
        .strip_prefix(&prefix)
        .unwrap_or(instance)
        .to_string()
}

fn bind_params(
    params: &[TemplateParam],
    args: &[TemplateArg],
    template: &str,
    location: &Location,
) -> Result<Substitution> {
    if params.len() != args.len() {
        bail!(
            at location.clone(),
            "'{}' expects {} template arguments, got {}",
            template,
            params.len(),
            args.len()
        );
    }
    let mut subst = Substitution::new();
    for (param, arg) in params.iter().zip(args) {
        match (&param.kind, arg) {
            (TemplateParamKind::Type, TemplateArg::Type(ty)) => {
                subst.bind_type(param.name.clone(), ty.clone())
            }
            (TemplateParamKind::Value(kind), TemplateArg::Value(value)) => {
                let Some(v) = value.as_int() else {
                    bail!(at location.clone(), "'{}' of '{}' expects an integer, got '{}'", param.name, template, value);
                };
                subst.bind_value(param.name.clone(), ConstValue::Int(wrap_int(v, *kind), *kind))
            }
            (TemplateParamKind::Type, TemplateArg::Value(value)) => {
                bail!(at location.clone(), "'{}' of '{}' expects a type, got '{}'", param.name, template, value)
            }
            (TemplateParamKind::Value(_), TemplateArg::Type(ty)) => {
                bail!(at location.clone(), "'{}' of '{}' expects a value, got '{}'", param.name, template, ty)
            }
        }
    }
    Ok(subst)
}
