use em_core::types::{ArrayLen, ConstValue, FunctionType, TemplateArg, Type};
use em_core::{bail, Location, Result};

use crate::guard::StateGuard;
use crate::symbols::AliasEntry;
use crate::CompilationContext;

const MAX_TYPE_DEPTH: usize = 64;

impl CompilationContext {
    /// Resolves a written type under the active substitution: aliases are
    /// looked up, names qualified, array lengths folded and generic
    /// aggregates instantiated.
    pub(crate) fn resolve_type(&mut self, ty: &Type, location: &Location) -> Result<Type> {
        let mut ty = ty.clone();
        ty.substitute(&self.subst);
        self.resolve_in(ty, location, 0)
    }

    fn resolve_in(&mut self, ty: Type, location: &Location, depth: usize) -> Result<Type> {
        if depth > MAX_TYPE_DEPTH {
            bail!(at location.clone(), "type is nested too deeply");
        }
        let resolved = match ty {
            Type::Void | Type::Scalar(_) => ty,
            Type::Pointer(inner) => self.resolve_in(*inner, location, depth + 1)?.pointer_to(),
            Type::Const(inner) => self.resolve_in(*inner, location, depth + 1)?.constant(),
            Type::Array(inner, len) => {
                let inner = self.resolve_in(*inner, location, depth + 1)?;
                let len = self.resolve_array_len(len, location)?;
                Type::Array(Box::new(inner), ArrayLen::Fixed(len))
            }
            Type::Function(func) => {
                let ret = self.resolve_in(*func.ret, location, depth + 1)?;
                let mut params = Vec::with_capacity(func.params.len());
                for param in func.params {
                    params.push(self.resolve_in(param, location, depth + 1)?);
                }
                Type::Function(FunctionType {
                    ret: Box::new(ret),
                    params,
                    variadic: func.variadic,
                })
            }
            Type::TemplateParam(name) => {
                bail!(at location.clone(), "template parameter '{}' is not bound", name)
            }
            Type::Alias { name, target } => Type::Alias {
                name,
                target: Box::new(self.resolve_in(*target, location, depth + 1)?),
            },
            Type::Aggregate { name, args } if args.is_empty() => {
                self.resolve_named(&name, location)?
            }
            Type::Aggregate { name, args } => {
                let mut resolved = Vec::with_capacity(args.len());
                for arg in args {
                    resolved.push(self.resolve_template_arg(arg, location, depth + 1)?);
                }
                let template = self.ensure_aggregate_instance(&name, resolved.clone(), location)?;
                Type::Aggregate {
                    name: template,
                    args: resolved,
                }
            }
        };
        Ok(resolved)
    }

    pub(crate) fn resolve_template_arg(
        &mut self,
        arg: TemplateArg,
        location: &Location,
        depth: usize,
    ) -> Result<TemplateArg> {
        match arg {
            TemplateArg::Value(value) => Ok(TemplateArg::Value(value)),
            TemplateArg::Type(Type::Aggregate { name, args }) if args.is_empty() => {
                // a bare name may be a value alias passed to a non-type parameter
                if let Some(value) = self.lookup_value_alias(&name) {
                    return Ok(TemplateArg::Value(value));
                }
                let ty = self.resolve_named(&name, location)?;
                Ok(TemplateArg::Type(ty))
            }
            TemplateArg::Type(ty) => Ok(TemplateArg::Type(self.resolve_in(ty, location, depth)?)),
        }
    }

    fn resolve_array_len(&mut self, len: ArrayLen, location: &Location) -> Result<u64> {
        let value = match len {
            ArrayLen::Fixed(len) => return Ok(len),
            ArrayLen::Param(name) => match self.subst.get_value(&name) {
                Some(value) => value.clone(),
                None => bail!(at location.clone(), "template value '{}' is not bound", name),
            },
            ArrayLen::Expr(node) => self.fold_required(node, "an array length")?,
        };
        match value.as_int() {
            Some(len) if len >= 0 => Ok(len as u64),
            _ => bail!(at location.clone(), "invalid array length '{}'", value),
        }
    }

    fn resolve_named(&mut self, name: &str, location: &Location) -> Result<Type> {
        if let Some(ty) = self.subst.get_type(name) {
            return Ok(ty.clone());
        }
        if let Some(AliasEntry::Type(target)) = self.func.as_ref().and_then(|f| f.scope.alias(name)) {
            return Ok(Type::Alias {
                name: name.to_string(),
                target: Box::new(target.clone()),
            });
        }
        for candidate in self.candidates(name) {
            if let Some(AliasEntry::Type(target)) = self.symbols.aliases.get(&candidate) {
                return Ok(Type::Alias {
                    name: candidate,
                    target: Box::new(target.clone()),
                });
            }
            if self.symbols.aggregates.contains_key(&candidate)
                || self.symbols.declared_aggregates.contains_key(&candidate)
            {
                return Ok(Type::Aggregate {
                    name: candidate,
                    args: Vec::new(),
                });
            }
            if self.symbols.aggregate_templates.contains_key(&candidate) {
                bail!(at location.clone(), "template '{}' requires template arguments", name);
            }
        }
        bail!(at location.clone(), "unknown type '{}'", name)
    }

    fn lookup_value_alias(&self, name: &str) -> Option<ConstValue> {
        if let Some(value) = self.subst.get_value(name) {
            return Some(value.clone());
        }
        if let Some(AliasEntry::Value(value)) = self.func.as_ref().and_then(|f| f.scope.alias(name)) {
            return Some(value.clone());
        }
        self.candidates(name)
            .into_iter()
            .find_map(|candidate| match self.symbols.aliases.get(&candidate) {
                Some(AliasEntry::Value(value)) => Some(value.clone()),
                _ => None,
            })
    }

    /// Checks every aggregate `ty` holds by value, so its layout is known.
    pub(crate) fn complete_type(&mut self, ty: &Type, location: &Location) -> Result<()> {
        match ty.strip() {
            Type::Array(inner, _) => self.complete_type(inner, location),
            agg @ Type::Aggregate { .. } => {
                let name = agg.canonical();
                self.ensure_aggregate_checked(&name, location)?;
                let fields = self
                    .symbols
                    .aggregates
                    .get(&name)
                    .map(|symbol| symbol.field_types())
                    .unwrap_or_default();
                for field in fields {
                    self.complete_type(&field, location)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Checks a non-generic aggregate found by the declaration pass if it
    /// has not been checked yet.
    pub(crate) fn ensure_aggregate_checked(&mut self, name: &str, location: &Location) -> Result<()> {
        if self.symbols.aggregates.contains_key(name) {
            return Ok(());
        }
        let Some(declared) = self.symbols.declared_aggregates.get(name).cloned() else {
            bail!(at location.clone(), "unknown aggregate '{}'", name);
        };
        if self.states.get(declared.decl) != crate::NodeState::Unchecked {
            bail!(at location.clone(), "aggregate '{}' depends on itself", name);
        }
        let mut guard = StateGuard::scoped(self, Default::default(), declared.namespace);
        super::check_aggregate(&mut guard, declared.decl, None).map(drop)
    }
}
