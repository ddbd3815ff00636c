//! Name resolution for calls: free-function overloads, members and
//! operator tables.

use em_core::ast::OperatorTag;
use em_core::types::Type;
use em_core::{bail, Location, Result};
use itertools::Itertools;

use crate::context::CompilationContext;
use crate::mangle;
use crate::symbols::FieldSymbol;

/// What `base.name` refers to.
#[derive(Debug, Clone)]
pub(crate) enum Member {
    Methods(Vec<String>),
    Field(FieldSymbol),
}

/// An operator table hit. `negate` is set when `!=`, `>=` or `<=` is
/// answered by negating `==`, `<` or `>`.
#[derive(Debug, Clone)]
pub(crate) struct OperatorTarget {
    pub key: String,
    pub negate: bool,
}

impl CompilationContext {
    /// Overload keys of `name`, searched from the innermost namespace out.
    pub(crate) fn find_overloads(&self, name: &str) -> Option<Vec<String>> {
        self.candidates(name).into_iter().find_map(|candidate| {
            self.symbols
                .overloads
                .get(&candidate)
                .filter(|keys| !keys.is_empty())
                .cloned()
        })
    }

    /// Picks the overload of `name` for `args`. A single candidate is
    /// taken as is and its arguments adapted by the caller; several require
    /// an exact signature match.
    pub(crate) fn resolve_function(
        &self,
        name: &str,
        args: &[Type],
        location: &Location,
    ) -> Result<String> {
        let Some(keys) = self.find_overloads(name) else {
            if self.symbols.templates.keys().any(|t| self.candidates(name).contains(t)) {
                bail!(at location.clone(), "template function '{}' needs explicit template arguments", name);
            }
            bail!(at location.clone(), "unknown function '{}'", name);
        };
        self.pick_overload(name, keys, args, location)
    }

    pub(crate) fn pick_overload(
        &self,
        name: &str,
        keys: Vec<String>,
        args: &[Type],
        location: &Location,
    ) -> Result<String> {
        if let [only] = keys.as_slice() {
            return Ok(only.clone());
        }
        let signature = mangle::signature(args);
        let found = keys.iter().find(|key| {
            self.symbols
                .functions
                .get(*key)
                .is_some_and(|symbol| mangle::signature(&symbol.params) == signature)
        });
        match found {
            Some(key) => Ok(key.clone()),
            None => bail!(
                at location.clone(),
                "no overload of '{}' takes ({})",
                name,
                args.iter().join(", ")
            ),
        }
    }

    /// Methods are found before fields; neither is an error.
    pub(crate) fn resolve_member(
        &self,
        owner: &str,
        name: &str,
        location: &Location,
    ) -> Result<Member> {
        let methods = self.symbols.methods(owner, name);
        if !methods.is_empty() {
            return Ok(Member::Methods(methods.to_vec()));
        }
        if let Some(field) = self.symbols.field(owner, name) {
            return Ok(Member::Field(field.clone()));
        }
        bail!(at location.clone(), "no such member '{}' in '{}'", name, owner)
    }

    /// Picks among a method's overloads; `args` includes `this`.
    pub(crate) fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        keys: Vec<String>,
        args: &[Type],
        location: &Location,
    ) -> Result<String> {
        self.pick_overload(&format!("{}.{}", owner, name), keys, args, location)
    }

    /// Looks up `tag` for operand types `args` in `owner`'s operator table.
    pub(crate) fn resolve_operator(
        &self,
        owner: &str,
        tag: OperatorTag,
        args: &[Type],
        location: &Location,
    ) -> Result<OperatorTarget> {
        let Some(aggregate) = self.symbols.aggregates.get(owner) else {
            bail!(at location.clone(), "unknown aggregate '{}'", owner);
        };
        let signature = mangle::signature(args);
        let lookup = |tag: OperatorTag| {
            aggregate
                .operators
                .get(&tag)
                .and_then(|table| table.get(&signature))
                .cloned()
        };
        if let Some(key) = lookup(tag) {
            return Ok(OperatorTarget { key, negate: false });
        }
        if let Some(key) = tag.negated_counterpart().and_then(lookup) {
            return Ok(OperatorTarget { key, negate: true });
        }
        bail!(
            at location.clone(),
            "missing operator overload '{}{}' for ({})",
            owner,
            tag,
            args.iter().join(", ")
        )
    }
}
