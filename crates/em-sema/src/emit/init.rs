use em_core::ast::NodeId;
use em_core::lir::{LirConstant, LirValue};
use em_core::types::Type;
use em_core::{bail, Location, Result};

use super::call::arg_types;
use super::Value;
use crate::context::CompilationContext;
use crate::symbols::FieldSymbol;

impl CompilationContext {
    /// A fresh slot holding the default value of `ty`: zero, with field
    /// defaults applied to aggregates at every nesting level.
    pub(crate) fn default_slot(&mut self, ty: &Type, location: &Location) -> Result<LirValue> {
        let lir = self.lower_type(ty, location)?;
        let builder = self.builder()?;
        let slot = builder.alloca(lir.clone());
        builder.store(LirValue::Constant(LirConstant::ZeroInitializer(lir)), slot.clone());
        self.apply_field_defaults(ty, slot.clone(), 0, location)?;
        Ok(slot)
    }

    /// Stores the declared defaults of `ty`'s fields from index `from` on;
    /// `slot` already holds zeroes.
    pub(crate) fn apply_field_defaults(
        &mut self,
        ty: &Type,
        slot: LirValue,
        from: usize,
        location: &Location,
    ) -> Result<()> {
        for field in self.aggregate_fields(ty, location)?.into_iter().skip(from) {
            if field.default.is_none() && !self.needs_defaults(&field.ty, location)? {
                continue;
            }
            let field_lir = self.lower_type(&field.ty, location)?;
            let ptr = self.builder()?.field_ptr(slot.clone(), field.index, field_lir);
            match field.default {
                Some(node) => {
                    let value = self.emit_expr(node)?;
                    let value = self.coerce(value, &field.ty, location)?;
                    self.builder()?.store(value.value, ptr);
                }
                None => self.apply_field_defaults(&field.ty, ptr, 0, location)?,
            }
        }
        Ok(())
    }

    /// Whether default initialization of `ty` stores anything beyond zero.
    pub(crate) fn needs_defaults(&mut self, ty: &Type, location: &Location) -> Result<bool> {
        for field in self.aggregate_fields(ty, location)? {
            if field.default.is_some() || self.needs_defaults(&field.ty, location)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `Name()` for an aggregate without constructors.
    pub(crate) fn construct_default(
        &mut self,
        name: &str,
        args: usize,
        location: &Location,
    ) -> Result<Value> {
        if args > 0 {
            bail!(at location.clone(), "'{}' has no constructor taking {} arguments", name, args);
        }
        let ty = Type::named(name);
        let lir = self.lower_type(&ty, location)?;
        let slot = self.default_slot(&ty, location)?;
        let value = self.builder()?.load(slot, lir);
        Ok(Value::new(ty, value))
    }

    /// `Name<args>(...)`: the instance's constructors, or its default value
    /// when it declares none.
    pub(crate) fn emit_construction(
        &mut self,
        aggregate: &str,
        args: &[NodeId],
        location: &Location,
    ) -> Result<Value> {
        let Some(keys) = self.symbols.overloads.get(aggregate).cloned() else {
            return self.construct_default(aggregate, args.len(), location);
        };
        let args = self.emit_args(args)?;
        let key = self.pick_overload(aggregate, keys, &arg_types(&args), location)?;
        self.call_function(&key, args, location)
    }

    /// The aggregate a call to `name` builds when no function of that
    /// name exists.
    pub(crate) fn constructed_aggregate(&mut self, name: &str, location: &Location) -> Result<Option<String>> {
        if self.find_overloads(name).is_some() {
            return Ok(None);
        }
        let found = self.candidates(name).into_iter().find(|candidate| {
            self.symbols.aggregates.contains_key(candidate)
                || self.symbols.declared_aggregates.contains_key(candidate)
        });
        let Some(found) = found else {
            return Ok(None);
        };
        self.ensure_aggregate_checked(&found, location)?;
        Ok(Some(found))
    }

    /// Fields of an aggregate type; empty for every other type.
    fn aggregate_fields(&mut self, ty: &Type, location: &Location) -> Result<Vec<FieldSymbol>> {
        let Some(name) = ty.strip().aggregate_name() else {
            return Ok(Vec::new());
        };
        self.ensure_aggregate_checked(&name, location)?;
        Ok(self
            .symbols
            .aggregate(&name)
            .map(|aggregate| aggregate.fields.clone())
            .unwrap_or_default())
    }
}
