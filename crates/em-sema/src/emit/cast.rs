use em_core::lir::{LirConstant, LirInstructionKind, LirType, LirValue};
use em_core::types::{cast_kind, CastKind, ScalarKind, Type};
use em_core::{bail, Location, Result};

use super::Value;
use crate::context::CompilationContext;

impl CompilationContext {
    /// An explicit conversion of `value` to `to`.
    pub(crate) fn emit_cast(&mut self, value: Value, to: &Type, location: &Location) -> Result<Value> {
        let target = to.strip().clone();
        let from = value.ty.strip().clone();
        if target.scalar_kind() == Some(ScalarKind::Bool) && from.scalar_kind() != Some(ScalarKind::Bool) {
            let truth = self.truth_value(value, location)?;
            return Ok(Value::new(target, truth));
        }
        if from.scalar_kind() == Some(ScalarKind::Bool) && target.is_float() {
            let widened = self.builder()?.push(
                LirInstructionKind::ZExt(value.value, LirType::I32),
                Some(LirType::I32),
            );
            return self.emit_cast(Value::new(Type::int(), widened), &target, location);
        }

        let kind = match cast_kind(&from, &target) {
            Ok(kind) => kind,
            Err(err) => bail!(at location.clone(), "{}", err),
        };
        let lir = self.lower_type(&target, location)?;
        let v = value.value;
        let inst = match kind {
            CastKind::Noop => return Ok(Value::new(target, v)),
            CastKind::Trunc => LirInstructionKind::Trunc(v, lir.clone()),
            CastKind::ZExt => LirInstructionKind::ZExt(v, lir.clone()),
            CastKind::SExt => LirInstructionKind::SExt(v, lir.clone()),
            CastKind::FPTrunc => LirInstructionKind::FPTrunc(v, lir.clone()),
            CastKind::FPExt => LirInstructionKind::FPExt(v, lir.clone()),
            CastKind::SIToFP => LirInstructionKind::SIToFP(v, lir.clone()),
            CastKind::FPToSI => LirInstructionKind::FPToSI(v, lir.clone()),
            CastKind::PtrToInt => LirInstructionKind::PtrToInt(v),
            CastKind::IntToPtr => LirInstructionKind::IntToPtr(v),
            CastKind::Bitcast => LirInstructionKind::Bitcast(v, lir.clone()),
            CastKind::Reinterpret => return self.reinterpret(Value::new(from, v), target, location),
        };
        let result = self.builder()?.push(inst, Some(lir));
        Ok(Value::new(target, result))
    }

    /// Aggregate to aggregate through a slot sized for the larger of the
    /// two; bytes the source does not cover read as zero.
    fn reinterpret(&mut self, value: Value, target: Type, location: &Location) -> Result<Value> {
        let from_lir = self.lower_type(&value.ty, location)?;
        let to_lir = self.lower_type(&target, location)?;
        let from_size = self.layout.size_of(&from_lir);
        let to_size = self.layout.size_of(&to_lir);
        let builder = self.builder()?;
        let result = if from_size >= to_size {
            let slot = builder.alloca(from_lir);
            builder.store(value.value, slot.clone());
            let view = builder.bitcast(slot, LirType::ptr(to_lir.clone()));
            builder.load(view, to_lir)
        } else {
            let slot = builder.alloca(to_lir.clone());
            builder.store(
                LirValue::Constant(LirConstant::ZeroInitializer(to_lir.clone())),
                slot.clone(),
            );
            let view = builder.bitcast(slot.clone(), LirType::ptr(from_lir));
            builder.store(value.value, view);
            builder.load(slot, to_lir)
        };
        Ok(Value::new(target, result))
    }

    /// The conversions applied without a cast: between numeric types, to
    /// and from `void*`, and from a function to a matching function
    /// pointer.
    pub(crate) fn coerce(&mut self, value: Value, target: &Type, location: &Location) -> Result<Value> {
        let to = target.strip().clone();
        let from = value.ty.strip().clone();
        if from.same_as(&to) {
            return Ok(Value::new(to, value.value));
        }
        if from.is_scalar() && to.is_scalar() {
            return self.emit_cast(value, &to, location);
        }
        let implicit_pointer = match (&from, &to) {
            (Type::Pointer(a), Type::Pointer(b)) => a.is_void() || b.is_void(),
            (Type::Function(f), Type::Pointer(p)) | (Type::Pointer(p), Type::Function(f)) => {
                Type::Function(f.clone()).same_as(p)
            }
            _ => false,
        };
        if implicit_pointer {
            let lir = self.lower_type(&to, location)?;
            let cast = self.builder()?.bitcast(value.value, lir);
            return Ok(Value::new(to, cast));
        }
        bail!(
            at location.clone(),
            "type mismatch: cannot convert '{}' to '{}'",
            from,
            to
        )
    }
}
