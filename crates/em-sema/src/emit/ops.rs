use em_core::ast::{BinaryOp, OperatorTag};
use em_core::lir::builder::const_int;
use em_core::lir::{LirConstant, LirInstructionKind, LirType, LirValue};
use em_core::types::{ScalarKind, Type};
use em_core::{bail, Location, Result};

use super::call::Arg;
use super::Value;
use crate::context::CompilationContext;

/// The kind both operands of a mixed scalar operation convert to: floats
/// win over integers, then the wider operand, then the unsigned one.
pub(crate) fn common_kind(a: ScalarKind, b: ScalarKind) -> ScalarKind {
    if a == b {
        return a;
    }
    match (a.is_float(), b.is_float()) {
        (true, false) => a,
        (false, true) => b,
        _ if a.bits() != b.bits() => {
            if a.bits() > b.bits() {
                a
            } else {
                b
            }
        }
        _ if b.is_unsigned() => b,
        _ => a,
    }
}

fn pointer_like(ty: &Type) -> bool {
    ty.is_pointer() || ty.is_function()
}

impl CompilationContext {
    /// The integer type a pointer converts to for comparisons.
    pub(crate) fn address_type(&self) -> LirType {
        LirType::int_of_bits(self.layout.pointer_bytes * 8).unwrap_or(LirType::I64)
    }

    pub(crate) fn emit_arith(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        location: &Location,
    ) -> Result<Value> {
        let (lt, rt) = (left.ty.strip().clone(), right.ty.strip().clone());
        let invalid = || -> Result<Value> {
            bail!(at location.clone(), "invalid operands to '{}': '{}' and '{}'", op, lt, rt)
        };

        if let Type::Pointer(elem) = &lt {
            if rt.is_integer() && matches!(op, BinaryOp::Add | BinaryOp::Sub) && !elem.is_void() {
                return self.emit_pointer_offset(op, left, right, location);
            }
        }
        if pointer_like(&lt) || pointer_like(&rt) {
            if !(op.is_comparison() && pointer_like(&lt) && pointer_like(&rt)) {
                return invalid();
            }
            let address = self.address_type();
            let builder = self.builder()?;
            let a = builder.push(LirInstructionKind::PtrToInt(left.value), Some(address.clone()));
            let b = builder.push(LirInstructionKind::PtrToInt(right.value), Some(address));
            let value = self.compare(op, a, b, true)?;
            return Ok(Value::new(Type::bool(), value));
        }

        let (Some(a), Some(b)) = (lt.scalar_kind(), rt.scalar_kind()) else {
            return invalid();
        };
        let kind = common_kind(a, b);
        let common = Type::Scalar(kind);
        let left = self.emit_cast(left, &common, location)?;
        let right = self.emit_cast(right, &common, location)?;
        if op.is_comparison() {
            let value = self.compare(op, left.value, right.value, kind.is_unsigned())?;
            return Ok(Value::new(Type::bool(), value));
        }

        let (l, r) = (left.value, right.value);
        let float = kind.is_float();
        let unsigned = kind.is_unsigned();
        let inst = match op {
            BinaryOp::Add => LirInstructionKind::Add(l, r),
            BinaryOp::Sub => LirInstructionKind::Sub(l, r),
            BinaryOp::Mul => LirInstructionKind::Mul(l, r),
            BinaryOp::Div if unsigned && !float => LirInstructionKind::UDiv(l, r),
            BinaryOp::Div => LirInstructionKind::Div(l, r),
            BinaryOp::Rem if float => return invalid(),
            BinaryOp::Rem if unsigned => LirInstructionKind::URem(l, r),
            BinaryOp::Rem => LirInstructionKind::Rem(l, r),
            _ if float => return invalid(),
            BinaryOp::BitAnd => LirInstructionKind::And(l, r),
            BinaryOp::BitOr => LirInstructionKind::Or(l, r),
            BinaryOp::BitXor => LirInstructionKind::Xor(l, r),
            BinaryOp::Shl => LirInstructionKind::Shl(l, r),
            BinaryOp::Shr if unsigned => LirInstructionKind::LShr(l, r),
            BinaryOp::Shr => LirInstructionKind::Shr(l, r),
            _ => return invalid(),
        };
        let lir = self.lower_type(&common, location)?;
        let value = self.builder()?.push(inst, Some(lir));
        Ok(Value::new(common, value))
    }

    fn emit_pointer_offset(
        &mut self,
        op: BinaryOp,
        pointer: Value,
        offset: Value,
        location: &Location,
    ) -> Result<Value> {
        let Type::Pointer(elem) = pointer.ty.strip().clone() else {
            bail!(at location.clone(), "'{}' is not a pointer", pointer.ty);
        };
        let offset = self.emit_cast(offset, &Type::Scalar(ScalarKind::Long), location)?;
        let elem_lir = self.lower_type(&elem, location)?;
        let builder = self.builder()?;
        let index = match op {
            BinaryOp::Sub => builder.push(LirInstructionKind::Neg(offset.value), Some(LirType::I64)),
            _ => offset.value,
        };
        let value = builder.gep(pointer.value, vec![index], elem_lir);
        Ok(Value::new(pointer.ty.strip().clone(), value))
    }

    fn compare(&mut self, op: BinaryOp, a: LirValue, b: LirValue, unsigned: bool) -> Result<LirValue> {
        let inst = match (op, unsigned) {
            (BinaryOp::Eq, _) => LirInstructionKind::Eq(a, b),
            (BinaryOp::Ne, _) => LirInstructionKind::Ne(a, b),
            (BinaryOp::Lt, false) => LirInstructionKind::Lt(a, b),
            (BinaryOp::Le, false) => LirInstructionKind::Le(a, b),
            (BinaryOp::Gt, false) => LirInstructionKind::Gt(a, b),
            (BinaryOp::Ge, false) => LirInstructionKind::Ge(a, b),
            (BinaryOp::Lt, true) => LirInstructionKind::ULt(a, b),
            (BinaryOp::Le, true) => LirInstructionKind::ULe(a, b),
            (BinaryOp::Gt, true) => LirInstructionKind::UGt(a, b),
            (BinaryOp::Ge, true) => LirInstructionKind::UGe(a, b),
            (op, _) => bail!("'{}' is not a comparison", op),
        };
        Ok(self.builder()?.push(inst, Some(LirType::I1)))
    }

    /// `value != 0` for scalars and pointers.
    pub(crate) fn truth_value(&mut self, value: Value, location: &Location) -> Result<LirValue> {
        let ty = value.ty.strip().clone();
        if let Some(kind) = ty.scalar_kind() {
            if kind == ScalarKind::Bool {
                return Ok(value.value);
            }
            let lir = self.lower_type(&ty, location)?;
            let zero = if kind.is_float() {
                LirValue::Constant(LirConstant::Float(0.0, lir))
            } else {
                const_int(0, lir)
            };
            let builder = self.builder()?;
            return Ok(builder.push(LirInstructionKind::Ne(value.value, zero), Some(LirType::I1)));
        }
        if pointer_like(&ty) {
            let address_ty = self.address_type();
            let zero = const_int(0, address_ty.clone());
            let builder = self.builder()?;
            let address = builder.push(LirInstructionKind::PtrToInt(value.value), Some(address_ty));
            return Ok(builder.push(LirInstructionKind::Ne(address, zero), Some(LirType::I1)));
        }
        bail!(at location.clone(), "'{}' cannot be used as a condition", ty)
    }

    /// Calls `owner`'s operator `tag`. A missing `!=`, `>=` or `<=` is
    /// answered by negating `==`, `<` or `>`.
    pub(crate) fn emit_operator_call(
        &mut self,
        owner: &str,
        tag: OperatorTag,
        operands: Vec<Value>,
        location: &Location,
    ) -> Result<Value> {
        let types: Vec<Type> = operands.iter().map(|v| v.ty.strip().clone()).collect();
        let target = self.resolve_operator(owner, tag, &types, location)?;
        let args = operands
            .into_iter()
            .map(|value| Arg { value, place: None })
            .collect();
        let result = self.call_function(&target.key, args, location)?;
        if !target.negate {
            return Ok(result);
        }
        if result.ty.scalar_kind() != Some(ScalarKind::Bool) {
            bail!(
                at location.clone(),
                "operator '{}{}' must return bool to stand in for '{}'",
                owner,
                tag.negated_counterpart().map(|t| t.to_string()).unwrap_or_default(),
                tag
            );
        }
        let value = self
            .builder()?
            .push(LirInstructionKind::Not(result.value), Some(LirType::I1));
        Ok(Value::new(Type::bool(), value))
    }
}
