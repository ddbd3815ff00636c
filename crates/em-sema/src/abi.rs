//! Parameter passing for `cdecl64` functions. Aggregate parameters are
//! classified by shape and rewritten into register-sized values, the way
//! a C compiler passes them on x86-64.

use em_core::lir::builder::const_int;
use em_core::lir::{LirConstant, LirInstructionKind, LirType, LirValue};
use em_core::types::{ScalarKind, Type};
use em_core::{bail, Location, Result};

use crate::context::CompilationContext;
use crate::lower::scalar_lir;

/// Aggregates this large or larger are passed through memory.
pub const INDIRECT_THRESHOLD_BITS: u64 = 192;

#[derive(Debug, Clone, PartialEq)]
pub enum ArgClass {
    /// Passed unchanged.
    Direct,
    /// A one-field aggregate passed as its field.
    Field(Type),
    /// Integer fields packed back to back, first field in the low bits,
    /// into one integer register.
    Merged(ScalarKind),
    /// Two floats of one kind passed as a vector.
    Vector(ScalarKind, u32),
    /// A pointer to a caller-owned copy.
    Indirect,
}

impl CompilationContext {
    /// Classifies a parameter of a `cdecl64` function. Shapes outside the
    /// known rules are rejected rather than guessed.
    pub fn classify_param(&mut self, ty: &Type, location: &Location) -> Result<ArgClass> {
        let Some(name) = ty.aggregate_name() else {
            return Ok(ArgClass::Direct);
        };
        self.complete_type(ty, location)?;
        let Some(symbol) = self.symbols.aggregates.get(&name) else {
            bail!(at location.clone(), "unknown aggregate '{}'", name);
        };
        let fields = symbol.field_types();
        let Some(bits) = self.size_of(ty).map(|bytes| bytes * 8) else {
            bail!(at location.clone(), "size of '{}' is not known", name);
        };
        if bits >= INDIRECT_THRESHOLD_BITS {
            return Ok(ArgClass::Indirect);
        }
        let unclassifiable = |reason: &str| -> Result<ArgClass> {
            bail!(at location.clone(), "unclassifiable ABI shape for '{}': {}", name, reason)
        };
        match fields.len() {
            0 => unclassifiable("no fields"),
            1 => Ok(ArgClass::Field(fields[0].clone())),
            2..=4 => {
                if !fields.iter().all(Type::is_scalar) {
                    return unclassifiable("non-scalar fields");
                }
                if fields.iter().all(Type::is_integer) {
                    let packed: u64 = fields
                        .iter()
                        .filter_map(Type::scalar_kind)
                        .map(ScalarKind::bits)
                        .sum();
                    return Ok(match ScalarKind::int_for_bits(packed) {
                        Some(kind) if packed <= 64 => ArgClass::Merged(kind),
                        _ => ArgClass::Indirect,
                    });
                }
                let first = fields[0].scalar_kind();
                let uniform_pair = fields.len() == 2
                    && first.is_some_and(ScalarKind::is_float)
                    && fields[1].scalar_kind() == first;
                match first {
                    Some(kind) if uniform_pair => Ok(ArgClass::Vector(kind, 2)),
                    _ => Ok(ArgClass::Indirect),
                }
            }
            n => unclassifiable(&format!("{} fields", n)),
        }
    }

    /// The LIR type a parameter travels as.
    pub(crate) fn abi_param_type(
        &self,
        ty: &Type,
        class: &ArgClass,
        location: &Location,
    ) -> Result<LirType> {
        Ok(match class {
            ArgClass::Direct => self.lower_type(ty, location)?,
            ArgClass::Field(field) => self.lower_type(field, location)?,
            ArgClass::Merged(kind) => scalar_lir(*kind),
            ArgClass::Vector(kind, lanes) => LirType::Vector(Box::new(scalar_lir(*kind)), *lanes),
            ArgClass::Indirect => LirType::ptr(self.lower_type(ty, location)?),
        })
    }

    /// Each field's LIR type with its bit offset inside the merged register.
    fn packed_fields(&mut self, ty: &Type, location: &Location) -> Result<Vec<(LirType, u64)>> {
        let Some(name) = ty.aggregate_name() else {
            bail!(at location.clone(), "'{}' is not an aggregate", ty);
        };
        let Some(symbol) = self.symbols.aggregates.get(&name) else {
            bail!(at location.clone(), "unknown aggregate '{}'", name);
        };
        let mut offset = 0;
        let mut packed = Vec::new();
        for field in symbol.field_types() {
            let Some(kind) = field.scalar_kind() else {
                bail!(at location.clone(), "'{}' cannot be merged into a register", field);
            };
            packed.push((scalar_lir(kind), offset));
            offset += kind.bits();
        }
        Ok(packed)
    }

    /// Rebuilds parameter `index` in memory at function entry and returns
    /// the slot the parameter variable lives in.
    pub(crate) fn bind_param(
        &mut self,
        index: usize,
        ty: &Type,
        class: &ArgClass,
        location: &Location,
    ) -> Result<LirValue> {
        let incoming = LirValue::Local(index as u32);
        let struct_ty = self.lower_type(ty, location)?;
        let register_ty = self.abi_param_type(ty, class, location)?;
        let packed = match class {
            ArgClass::Merged(_) => self.packed_fields(ty, location)?,
            _ => Vec::new(),
        };
        let builder = &mut self.func()?.builder;
        let slot = match class {
            ArgClass::Direct => {
                let slot = builder.alloca(struct_ty);
                builder.store(incoming, slot.clone());
                slot
            }
            ArgClass::Field(_) => {
                let slot = builder.alloca(struct_ty);
                let field = builder.field_ptr(slot.clone(), 0, register_ty);
                builder.store(incoming, field);
                slot
            }
            ArgClass::Merged(_) => {
                let slot = builder.alloca(struct_ty);
                for (index, (field_ty, offset)) in packed.into_iter().enumerate() {
                    let shifted = builder.push(
                        LirInstructionKind::LShr(
                            incoming.clone(),
                            const_int(offset as i128, register_ty.clone()),
                        ),
                        Some(register_ty.clone()),
                    );
                    let value = builder.push(
                        LirInstructionKind::Trunc(shifted, field_ty.clone()),
                        Some(field_ty.clone()),
                    );
                    let field = builder.field_ptr(slot.clone(), index as u32, field_ty);
                    builder.store(value, field);
                }
                slot
            }
            ArgClass::Vector(..) => {
                let temp = builder.alloca(register_ty);
                builder.store(incoming, temp.clone());
                builder.bitcast(temp, LirType::ptr(struct_ty))
            }
            ArgClass::Indirect => incoming,
        };
        Ok(slot)
    }

    /// Rewrites an aggregate argument value into its register form at a
    /// call site.
    pub(crate) fn abi_argument(
        &mut self,
        value: LirValue,
        ty: &Type,
        class: &ArgClass,
        location: &Location,
    ) -> Result<LirValue> {
        let struct_ty = self.lower_type(ty, location)?;
        let register_ty = self.abi_param_type(ty, class, location)?;
        let packed = match class {
            ArgClass::Merged(_) => self.packed_fields(ty, location)?,
            _ => Vec::new(),
        };
        let builder = &mut self.func()?.builder;
        let lowered = match class {
            ArgClass::Direct => value,
            ArgClass::Field(_) => builder.push(
                LirInstructionKind::ExtractValue {
                    aggregate: value,
                    indices: vec![0],
                },
                Some(register_ty),
            ),
            ArgClass::Merged(_) => {
                let mut merged = const_int(0, register_ty.clone());
                for (index, (field_ty, offset)) in packed.into_iter().enumerate() {
                    let field = builder.push(
                        LirInstructionKind::ExtractValue {
                            aggregate: value.clone(),
                            indices: vec![index as u32],
                        },
                        Some(field_ty),
                    );
                    let widened = builder.push(
                        LirInstructionKind::ZExt(field, register_ty.clone()),
                        Some(register_ty.clone()),
                    );
                    let shifted = builder.push(
                        LirInstructionKind::Shl(widened, const_int(offset as i128, register_ty.clone())),
                        Some(register_ty.clone()),
                    );
                    merged = builder.push(
                        LirInstructionKind::Or(merged, shifted),
                        Some(register_ty.clone()),
                    );
                }
                merged
            }
            ArgClass::Vector(..) => {
                let temp = builder.alloca(register_ty.clone());
                let zero = LirValue::Constant(LirConstant::ZeroInitializer(register_ty.clone()));
                builder.store(zero, temp.clone());
                let as_struct = builder.bitcast(temp.clone(), LirType::ptr(struct_ty));
                builder.store(value, as_struct);
                builder.load(temp, register_ty)
            }
            ArgClass::Indirect => {
                let copy = builder.alloca(struct_ty);
                builder.store(value, copy.clone());
                copy
            }
        };
        Ok(lowered)
    }
}
