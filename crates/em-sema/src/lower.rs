use em_core::lir::LirType;
use em_core::types::{ArrayLen, ScalarKind, Type};
use em_core::{bail, Location, Result};

use crate::context::CompilationContext;

pub(crate) fn scalar_lir(kind: ScalarKind) -> LirType {
    use ScalarKind::*;
    match kind {
        Bool => LirType::I1,
        Char | Uchar => LirType::I8,
        Short | Ushort => LirType::I16,
        Int | Uint => LirType::I32,
        Long | Ulong => LirType::I64,
        Cent | Ucent => LirType::I128,
        Half => LirType::F16,
        Bhalf => LirType::BF16,
        Float => LirType::F32,
        Double => LirType::F64,
        Real => LirType::F128,
    }
}

impl CompilationContext {
    /// LIR type of a resolved source type. Aggregates lower to named
    /// structs; a pointer back into an aggregate that is still being
    /// lowered becomes an opaque `i8*`.
    pub(crate) fn lower_type(&self, ty: &Type, location: &Location) -> Result<LirType> {
        let mut visiting = Vec::new();
        self.lower_in(ty, location, &mut visiting)
    }

    fn lower_in(
        &self,
        ty: &Type,
        location: &Location,
        visiting: &mut Vec<String>,
    ) -> Result<LirType> {
        let lowered = match ty.strip() {
            Type::Void => LirType::Void,
            Type::Scalar(kind) => scalar_lir(*kind),
            Type::Pointer(inner) => {
                let recursive = inner
                    .aggregate_name()
                    .is_some_and(|name| visiting.contains(&name));
                if inner.is_function() {
                    // `f*` and `f` both denote a function pointer
                    self.lower_in(inner, location, visiting)?
                } else if recursive || inner.is_void() {
                    LirType::ptr(LirType::I8)
                } else {
                    LirType::ptr(self.lower_in(inner, location, visiting)?)
                }
            }
            Type::Array(inner, ArrayLen::Fixed(len)) => {
                LirType::Array(Box::new(self.lower_in(inner, location, visiting)?), *len)
            }
            Type::Array(_, _) => bail!(at location.clone(), "array length of '{}' is not known", ty),
            agg @ Type::Aggregate { .. } => {
                let name = agg.canonical();
                if visiting.contains(&name) {
                    bail!(at location.clone(), "aggregate '{}' contains itself by value", name);
                }
                let Some(symbol) = self.symbols.aggregates.get(&name) else {
                    bail!(at location.clone(), "unknown aggregate '{}'", name);
                };
                visiting.push(name.clone());
                let mut fields = Vec::with_capacity(symbol.fields.len());
                for field in &symbol.fields {
                    fields.push(self.lower_in(&field.ty, location, visiting)?);
                }
                visiting.pop();
                LirType::Struct {
                    fields,
                    packed: false,
                    name: Some(name),
                }
            }
            Type::Function(func) => {
                let mut params = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    params.push(self.lower_in(param, location, visiting)?);
                }
                LirType::ptr(LirType::Function {
                    return_type: Box::new(self.lower_in(&func.ret, location, visiting)?),
                    param_types: params,
                    is_variadic: func.variadic,
                })
            }
            Type::TemplateParam(name) => {
                bail!(at location.clone(), "template parameter '{}' is not bound", name)
            }
            Type::Const(inner) | Type::Alias { target: inner, .. } => {
                self.lower_in(inner, location, visiting)?
            }
        };
        Ok(lowered)
    }
}
