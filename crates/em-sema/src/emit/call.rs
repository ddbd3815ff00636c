use em_core::ast::{NodeId, NodeKind};
use em_core::lir::{LirType, LirValue};
use em_core::types::{FunctionType, Type};
use em_core::{bail, Location, Result};

use super::function::implicit_zero;
use super::{Place, Value};
use crate::abi::ArgClass;
use crate::context::CompilationContext;
use crate::resolve::Member;
use crate::symbols::CallConv;

/// An evaluated call argument. Lvalues keep their place so an aggregate
/// can be passed by address to a pointer parameter.
#[derive(Debug, Clone)]
pub(crate) struct Arg {
    pub value: Value,
    pub place: Option<Place>,
}

impl CompilationContext {
    pub(crate) fn emit_call(&mut self, callee: NodeId, args: &[NodeId], location: &Location) -> Result<Value> {
        match self.ast.kind(callee).clone() {
            NodeKind::Ident {
                name,
                template_args,
            } if !template_args.is_empty() => {
                if let Some(aggregate) = self.constructed_instance(&name, &template_args, location)? {
                    return self.emit_construction(&aggregate, args, location);
                }
                let key = self.instantiate_function(&name, &template_args, location)?;
                let args = self.emit_args(args)?;
                self.call_function(&key, args, location)
            }
            NodeKind::Ident { name, .. } if !self.is_variable(&name) => {
                if let Some(aggregate) = self.constructed_aggregate(&name, location)? {
                    return self.construct_default(&aggregate, args.len(), location);
                }
                let args = self.emit_args(args)?;
                let types = arg_types(&args);
                let key = self.resolve_function(&name, &types, location)?;
                self.call_function(&key, args, location)
            }
            NodeKind::Get { base, name } => {
                let (owner, this) = self.member_base(base, location)?;
                match self.resolve_member(&owner, &name, location)? {
                    Member::Methods(keys) => {
                        let this = Arg {
                            value: Value::new(Type::named(&owner).pointer_to(), this),
                            place: None,
                        };
                        let mut all = vec![this];
                        all.extend(self.emit_args(args)?);
                        let key = self.resolve_method(&owner, &name, keys, &arg_types(&all), location)?;
                        self.call_function(&key, all, location)
                    }
                    Member::Field(field) => {
                        let field_lir = self.lower_type(&field.ty, location)?;
                        let builder = self.builder()?;
                        let ptr = builder.field_ptr(this, field.index, field_lir.clone());
                        let target = builder.load(ptr, field_lir);
                        let args = self.emit_args(args)?;
                        self.call_indirect(Value::new(field.ty, target), args, location)
                    }
                }
            }
            _ => {
                let target = self.emit_expr(callee)?;
                let args = self.emit_args(args)?;
                self.call_indirect(target, args, location)
            }
        }
    }

    pub(super) fn emit_args(&mut self, args: &[NodeId]) -> Result<Vec<Arg>> {
        let mut out = Vec::with_capacity(args.len());
        for &id in args {
            let location = self.locate(id);
            let arg = if self.is_place_expr(id) {
                let place = self.emit_place(id)?;
                let value = self.load_place(place.clone(), &location)?;
                Arg {
                    value,
                    place: Some(place),
                }
            } else {
                Arg {
                    value: self.emit_expr(id)?,
                    place: None,
                }
            };
            if arg.value.ty.is_void() {
                bail!(at location, "a void value cannot be passed as an argument");
            }
            out.push(arg);
        }
        Ok(out)
    }

    /// Calls the function registered under `key`. `cdecl64` callees get
    /// their aggregate arguments lowered to the classified form.
    pub(crate) fn call_function(&mut self, key: &str, args: Vec<Arg>, location: &Location) -> Result<Value> {
        let Some(symbol) = self.symbols.functions.get(key).cloned() else {
            bail!(at location.clone(), "unknown function '{}'", key);
        };
        check_arity(&symbol.name, symbol.params.len(), symbol.variadic, args.len(), location)?;
        let classes = self.param_classes(&symbol, location)?;

        let mut lowered = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            let Some(param) = symbol.params.get(index) else {
                lowered.push(arg.value.value);
                continue;
            };
            let value = self.adapt_argument(arg, param, location)?;
            let value = match &classes[index] {
                ArgClass::Direct => value.value,
                class => self.abi_argument(value.value, param, class, location)?,
            };
            lowered.push(value);
        }

        let ret_lir = if implicit_zero(&symbol) {
            LirType::I32
        } else {
            self.lower_type(&symbol.ret, location)?
        };
        let callee = LirValue::Function(symbol.link_name.clone());
        let conv = symbol.conv.lir();
        let result = self.builder()?.call(callee, lowered, conv, ret_lir);
        if symbol.ret.is_void() {
            return Ok(Value::void());
        }
        Ok(Value::new(symbol.ret.strip().clone(), result))
    }

    fn call_indirect(&mut self, target: Value, args: Vec<Arg>, location: &Location) -> Result<Value> {
        let function = match target.ty.strip() {
            Type::Function(f) => f.clone(),
            Type::Pointer(inner) => match inner.strip() {
                Type::Function(f) => f.clone(),
                other => bail!(at location.clone(), "'{}' is not callable", other.clone().pointer_to()),
            },
            other => bail!(at location.clone(), "'{}' is not callable", other),
        };
        let FunctionType {
            ret,
            params,
            variadic,
        } = function;
        check_arity("function pointer", params.len(), variadic, args.len(), location)?;
        let mut lowered = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            let value = match params.get(index) {
                Some(param) => self.adapt_argument(arg, param, location)?.value,
                None => arg.value.value,
            };
            lowered.push(value);
        }
        let ret_lir = self.lower_type(&ret, location)?;
        let result = self
            .builder()?
            .call(target.value, lowered, CallConv::Default.lir(), ret_lir);
        if ret.is_void() {
            return Ok(Value::void());
        }
        Ok(Value::new(ret.strip().clone(), result))
    }

    /// Passes an aggregate by address to `S*` and loads an `S*` passed to
    /// `S`; everything else goes through the implicit conversions.
    fn adapt_argument(&mut self, arg: Arg, param: &Type, location: &Location) -> Result<Value> {
        let from = arg.value.ty.strip().clone();
        let to = param.strip().clone();
        match (&from, &to) {
            (Type::Aggregate { .. }, Type::Pointer(inner)) if inner.same_as(&from) => {
                let place = match arg.place {
                    Some(place) => place,
                    None => self.materialize(arg.value, location)?,
                };
                Ok(Value::new(to, place.ptr))
            }
            (Type::Pointer(inner), Type::Aggregate { .. }) if inner.same_as(&to) => {
                let lir = self.lower_type(&to, location)?;
                let value = self.builder()?.load(arg.value.value, lir);
                Ok(Value::new(to, value))
            }
            _ => self.coerce(arg.value, &to, location),
        }
    }
}

pub(super) fn arg_types(args: &[Arg]) -> Vec<Type> {
    args.iter().map(|arg| arg.value.ty.strip().clone()).collect()
}

fn check_arity(
    name: &str,
    expected: usize,
    variadic: bool,
    got: usize,
    location: &Location,
) -> Result<()> {
    if got < expected || (got > expected && !variadic) {
        bail!(
            at location.clone(),
            "'{}' expects {} arguments, got {}",
            name,
            expected,
            got
        );
    }
    Ok(())
}
