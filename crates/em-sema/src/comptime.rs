//! Compile-time evaluation: constant folding, `@`-builtins and `@if`.

use em_core::ast::{BinaryOp, BuiltinArg, NodeId, NodeKind, UnaryOp};
use em_core::types::{ConstValue, ScalarKind, Type};
use em_core::{bail, Location, Result};
use itertools::Itertools;

use crate::context::CompilationContext;
use crate::symbols::AliasEntry;

impl CompilationContext {
    /// Folds `id` to a constant, or `None` when it depends on runtime state.
    pub(crate) fn fold(&mut self, id: NodeId) -> Result<Option<ConstValue>> {
        let location = self.locate(id);
        let value = match self.ast.kind(id).clone() {
            NodeKind::Int(v) => Some(ConstValue::int(v)),
            NodeKind::Float(v) => Some(ConstValue::Float(v, ScalarKind::Double)),
            NodeKind::Bool(b) => Some(ConstValue::Bool(b)),
            NodeKind::Char(c) => Some(ConstValue::Int(c as i128, ScalarKind::Char)),
            NodeKind::Str(s) => Some(ConstValue::Str(s)),
            NodeKind::Null => Some(ConstValue::Null),
            NodeKind::Ident {
                name,
                template_args,
            } if template_args.is_empty() => self.lookup_const(&name),
            NodeKind::Unary { op, operand } => match self.fold(operand)? {
                Some(value) => fold_unary(op, value),
                None => None,
            },
            NodeKind::Binary { op, lhs, rhs } if !op.is_assignment() => {
                self.fold_binary_nodes(op, lhs, rhs, &location)?
            }
            NodeKind::Cast { ty, value } => match self.fold(value)? {
                Some(value) => {
                    let ty = self.resolve_type(&ty, &location)?;
                    convert_const(value, &ty)
                }
                None => None,
            },
            NodeKind::SizeOf(ty) => Some(self.const_size_of(&ty, &location)?),
            NodeKind::Builtin { name, args } => self.eval_builtin(id, &name, &args)?,
            _ => None,
        };
        Ok(value)
    }

    pub(crate) fn fold_required(&mut self, id: NodeId, what: &str) -> Result<ConstValue> {
        match self.fold(id)? {
            Some(value) => Ok(value),
            None => bail!(at self.locate(id), "{} must be a compile-time constant", what),
        }
    }

    /// Picks the branch of an `@if`; `None` when the false branch is absent.
    pub(crate) fn comptime_branch(
        &mut self,
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    ) -> Result<Option<NodeId>> {
        let value = self.fold_required(cond, "an @if condition")?;
        let Some(taken) = value.truthy() else {
            bail!(at self.locate(cond), "@if condition '{}' is not a boolean", value);
        };
        Ok(if taken { Some(then) } else { otherwise })
    }

    fn fold_binary_nodes(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        location: &Location,
    ) -> Result<Option<ConstValue>> {
        let Some(left) = self.fold(lhs)? else {
            return Ok(None);
        };
        if op.is_logical() {
            let Some(l) = left.truthy() else {
                return Ok(None);
            };
            // short-circuit: the right side may not be constant
            if (op == BinaryOp::And && !l) || (op == BinaryOp::Or && l) {
                return Ok(Some(ConstValue::Bool(l)));
            }
            let right = self.fold(rhs)?;
            return Ok(right.and_then(|r| r.truthy()).map(ConstValue::Bool));
        }
        let Some(right) = self.fold(rhs)? else {
            return Ok(None);
        };
        fold_binary(op, left, right, location)
    }

    /// A name bound to a compile-time value: template value parameters,
    /// value aliases and initialized constants. Locals shadow all of them.
    pub(crate) fn lookup_const(&self, name: &str) -> Option<ConstValue> {
        if let Some(func) = &self.func {
            if func.scope.lookup(name).is_some() {
                return None;
            }
            if let Some(AliasEntry::Value(value)) = func.scope.alias(name) {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.subst.get_value(name) {
            return Some(value.clone());
        }
        for candidate in self.candidates(name) {
            if let Some(AliasEntry::Value(value)) = self.symbols.aliases.get(&candidate) {
                return Some(value.clone());
            }
            if let Some(global) = self.symbols.globals.get(&candidate) {
                return if global.is_const { global.value.clone() } else { None };
            }
        }
        None
    }

    /// `@sizeOf` yields an `int`; sizes beyond its range are not known.
    fn const_size_of(&mut self, ty: &Type, location: &Location) -> Result<ConstValue> {
        let ty = self.resolve_type(ty, location)?;
        self.complete_type(&ty, location)?;
        match self.size_of(&ty).and_then(|bytes| i32::try_from(bytes).ok()) {
            Some(bytes) => Ok(ConstValue::Int(bytes as i128, ScalarKind::Int)),
            None => bail!(at location.clone(), "size of '{}' is not known", ty),
        }
    }

    fn builtin_type(&mut self, arg: &BuiltinArg, location: &Location) -> Result<Type> {
        match arg {
            BuiltinArg::Type(ty) => self.resolve_type(ty, location),
            BuiltinArg::Expr(node) => match self.ast.kind(*node).clone() {
                NodeKind::Ident { name, .. } => self.resolve_type(&Type::named(&name), location),
                _ => bail!(at location.clone(), "expected a type argument"),
            },
        }
    }

    fn builtin_types(
        &mut self,
        name: &str,
        args: &[BuiltinArg],
        count: usize,
        location: &Location,
    ) -> Result<Vec<Type>> {
        if args.len() != count {
            bail!(at location.clone(), "@{} expects {} arguments, got {}", name, count, args.len());
        }
        args.iter()
            .map(|arg| self.builtin_type(arg, location))
            .collect()
    }

    /// Evaluates a builtin call. `@warning` reports and yields no value,
    /// `@error` aborts the unit.
    pub(crate) fn eval_builtin(
        &mut self,
        id: NodeId,
        name: &str,
        args: &[BuiltinArg],
    ) -> Result<Option<ConstValue>> {
        let location = self.locate(id);
        let value = match name {
            "sizeOf" => {
                let ty = self.builtin_types(name, args, 1, &location)?.remove(0);
                self.const_size_of(&ty, &location)?
            }
            "isNumeric" | "isFloat" | "isPointer" | "isArray" | "isStructure" => {
                let ty = self.builtin_types(name, args, 1, &location)?.remove(0);
                ConstValue::Bool(match name {
                    "isNumeric" => ty.is_scalar(),
                    "isFloat" => ty.is_float(),
                    "isPointer" => ty.is_pointer(),
                    "isArray" => ty.is_array(),
                    _ => ty.is_aggregate(),
                })
            }
            "tEquals" | "tNequals" => {
                let types = self.builtin_types(name, args, 2, &location)?;
                let equal = types[0].same_as(&types[1]);
                ConstValue::Bool(if name == "tEquals" { equal } else { !equal })
            }
            "typeToString" => {
                let ty = self.builtin_types(name, args, 1, &location)?.remove(0);
                ConstValue::Str(ty.canonical())
            }
            "aliasExists" => {
                let [arg] = args else {
                    bail!(at location, "@aliasExists expects 1 argument, got {}", args.len());
                };
                let alias = match arg {
                    BuiltinArg::Type(Type::Aggregate { name, args }) if args.is_empty() => name.clone(),
                    BuiltinArg::Expr(node) => match self.ast.kind(*node) {
                        NodeKind::Ident { name, .. } => name.clone(),
                        _ => bail!(at location, "@aliasExists expects a name"),
                    },
                    _ => bail!(at location, "@aliasExists expects a name"),
                };
                ConstValue::Bool(self.alias_exists(&alias))
            }
            "warning" | "error" => {
                let message = self.builtin_message(name, args, &location)?;
                if name == "error" {
                    bail!(at location, "{}", message);
                }
                self.warn(location, message, "user-warning");
                return Ok(None);
            }
            _ => bail!(at location, "unknown builtin '@{}'", name),
        };
        Ok(Some(value))
    }

    fn builtin_message(
        &mut self,
        name: &str,
        args: &[BuiltinArg],
        location: &Location,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let BuiltinArg::Expr(node) = arg else {
                bail!(at location.clone(), "@{} expects constant arguments", name);
            };
            match self.fold_required(*node, "a message")? {
                ConstValue::Str(text) => parts.push(text),
                other => parts.push(other.to_string()),
            }
        }
        Ok(parts.into_iter().join(""))
    }

    fn alias_exists(&self, name: &str) -> bool {
        if self.subst.get_type(name).is_some() || self.subst.get_value(name).is_some() {
            return true;
        }
        if self
            .func
            .as_ref()
            .is_some_and(|func| func.scope.alias(name).is_some())
        {
            return true;
        }
        self.candidates(name)
            .iter()
            .any(|candidate| self.symbols.aliases.contains_key(candidate))
    }
}

fn fold_unary(op: UnaryOp, value: ConstValue) -> Option<ConstValue> {
    match (op, value) {
        (UnaryOp::Neg, ConstValue::Int(v, kind)) => {
            Some(ConstValue::Int(wrap_int(v.wrapping_neg(), kind), kind))
        }
        (UnaryOp::Neg, ConstValue::Float(v, kind)) => Some(ConstValue::Float(-v, kind)),
        (UnaryOp::Not, value) => value.truthy().map(|b| ConstValue::Bool(!b)),
        (UnaryOp::BitNot, ConstValue::Int(v, kind)) => Some(ConstValue::Int(wrap_int(!v, kind), kind)),
        _ => None,
    }
}

fn wider_int(a: ScalarKind, b: ScalarKind) -> ScalarKind {
    if b.bits() > a.bits() || (b.bits() == a.bits() && b.is_unsigned()) {
        b
    } else {
        a
    }
}

fn fold_binary(
    op: BinaryOp,
    left: ConstValue,
    right: ConstValue,
    location: &Location,
) -> Result<Option<ConstValue>> {
    use BinaryOp::*;
    let value = match (&left, &right) {
        (ConstValue::Str(a), ConstValue::Str(b)) => match op {
            Eq => Some(ConstValue::Bool(a == b)),
            Ne => Some(ConstValue::Bool(a != b)),
            Add => Some(ConstValue::Str(format!("{}{}", a, b))),
            _ => None,
        },
        (ConstValue::Float(..), _) | (_, ConstValue::Float(..)) => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return Ok(None);
            };
            let kind = [&left, &right]
                .into_iter()
                .filter_map(|v| match v {
                    ConstValue::Float(_, kind) => Some(*kind),
                    _ => None,
                })
                .max_by_key(|kind| kind.bits())
                .unwrap_or(ScalarKind::Double);
            match op {
                Add => Some(ConstValue::Float(a + b, kind)),
                Sub => Some(ConstValue::Float(a - b, kind)),
                Mul => Some(ConstValue::Float(a * b, kind)),
                Div => Some(ConstValue::Float(a / b, kind)),
                Eq => Some(ConstValue::Bool(a == b)),
                Ne => Some(ConstValue::Bool(a != b)),
                Lt => Some(ConstValue::Bool(a < b)),
                Gt => Some(ConstValue::Bool(a > b)),
                Le => Some(ConstValue::Bool(a <= b)),
                Ge => Some(ConstValue::Bool(a >= b)),
                _ => None,
            }
        }
        _ => {
            let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
                return Ok(None);
            };
            let kind = match (&left, &right) {
                (ConstValue::Int(_, l), ConstValue::Int(_, r)) => wider_int(*l, *r),
                (ConstValue::Int(_, k), _) | (_, ConstValue::Int(_, k)) => *k,
                _ => ScalarKind::Int,
            };
            if matches!(op, Div | Rem) && b == 0 {
                bail!(at location.clone(), "division by zero in a constant expression");
            }
            if matches!(op, Shl | Shr) && !(0..kind.bits() as i128).contains(&b) {
                bail!(at location.clone(), "shift count {} is out of range for '{}'", b, kind);
            }
            // operands and results stay in the kind's range, as they do at run time
            let (a, b) = (wrap_int(a, kind), wrap_int(b, kind));
            let int = |v: i128| Some(ConstValue::Int(wrap_int(v, kind), kind));
            match op {
                Add => int(a.wrapping_add(b)),
                Sub => int(a.wrapping_sub(b)),
                Mul => int(a.wrapping_mul(b)),
                Div => int(a.wrapping_div(b)),
                Rem => int(a.wrapping_rem(b)),
                BitAnd => int(a & b),
                BitOr => int(a | b),
                BitXor => int(a ^ b),
                Shl => int(a.wrapping_shl(b as u32)),
                Shr => int(a >> b),
                Eq => Some(ConstValue::Bool(a == b)),
                Ne => Some(ConstValue::Bool(a != b)),
                Lt => Some(ConstValue::Bool(a < b)),
                Gt => Some(ConstValue::Bool(a > b)),
                Le => Some(ConstValue::Bool(a <= b)),
                Ge => Some(ConstValue::Bool(a >= b)),
                _ => None,
            }
        }
    };
    Ok(value)
}

fn convert_const(value: ConstValue, ty: &Type) -> Option<ConstValue> {
    let kind = ty.scalar_kind()?;
    match kind {
        ScalarKind::Bool => value.truthy().map(ConstValue::Bool),
        kind if kind.is_float() => value.as_float().map(|v| ConstValue::Float(v, kind)),
        kind => {
            let v = match value {
                ConstValue::Float(v, _) => v as i128,
                other => other.as_int()?,
            };
            Some(ConstValue::Int(wrap_int(v, kind), kind))
        }
    }
}

/// Wraps `value` into the range of the integer kind.
pub(crate) fn wrap_int(value: i128, kind: ScalarKind) -> i128 {
    let bits = kind.bits() as u32;
    if bits >= 128 {
        return value;
    }
    let mask = (1i128 << bits) - 1;
    let raw = value & mask;
    if kind.is_signed() && (raw >> (bits - 1)) & 1 == 1 {
        raw - (1i128 << bits)
    } else {
        raw
    }
}
