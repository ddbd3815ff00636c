use em_core::ast::{BinaryOp, NodeId, NodeKind, OperatorTag, UnaryOp};
use em_core::lir::builder::{const_i32, const_int};
use em_core::lir::{LirConstant, LirGlobal, LirInstructionKind, LirType, LirValue, Linkage, Visibility};
use em_core::types::{ConstValue, ScalarKind, Type};
use em_core::{bail, Location, Result};

use super::{Place, Value};
use crate::context::CompilationContext;
use crate::lower::scalar_lir;

impl CompilationContext {
    pub(crate) fn emit_expr(&mut self, id: NodeId) -> Result<Value> {
        let location = self.locate(id);
        match self.ast.kind(id).clone() {
            NodeKind::Int(_)
            | NodeKind::Float(_)
            | NodeKind::Bool(_)
            | NodeKind::Char(_)
            | NodeKind::Null
            | NodeKind::SizeOf(_) => {
                let value = self.fold_required(id, "a literal")?;
                self.const_value(value)
            }
            NodeKind::Str(text) => self.emit_string(&text),
            NodeKind::Ident {
                name,
                template_args,
            } => {
                if !template_args.is_empty() {
                    let key = self.instantiate_function(&name, &template_args, &location)?;
                    return self.function_value(&key);
                }
                self.emit_ident(&name, &location)
            }
            NodeKind::Unary { op, operand } => self.emit_unary(id, op, operand, &location),
            NodeKind::Binary { op, lhs, rhs } => self.emit_binary(op, lhs, rhs, &location),
            NodeKind::Get { .. } => {
                let place = self.emit_place(id)?;
                self.load_place(place, &location)
            }
            NodeKind::Index { base, index } => {
                let base_place = self.place_or_temp(base)?;
                if base_place.ty.is_aggregate() {
                    return self.emit_index_operator(base_place, index, None, &location);
                }
                let place = self.index_place(base_place, index, &location)?;
                self.load_place(place, &location)
            }
            NodeKind::Call { callee, args } => self.emit_call(callee, &args, &location),
            NodeKind::Cast { ty, value } => {
                let ty = self.resolve_type(&ty, &location)?;
                let value = self.emit_expr(value)?;
                self.emit_cast(value, &ty, &location)
            }
            NodeKind::Builtin { name, args } => match self.eval_builtin(id, &name, &args)? {
                Some(value) => self.const_value(value),
                None => Ok(Value::void()),
            },
            NodeKind::AggregateLit { ty, values } => self.emit_aggregate_lit(&ty, &values, &location),
            NodeKind::ArrayLit(values) => self.emit_array_lit(&values, &location),
            _ => bail!(at location, "expected an expression"),
        }
    }

    pub(crate) fn const_value(&mut self, value: ConstValue) -> Result<Value> {
        let ty = value.ty();
        let lir = match value {
            ConstValue::Int(v, kind) => LirConstant::Int(v, scalar_lir(kind)),
            ConstValue::Float(v, kind) => LirConstant::Float(v, scalar_lir(kind)),
            ConstValue::Bool(b) => LirConstant::Bool(b),
            ConstValue::Str(text) => return self.emit_string(&text),
            ConstValue::Null => LirConstant::Null(LirType::ptr(LirType::I8)),
        };
        Ok(Value::new(ty, LirValue::Constant(lir)))
    }

    /// A private constant global holding `text`, addressed as `char*`.
    fn emit_string(&mut self, text: &str) -> Result<Value> {
        let name = format!(".str.{}", self.string_count);
        self.string_count += 1;
        let constant = LirConstant::String(text.to_string());
        let array_ty = constant.ty();
        self.program.add_global(LirGlobal {
            name: name.clone(),
            ty: array_ty.clone(),
            initializer: Some(constant),
            linkage: Linkage::Private,
            visibility: Visibility::Default,
            is_constant: true,
            alignment: None,
        });
        let ptr = self.builder()?.gep(
            LirValue::Global(name, array_ty),
            vec![const_i32(0), const_i32(0)],
            LirType::I8,
        );
        Ok(Value::new(Type::Scalar(ScalarKind::Char).pointer_to(), ptr))
    }

    pub(crate) fn function_value(&mut self, key: &str) -> Result<Value> {
        let Some(symbol) = self.symbols.functions.get(key) else {
            bail!("unknown function '{}'", key);
        };
        Ok(Value::new(
            symbol.fn_type(),
            LirValue::Function(symbol.link_name.clone()),
        ))
    }

    pub(super) fn is_variable(&self, name: &str) -> bool {
        let local = self
            .func
            .as_ref()
            .is_some_and(|func| func.scope.lookup(name).is_some());
        local
            || self
                .candidates(name)
                .iter()
                .any(|candidate| self.symbols.globals.contains_key(candidate))
    }

    fn emit_ident(&mut self, name: &str, location: &Location) -> Result<Value> {
        if self.is_variable(name) {
            let place = self.variable_place(name, location)?;
            return self.load_place(place, location);
        }
        if let Some(value) = self.lookup_const(name) {
            return self.const_value(value);
        }
        if let Some(keys) = self.find_overloads(name) {
            let [key] = keys.as_slice() else {
                bail!(at location.clone(), "reference to overloaded function '{}' is ambiguous", name);
            };
            return self.function_value(key);
        }
        bail!(at location.clone(), "unknown identifier '{}'", name)
    }

    fn variable_place(&mut self, name: &str, location: &Location) -> Result<Place> {
        let state = self.func()?;
        if let Some(var) = state.scope.lookup(name) {
            let place = Place {
                ty: var.ty.clone(),
                ptr: var.slot.clone(),
            };
            state.scope.mark_used(name);
            return Ok(place);
        }
        let global = self
            .candidates(name)
            .into_iter()
            .find_map(|candidate| self.symbols.globals.get(&candidate).cloned());
        let Some(global) = global else {
            bail!(at location.clone(), "unknown variable '{}'", name);
        };
        let lir = self.lower_type(&global.ty, location)?;
        let ty = if global.is_const && !global.ty.is_const() {
            global.ty.constant()
        } else {
            global.ty
        };
        Ok(Place {
            ty,
            ptr: LirValue::Global(global.link_name, lir),
        })
    }

    /// Reads a place. Arrays decay to a pointer to their first element.
    pub(crate) fn load_place(&mut self, place: Place, location: &Location) -> Result<Value> {
        if let Type::Array(elem, _) = place.ty.strip() {
            let elem = elem.as_ref().clone();
            let elem_lir = self.lower_type(&elem, location)?;
            let ptr = self
                .builder()?
                .gep(place.ptr, vec![const_i32(0), const_i32(0)], elem_lir);
            return Ok(Value::new(elem.pointer_to(), ptr));
        }
        let lir = self.lower_type(&place.ty, location)?;
        let value = self.builder()?.load(place.ptr, lir);
        Ok(Value::new(place.ty.strip().clone(), value))
    }

    /// The address an lvalue expression designates.
    pub(crate) fn emit_place(&mut self, id: NodeId) -> Result<Place> {
        let location = self.locate(id);
        match self.ast.kind(id).clone() {
            NodeKind::Ident {
                name,
                template_args,
            } if template_args.is_empty() && self.is_variable(&name) => {
                self.variable_place(&name, &location)
            }
            NodeKind::Get { base, name } => self.member_place(base, &name, &location),
            NodeKind::Index { base, index } => {
                let base_place = self.place_or_temp(base)?;
                if base_place.ty.is_aggregate() {
                    let value = self.emit_index_operator(base_place, index, None, &location)?;
                    return self.materialize(value, &location);
                }
                self.index_place(base_place, index, &location)
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let pointer = self.emit_expr(operand)?;
                match pointer.ty.strip() {
                    Type::Pointer(inner) if !inner.is_void() => Ok(Place {
                        ty: inner.as_ref().clone(),
                        ptr: pointer.value,
                    }),
                    other => bail!(at location, "cannot dereference '{}'", other),
                }
            }
            _ => bail!(at location, "expression is not assignable"),
        }
    }

    pub(super) fn is_place_expr(&self, id: NodeId) -> bool {
        match self.ast.kind(id) {
            NodeKind::Ident {
                name,
                template_args,
            } => template_args.is_empty() && self.is_variable(name),
            NodeKind::Get { .. } | NodeKind::Index { .. } => true,
            NodeKind::Unary { op, .. } => *op == UnaryOp::Deref,
            _ => false,
        }
    }

    /// A place for `id`; rvalues are spilled to a temporary.
    pub(crate) fn place_or_temp(&mut self, id: NodeId) -> Result<Place> {
        if self.is_place_expr(id) {
            return self.emit_place(id);
        }
        let location = self.locate(id);
        let value = self.emit_expr(id)?;
        self.materialize(value, &location)
    }

    pub(crate) fn materialize(&mut self, value: Value, location: &Location) -> Result<Place> {
        let lir = self.lower_type(&value.ty, location)?;
        let builder = self.builder()?;
        let slot = builder.alloca(lir);
        builder.store(value.value, slot.clone());
        Ok(Place {
            ty: value.ty,
            ptr: slot,
        })
    }

    /// The aggregate a member access targets and a pointer to it.
    pub(crate) fn member_base(&mut self, base: NodeId, location: &Location) -> Result<(String, LirValue)> {
        let place = self.place_or_temp(base)?;
        match place.ty.strip().clone() {
            Type::Pointer(inner) if inner.is_aggregate() => {
                let ptr_ty = self.lower_type(&place.ty, location)?;
                let ptr = self.builder()?.load(place.ptr, ptr_ty);
                Ok((inner.canonical(), ptr))
            }
            agg @ Type::Aggregate { .. } => Ok((agg.canonical(), place.ptr)),
            other => bail!(at location.clone(), "'{}' has no members", other),
        }
    }

    fn member_place(&mut self, base: NodeId, name: &str, location: &Location) -> Result<Place> {
        let (owner, ptr) = self.member_base(base, location)?;
        let Some(field) = self.symbols.field(&owner, name).cloned() else {
            if !self.symbols.methods(&owner, name).is_empty() {
                bail!(at location.clone(), "method '{}' of '{}' must be called", name, owner);
            }
            bail!(at location.clone(), "no such member '{}' in '{}'", name, owner);
        };
        let field_lir = self.lower_type(&field.ty, location)?;
        let ptr = self.builder()?.field_ptr(ptr, field.index, field_lir);
        Ok(Place { ty: field.ty, ptr })
    }

    fn index_place(&mut self, base: Place, index: NodeId, location: &Location) -> Result<Place> {
        let index_value = self.emit_expr(index)?;
        self.element_place(base, index_value, location)
    }

    /// Element `index_value` of the array or pointer stored at `base`.
    pub(crate) fn element_place(
        &mut self,
        base: Place,
        index_value: Value,
        location: &Location,
    ) -> Result<Place> {
        if !index_value.ty.is_integer() {
            bail!(at location.clone(), "index must be an integer, got '{}'", index_value.ty);
        }
        let index_value = self.emit_cast(index_value, &Type::Scalar(ScalarKind::Long), location)?;
        match base.ty.strip().clone() {
            Type::Array(elem, _) => {
                let elem_lir = self.lower_type(&elem, location)?;
                let ptr = self.builder()?.gep(
                    base.ptr,
                    vec![const_int(0, LirType::I64), index_value.value],
                    elem_lir,
                );
                Ok(Place { ty: *elem, ptr })
            }
            Type::Pointer(elem) if !elem.is_void() => {
                let ptr_ty = self.lower_type(&base.ty, location)?;
                let elem_lir = self.lower_type(&elem, location)?;
                let builder = self.builder()?;
                let pointer = builder.load(base.ptr, ptr_ty);
                let ptr = builder.gep(pointer, vec![index_value.value], elem_lir);
                Ok(Place { ty: *elem, ptr })
            }
            other => bail!(at location.clone(), "cannot index '{}'", other),
        }
    }

    /// `base[index]` through the aggregate's `[]` operator, or `[]=` when
    /// a value is stored.
    fn emit_index_operator(
        &mut self,
        base: Place,
        index: NodeId,
        stored: Option<Value>,
        location: &Location,
    ) -> Result<Value> {
        let owner = base.ty.canonical();
        let base_value = self.load_place(base, location)?;
        let index_value = self.emit_expr(index)?;
        let (tag, operands) = match stored {
            Some(value) => (OperatorTag::IndexAssign, vec![base_value, index_value, value]),
            None => (OperatorTag::Index, vec![base_value, index_value]),
        };
        self.emit_operator_call(&owner, tag, operands, location)
    }

    fn emit_unary(
        &mut self,
        id: NodeId,
        op: UnaryOp,
        operand: NodeId,
        location: &Location,
    ) -> Result<Value> {
        match op {
            UnaryOp::Deref => {
                let place = self.emit_place(id)?;
                self.load_place(place, location)
            }
            UnaryOp::AddrOf => {
                if let NodeKind::Ident { name, .. } = self.ast.kind(operand) {
                    if !self.is_variable(name) {
                        // `&f` of a function is the function itself
                        return self.emit_expr(operand);
                    }
                }
                let place = self.emit_place(operand)?;
                Ok(Value::new(place.ty.strip().clone().pointer_to(), place.ptr))
            }
            UnaryOp::Not => {
                let condition = self.emit_condition(operand)?;
                let value = self
                    .builder()?
                    .push(LirInstructionKind::Not(condition), Some(LirType::I1));
                Ok(Value::new(Type::bool(), value))
            }
            UnaryOp::Neg | UnaryOp::BitNot => {
                let value = self.emit_expr(operand)?;
                let ty = value.ty.strip().clone();
                let valid = match op {
                    UnaryOp::Neg => ty.is_integer() || ty.is_float(),
                    _ => ty.is_integer(),
                };
                if !valid {
                    bail!(at location.clone(), "invalid operand to '{}': '{}'", op, ty);
                }
                let lir = self.lower_type(&ty, location)?;
                let kind = match op {
                    UnaryOp::Neg => LirInstructionKind::Neg(value.value),
                    _ => LirInstructionKind::Not(value.value),
                };
                let result = self.builder()?.push(kind, Some(lir));
                Ok(Value::new(ty, result))
            }
        }
    }

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        location: &Location,
    ) -> Result<Value> {
        if op.is_assignment() {
            return self.emit_assign(op, lhs, rhs, location);
        }
        if op.is_logical() {
            return self.emit_logical(op, lhs, rhs);
        }
        let left = self.emit_expr(lhs)?;
        let right = self.emit_expr(rhs)?;
        self.emit_operation(op, left, right, location)
    }

    /// A binary operation on two values: operator overloads for aggregate
    /// operands, arithmetic otherwise.
    pub(crate) fn emit_operation(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        location: &Location,
    ) -> Result<Value> {
        if left.ty.is_aggregate() {
            let Some(tag) = op.overload_tag() else {
                bail!(at location.clone(), "operator '{}' cannot be overloaded", op);
            };
            let owner = left.ty.canonical();
            return self.emit_operator_call(&owner, tag, vec![left, right], location);
        }
        if right.ty.is_aggregate() {
            bail!(
                at location.clone(),
                "invalid operands to '{}': '{}' and '{}'",
                op,
                left.ty,
                right.ty
            );
        }
        self.emit_arith(op, left, right, location)
    }

    fn emit_assign(
        &mut self,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
        location: &Location,
    ) -> Result<Value> {
        if let NodeKind::Index { base, index } = self.ast.kind(lhs).clone() {
            let base_place = self.place_or_temp(base)?;
            if base_place.ty.is_aggregate() && op == BinaryOp::Assign {
                let value = self.emit_expr(rhs)?;
                return self.emit_index_operator(base_place, index, Some(value), location);
            }
            let place = self.index_place(base_place, index, location)?;
            return self.store_assignment(op, place, rhs, location);
        }
        let place = self.emit_place(lhs)?;
        self.store_assignment(op, place, rhs, location)
    }

    fn store_assignment(
        &mut self,
        op: BinaryOp,
        place: Place,
        rhs: NodeId,
        location: &Location,
    ) -> Result<Value> {
        if place.ty.is_const() {
            bail!(at location.clone(), "cannot assign to a constant of type '{}'", place.ty);
        }
        let value = match op.compound_base() {
            Some(base_op) => {
                let current = self.load_place(place.clone(), location)?;
                let right = self.emit_expr(rhs)?;
                self.emit_operation(base_op, current, right, location)?
            }
            None => self.emit_expr(rhs)?,
        };
        let target = place.ty.strip().clone();
        let value = self.coerce(value, &target, location)?;
        self.builder()?.store(value.value.clone(), place.ptr);
        Ok(value)
    }

    /// `&&` and `||` evaluate the right side only when needed.
    fn emit_logical(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> Result<Value> {
        let left = self.emit_condition(lhs)?;
        let builder = self.builder()?;
        let result = builder.alloca(LirType::I1);
        builder.store(left.clone(), result.clone());
        let rhs_bb = builder.create_block("logic.rhs");
        let end_bb = builder.create_block("logic.end");
        if op == BinaryOp::And {
            builder.cond_br(left, rhs_bb, end_bb);
        } else {
            builder.cond_br(left, end_bb, rhs_bb);
        }
        builder.switch_to(rhs_bb);
        let right = self.emit_condition(rhs)?;
        let builder = self.builder()?;
        builder.store(right, result.clone());
        builder.br(end_bb);
        builder.switch_to(end_bb);
        let value = builder.load(result, LirType::I1);
        Ok(Value::new(Type::bool(), value))
    }

    /// Evaluates `id` as an `i1` truth value.
    pub(crate) fn emit_condition(&mut self, id: NodeId) -> Result<LirValue> {
        let location = self.locate(id);
        let value = self.emit_expr(id)?;
        self.truth_value(value, &location)
    }

    fn emit_aggregate_lit(&mut self, ty: &Type, values: &[NodeId], location: &Location) -> Result<Value> {
        let ty = self.resolve_type(ty, location)?;
        let Some(name) = ty.aggregate_name() else {
            bail!(at location.clone(), "'{}' is not an aggregate", ty);
        };
        self.ensure_aggregate_checked(&name, location)?;
        let Some(fields) = self.symbols.aggregate(&name).map(|a| a.fields.clone()) else {
            bail!(at location.clone(), "unknown aggregate '{}'", name);
        };
        if values.len() > fields.len() {
            bail!(
                at location.clone(),
                "'{}' has {} fields, got {} values",
                name,
                fields.len(),
                values.len()
            );
        }
        let lir = self.lower_type(&ty, location)?;
        let slot = self.builder()?.alloca(lir.clone());
        if values.len() < fields.len() {
            // trailing fields without a value start zeroed
            let zero = LirValue::Constant(LirConstant::ZeroInitializer(lir.clone()));
            self.builder()?.store(zero, slot.clone());
        }
        for (field, &node) in fields.iter().zip(values) {
            let value = self.emit_expr(node)?;
            let value = self.coerce(value, &field.ty, location)?;
            let field_lir = self.lower_type(&field.ty, location)?;
            let builder = self.builder()?;
            let ptr = builder.field_ptr(slot.clone(), field.index, field_lir);
            builder.store(value.value, ptr);
        }
        if values.len() < fields.len() {
            self.apply_field_defaults(&ty, slot.clone(), values.len(), location)?;
        }
        let value = self.builder()?.load(slot, lir);
        Ok(Value::new(ty.strip().clone(), value))
    }

    /// `[a, b, c]` is a `T[3]` where `T` is the type of `a`; the other
    /// elements convert to it.
    fn emit_array_lit(&mut self, values: &[NodeId], location: &Location) -> Result<Value> {
        let Some(&first) = values.first() else {
            bail!(at location.clone(), "an array literal needs at least one element");
        };
        let mut head = Some(self.emit_expr(first)?);
        let elem = head.as_ref().map(|value| value.ty.strip().clone()).unwrap_or(Type::Void);
        if elem.is_void() {
            bail!(at location.clone(), "array elements cannot be void");
        }
        let ty = elem.clone().array_of(values.len() as u64);
        let lir = self.lower_type(&ty, location)?;
        let elem_lir = self.lower_type(&elem, location)?;
        let slot = self.builder()?.alloca(lir.clone());
        for (index, &node) in values.iter().enumerate() {
            let value = match head.take() {
                Some(value) => value,
                None => self.emit_expr(node)?,
            };
            let value = self.coerce(value, &elem, location)?;
            let builder = self.builder()?;
            let indices = vec![const_int(0, LirType::I64), const_int(index as i128, LirType::I64)];
            let ptr = builder.gep(slot.clone(), indices, elem_lir.clone());
            builder.store(value.value, ptr);
        }
        let value = self.builder()?.load(slot, lir);
        Ok(Value::new(ty, value))
    }
}
