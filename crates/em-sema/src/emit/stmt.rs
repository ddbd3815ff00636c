use std::mem;

use em_core::ast::{BinaryOp, NodeId, NodeKind, SwitchCase, VariableDecl, DESTRUCTOR};
use em_core::lir::{LirConstant, LirType, LirValue};
use em_core::types::{ArrayLen, ConstValue, ScalarKind, Type};
use em_core::{bail, Location, Result};

use super::call::Arg;
use super::Value;
use crate::context::CompilationContext;
use crate::scope::{LocalVar, LoopTargets};

impl CompilationContext {
    pub(crate) fn emit_stmt(&mut self, id: NodeId) -> Result<()> {
        let location = self.locate(id);
        match self.ast.kind(id).clone() {
            NodeKind::Block(items) => self.emit_block(&items, &location),
            NodeKind::Var(decl) => self.emit_local(id, decl, &location),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => self.emit_if(cond, then, otherwise),
            NodeKind::While { cond, body } => self.emit_while(cond, body),
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => self.emit_for(init, cond, step, body),
            NodeKind::Foreach {
                name,
                data,
                length,
                body,
            } => self.emit_foreach(id, &name, data, length, body, &location),
            NodeKind::Switch {
                value,
                cases,
                default,
            } => self.emit_switch(value, &cases, default, &location),
            NodeKind::Defer(stmt) => self.emit_defer(stmt, &location),
            NodeKind::Destroy(value) => self.emit_destroy(value, &location),
            NodeKind::Break | NodeKind::Continue => {
                let is_break = matches!(self.ast.kind(id), NodeKind::Break);
                let state = self.func()?;
                let Some(targets) = state.loops.last().copied() else {
                    let word = if is_break { "break" } else { "continue" };
                    bail!(at location, "'{}' outside of a loop", word);
                };
                let target = if is_break {
                    targets.break_to
                } else {
                    targets.continue_to
                };
                state.builder.br(target);
                Ok(())
            }
            NodeKind::Return(value) => self.emit_return(value, &location),
            NodeKind::ComptimeIf {
                cond,
                then,
                otherwise,
            } => match self.comptime_branch(cond, then, otherwise)? {
                Some(branch) => self.emit_stmt(branch),
                None => Ok(()),
            },
            NodeKind::Builtin { name, args } => self.eval_builtin(id, &name, &args).map(drop),
            NodeKind::Alias(decl) => {
                let entry = self.alias_entry(&decl.target, &location)?;
                if !self.func()?.scope.declare_alias(&decl.name, entry) {
                    bail!(at location, "an alias named '{}' already exists in this scope", decl.name);
                }
                Ok(())
            }
            NodeKind::Function(_) | NodeKind::Aggregate(_) | NodeKind::Namespace { .. } => {
                bail!(at location, "declarations are not allowed inside function bodies")
            }
            _ => self.emit_expr(id).map(drop),
        }
    }

    fn emit_block(&mut self, items: &[NodeId], location: &Location) -> Result<()> {
        if self.nesting_depth >= self.options.max_nesting_depth {
            bail!(at location.clone(), "blocks are nested too deeply");
        }
        self.nesting_depth += 1;
        self.func()?.scope.push();
        for &item in items {
            // nothing after a terminator is reachable
            if self.builder()?.is_terminated() {
                break;
            }
            self.emit_stmt(item)?;
        }
        let unused = self.func()?.scope.pop();
        self.report_unused(unused);
        self.nesting_depth -= 1;
        Ok(())
    }

    fn emit_local(&mut self, id: NodeId, decl: VariableDecl, location: &Location) -> Result<()> {
        let init = match decl.init {
            Some(init) => Some(self.emit_expr(init)?),
            None => None,
        };
        let ty = match (&decl.ty, &init) {
            (Some(ty), _) => self.resolve_type(ty, location)?,
            (None, Some(value)) => value.ty.strip().clone(),
            (None, None) => bail!(at location.clone(), "cannot infer the type of '{}'", decl.name),
        };
        if ty.is_void() {
            bail!(at location.clone(), "variable '{}' cannot have type void", decl.name);
        }
        if decl.is_const && init.is_none() {
            bail!(at location.clone(), "constant '{}' needs an initializer", decl.name);
        }
        let ty = if decl.is_const && !ty.is_const() {
            ty.constant()
        } else {
            ty
        };
        let slot = match &init {
            None if self.needs_defaults(&ty, location)? => self.default_slot(&ty, location)?,
            _ => {
                let lir = self.lower_type(&ty, location)?;
                self.builder()?.alloca(lir)
            }
        };
        if let Some(value) = init {
            let value = self.coerce(value, &ty, location)?;
            self.builder()?.store(value.value, slot.clone());
        }
        let span = self.ast.span(id);
        let declared = self.func()?.scope.declare(LocalVar {
            name: decl.name.clone(),
            ty,
            slot,
            span,
            param_index: None,
            used: false,
        });
        if !declared {
            bail!(at location.clone(), "variable '{}' is already declared in this scope", decl.name);
        }
        Ok(())
    }

    fn emit_if(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) -> Result<()> {
        let condition = self.emit_condition(cond)?;
        let builder = self.builder()?;
        let then_bb = builder.create_block("if.then");
        let else_bb = otherwise.map(|_| builder.create_block("if.else"));
        let end_bb = builder.create_block("if.end");
        builder.cond_br(condition, then_bb, else_bb.unwrap_or(end_bb));

        self.builder()?.switch_to(then_bb);
        self.emit_stmt(then)?;
        self.builder()?.br(end_bb);

        if let (Some(else_bb), Some(otherwise)) = (else_bb, otherwise) {
            self.builder()?.switch_to(else_bb);
            self.emit_stmt(otherwise)?;
            self.builder()?.br(end_bb);
        }
        self.builder()?.switch_to(end_bb);
        Ok(())
    }

    fn emit_while(&mut self, cond: NodeId, body: NodeId) -> Result<()> {
        let builder = self.builder()?;
        let cond_bb = builder.create_block("while.cond");
        let body_bb = builder.create_block("while.body");
        let end_bb = builder.create_block("while.end");
        builder.br(cond_bb);
        builder.switch_to(cond_bb);

        let condition = self.emit_condition(cond)?;
        self.builder()?.cond_br(condition, body_bb, end_bb);
        self.builder()?.switch_to(body_bb);
        self.emit_loop_body(body, end_bb, cond_bb)?;
        self.builder()?.br(cond_bb);
        self.builder()?.switch_to(end_bb);
        Ok(())
    }

    fn emit_for(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    ) -> Result<()> {
        self.func()?.scope.push();
        if let Some(init) = init {
            self.emit_stmt(init)?;
        }
        let builder = self.builder()?;
        let cond_bb = builder.create_block("for.cond");
        let body_bb = builder.create_block("for.body");
        let step_bb = builder.create_block("for.step");
        let end_bb = builder.create_block("for.end");
        builder.br(cond_bb);
        builder.switch_to(cond_bb);

        match cond {
            Some(cond) => {
                let condition = self.emit_condition(cond)?;
                self.builder()?.cond_br(condition, body_bb, end_bb);
            }
            None => self.builder()?.br(body_bb),
        }
        self.builder()?.switch_to(body_bb);
        self.emit_loop_body(body, end_bb, step_bb)?;
        self.builder()?.br(step_bb);
        self.builder()?.switch_to(step_bb);
        if let Some(step) = step {
            self.emit_expr(step)?;
        }
        self.builder()?.br(cond_bb);
        self.builder()?.switch_to(end_bb);
        let unused = self.func()?.scope.pop();
        self.report_unused(unused);
        Ok(())
    }

    fn emit_loop_body(
        &mut self,
        body: NodeId,
        break_to: u32,
        continue_to: u32,
    ) -> Result<()> {
        self.func()?.loops.push(LoopTargets {
            break_to,
            continue_to,
        });
        let result = self.emit_stmt(body);
        self.func()?.loops.pop();
        result
    }

    fn emit_return(&mut self, value: Option<NodeId>, location: &Location) -> Result<()> {
        let state = self.func()?;
        if state.in_defer {
            bail!(at location.clone(), "'return' is not allowed in a deferred statement");
        }
        let (ret, slot, exit) = (state.ret.clone(), state.ret_slot.clone(), state.exit);
        if state.constructor {
            if value.is_some() {
                bail!(at location.clone(), "a constructor cannot return a value");
            }
            state.builder.br(exit);
            return Ok(());
        }
        match (value, slot) {
            (Some(value), Some(slot)) => {
                let value = self.emit_expr(value)?;
                let value = self.coerce(value, &ret, location)?;
                self.builder()?.store(value.value, slot);
            }
            (Some(_), None) => bail!(at location.clone(), "a void function cannot return a value"),
            (None, Some(_)) => {
                bail!(at location.clone(), "function must return a value of type '{}'", ret)
            }
            (None, None) => {}
        }
        self.builder()?.br(exit);
        Ok(())
    }

    /// Compares the value against each case in order; the first equal one
    /// runs and control leaves the switch.
    fn emit_switch(
        &mut self,
        value: NodeId,
        cases: &[SwitchCase],
        default: Option<NodeId>,
        location: &Location,
    ) -> Result<()> {
        if cases.is_empty() {
            bail!(at location.clone(), "at least 1 case is required in 'switch'");
        }
        let scrutinee = self.emit_expr(value)?;
        let end_bb = self.builder()?.create_block("switch.end");
        for case in cases {
            let case_location = self.locate(case.value);
            let candidate = self.emit_expr(case.value)?;
            let equal = self.emit_operation(BinaryOp::Eq, scrutinee.clone(), candidate, &case_location)?;
            let condition = self.truth_value(equal, &case_location)?;
            let builder = self.builder()?;
            let body_bb = builder.create_block("switch.case");
            let next_bb = builder.create_block("switch.next");
            builder.cond_br(condition, body_bb, next_bb);
            builder.switch_to(body_bb);
            self.emit_stmt(case.body)?;
            let builder = self.builder()?;
            builder.br(end_bb);
            builder.switch_to(next_bb);
        }
        if let Some(default) = default {
            self.emit_stmt(default)?;
        }
        let builder = self.builder()?;
        builder.br(end_bb);
        builder.switch_to(end_bb);
        Ok(())
    }

    /// Binds `name` to a copy of each element in turn. Arrays know their
    /// length; pointers need an explicit one.
    fn emit_foreach(
        &mut self,
        id: NodeId,
        name: &str,
        data: NodeId,
        length: Option<NodeId>,
        body: NodeId,
        location: &Location,
    ) -> Result<()> {
        let long = Type::Scalar(ScalarKind::Long);
        let place = self.place_or_temp(data)?;
        let count = match (place.ty.strip(), length) {
            (Type::Array(..) | Type::Pointer(_), Some(length)) => {
                let value = self.emit_expr(length)?;
                if !value.ty.is_integer() {
                    bail!(at location.clone(), "'foreach' length must be an integer, got '{}'", value.ty);
                }
                self.emit_cast(value, &long, location)?
            }
            (Type::Array(_, ArrayLen::Fixed(len)), None) => {
                self.const_value(ConstValue::Int(*len as i128, ScalarKind::Long))?
            }
            (Type::Pointer(_), None) => {
                bail!(at location.clone(), "'foreach' over '{}' needs a length", place.ty)
            }
            (other, _) => bail!(at location.clone(), "cannot iterate over '{}'", other),
        };

        let zero = self.const_value(ConstValue::Int(0, ScalarKind::Long))?;
        let counter = self.materialize(zero, location)?;
        let builder = self.builder()?;
        let cond_bb = builder.create_block("foreach.cond");
        let body_bb = builder.create_block("foreach.body");
        let step_bb = builder.create_block("foreach.step");
        let end_bb = builder.create_block("foreach.end");
        builder.br(cond_bb);
        builder.switch_to(cond_bb);

        let current = self.load_place(counter.clone(), location)?;
        let more = self.emit_operation(BinaryOp::Lt, current, count, location)?;
        let condition = self.truth_value(more, location)?;
        self.builder()?.cond_br(condition, body_bb, end_bb);
        self.builder()?.switch_to(body_bb);

        self.func()?.scope.push();
        let index = self.load_place(counter.clone(), location)?;
        let element = self.element_place(place, index, location)?;
        let ty = element.ty.strip().clone();
        let value = self.load_place(element, location)?;
        let slot = self.materialize(Value::new(ty.clone(), value.value), location)?;
        let span = self.ast.span(id);
        self.func()?.scope.declare(LocalVar {
            name: name.to_string(),
            ty,
            slot: slot.ptr,
            span,
            param_index: None,
            used: false,
        });
        self.emit_loop_body(body, end_bb, step_bb)?;
        let unused = self.func()?.scope.pop();
        self.report_unused(unused);

        let builder = self.builder()?;
        builder.br(step_bb);
        builder.switch_to(step_bb);
        let current = self.load_place(counter.clone(), location)?;
        let one = self.const_value(ConstValue::Int(1, ScalarKind::Long))?;
        let next = self.emit_operation(BinaryOp::Add, current, one, location)?;
        let builder = self.builder()?;
        builder.store(next.value, counter.ptr);
        builder.br(cond_bb);
        builder.switch_to(end_bb);
        Ok(())
    }

    /// Appends `stmt` to the exit path behind a flag set here, so it runs
    /// on return only when this point was reached. Deferred statements run
    /// in the order they appear.
    fn emit_defer(&mut self, stmt: NodeId, location: &Location) -> Result<()> {
        let state = self.func()?;
        if state.in_defer {
            bail!(at location.clone(), "'defer' cannot appear in a deferred statement");
        }
        let builder = &mut state.builder;
        let flag = builder.entry_slot(LirType::I1, LirValue::Constant(LirConstant::Bool(false)));
        builder.store(LirValue::Constant(LirConstant::Bool(true)), flag.clone());
        let resume = builder.current_block();
        let run_bb = builder.create_block("defer.run");
        let next_bb = builder.create_block("defer.next");
        builder.switch_to(state.exit_tail);
        let reached = builder.load(flag, LirType::I1);
        builder.cond_br(reached, run_bb, next_bb);
        builder.switch_to(run_bb);
        state.exit_tail = next_bb;
        state.in_defer = true;
        let loops = mem::take(&mut state.loops);

        let result = self.emit_stmt(stmt);

        let state = self.func()?;
        state.loops = loops;
        state.in_defer = false;
        result?;
        state.builder.br(next_bb);
        state.builder.switch_to(resume);
        Ok(())
    }

    /// `~value` calls the destructor of the aggregate `value` holds or
    /// points to; aggregates without one are left alone.
    fn emit_destroy(&mut self, value: NodeId, location: &Location) -> Result<()> {
        let (owner, this) = self.member_base(value, location)?;
        let Some(key) = self.symbols.methods(&owner, DESTRUCTOR).first().cloned() else {
            return Ok(());
        };
        let this = Arg {
            value: Value::new(Type::named(&owner).pointer_to(), this),
            place: None,
        };
        self.call_function(&key, vec![this], location).map(drop)
    }
}
