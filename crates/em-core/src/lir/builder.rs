use super::layout::DataLayout;
use super::*;

/// Emission cursor for one function: owns the function under construction
/// and the block new instructions are appended to.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    function: LirFunction,
    current: BasicBlockId,
    next_value: LirId,
    next_block: BasicBlockId,
    layout: DataLayout,
    /// Instructions placed at the head of the entry block by `entry_slot`.
    entry_prefix: usize,
}

impl FunctionBuilder {
    pub fn new(function: LirFunction, layout: DataLayout) -> Self {
        let mut builder = Self {
            function,
            current: 0,
            next_value: 0,
            next_block: 0,
            layout,
            entry_prefix: 0,
        };
        let entry = builder.create_block("entry");
        builder.current = entry;
        builder
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn signature(&self) -> &LirFunctionSignature {
        &self.function.signature
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn add_local(&mut self, local: LirLocal) {
        self.function.locals.push(local);
    }

    pub fn create_block(&mut self, label: &str) -> BasicBlockId {
        let id = self.next_block;
        self.next_block += 1;
        self.function
            .basic_blocks
            .push(LirBasicBlock::new(id, Some(label.to_string())));
        id
    }

    pub fn current_block(&self) -> BasicBlockId {
        self.current
    }

    pub fn switch_to(&mut self, block: BasicBlockId) {
        self.current = block;
    }

    pub fn is_terminated(&self) -> bool {
        self.function
            .get_basic_block(self.current)
            .is_some_and(|bb| bb.terminator.is_some())
    }

    /// Appends an instruction; a result register is produced when `ty` is a
    /// non-void type. Instructions after a terminator land in a fresh
    /// unreachable block.
    pub fn push(&mut self, kind: LirInstructionKind, ty: Option<LirType>) -> LirValue {
        if self.is_terminated() {
            let dead = self.create_block("dead");
            self.current = dead;
        }
        let id = self.next_value;
        self.next_value += 1;
        let mut inst = LirInstruction::new(id, kind);
        let produces_value = matches!(&ty, Some(t) if *t != LirType::Void);
        if let Some(ty) = ty {
            inst = inst.with_type(ty);
        }
        let current = self.current;
        if let Some(block) = self.function.get_basic_block_mut(current) {
            block.instructions.push(inst);
        }
        if produces_value {
            LirValue::Register(id)
        } else {
            LirValue::Undef(LirType::Void)
        }
    }

    /// Sets the current block's terminator unless it already has one.
    pub fn terminate(&mut self, terminator: LirTerminator) {
        if self.is_terminated() {
            return;
        }
        let current = self.current;
        let successors = terminator.successors();
        if let Some(block) = self.function.get_basic_block_mut(current) {
            block.successors = successors.clone();
            block.terminator = Some(terminator);
        }
        for succ in successors {
            if let Some(block) = self.function.get_basic_block_mut(succ) {
                if !block.predecessors.contains(&current) {
                    block.predecessors.push(current);
                }
            }
        }
    }

    pub fn br(&mut self, target: BasicBlockId) {
        self.terminate(LirTerminator::Br(target));
    }

    pub fn cond_br(&mut self, condition: LirValue, if_true: BasicBlockId, if_false: BasicBlockId) {
        self.terminate(LirTerminator::CondBr {
            condition,
            if_true,
            if_false,
        });
    }

    pub fn ret(&mut self, value: Option<LirValue>) {
        self.terminate(LirTerminator::Return(value));
    }

    pub fn alloca(&mut self, ty: LirType) -> LirValue {
        let alignment = self.layout.align_of(&ty);
        self.push(
            LirInstructionKind::Alloca {
                ty: ty.clone(),
                alignment,
            },
            Some(LirType::ptr(ty)),
        )
    }

    /// Allocates a slot at the head of the entry block and stores `init`
    /// there, so the slot is live on every path through the function.
    pub fn entry_slot(&mut self, ty: LirType, init: LirValue) -> LirValue {
        let alignment = self.layout.align_of(&ty);
        let slot_id = self.next_value;
        let store_id = slot_id + 1;
        self.next_value += 2;
        let slot = LirInstruction::new(
            slot_id,
            LirInstructionKind::Alloca {
                ty: ty.clone(),
                alignment,
            },
        )
        .with_type(LirType::ptr(ty));
        let store = LirInstruction::new(
            store_id,
            LirInstructionKind::Store {
                value: init,
                address: LirValue::Register(slot_id),
                alignment: None,
                volatile: false,
            },
        );
        let at = self.entry_prefix;
        if let Some(entry) = self.function.get_basic_block_mut(0) {
            entry.instructions.insert(at, slot);
            entry.instructions.insert(at + 1, store);
        }
        self.entry_prefix += 2;
        LirValue::Register(slot_id)
    }

    pub fn load(&mut self, address: LirValue, ty: LirType) -> LirValue {
        self.push(
            LirInstructionKind::Load {
                address,
                alignment: None,
                volatile: false,
            },
            Some(ty),
        )
    }

    pub fn store(&mut self, value: LirValue, address: LirValue) {
        self.push(
            LirInstructionKind::Store {
                value,
                address,
                alignment: None,
                volatile: false,
            },
            None,
        );
    }

    /// Address of element `indices` below `ptr`; `element` is the type the
    /// result points to.
    pub fn gep(&mut self, ptr: LirValue, indices: Vec<LirValue>, element: LirType) -> LirValue {
        self.push(
            LirInstructionKind::GetElementPtr {
                ptr,
                indices,
                inbounds: true,
            },
            Some(LirType::ptr(element)),
        )
    }

    /// Address of field `index` of the struct `ptr` points to.
    pub fn field_ptr(&mut self, ptr: LirValue, index: u32, field: LirType) -> LirValue {
        self.gep(ptr, vec![const_i32(0), const_i32(index as i128)], field)
    }

    pub fn bitcast(&mut self, value: LirValue, ty: LirType) -> LirValue {
        self.push(LirInstructionKind::Bitcast(value, ty.clone()), Some(ty))
    }

    pub fn call(
        &mut self,
        function: LirValue,
        args: Vec<LirValue>,
        calling_convention: CallingConvention,
        return_type: LirType,
    ) -> LirValue {
        self.push(
            LirInstructionKind::Call {
                function,
                args,
                calling_convention,
                tail_call: false,
            },
            Some(return_type),
        )
    }

    /// Closes the function. Empty blocks nobody branches to are dropped,
    /// other unreachable open blocks are sealed with `unreachable`.
    pub fn finish(mut self) -> LirFunction {
        self.function.basic_blocks.retain(|bb| {
            bb.id == 0
                || bb.terminator.is_some()
                || !bb.instructions.is_empty()
                || !bb.predecessors.is_empty()
        });
        for bb in &mut self.function.basic_blocks {
            if bb.id != 0 && bb.terminator.is_none() && bb.predecessors.is_empty() {
                bb.terminator = Some(LirTerminator::Unreachable);
            }
        }
        self.function
    }
}

pub fn const_i32(value: i128) -> LirValue {
    LirValue::Constant(LirConstant::Int(value, LirType::I32))
}

pub fn const_int(value: i128, ty: LirType) -> LirValue {
    LirValue::Constant(LirConstant::Int(value, ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FunctionBuilder {
        let signature = LirFunctionSignature {
            params: vec![LirType::I32],
            return_type: LirType::I32,
            is_variadic: false,
        };
        FunctionBuilder::new(
            LirFunction::new("f", signature, CallingConvention::C, Linkage::External),
            DataLayout::default(),
        )
    }

    #[test]
    fn terminate_links_predecessors() {
        let mut b = builder();
        let next = b.create_block("next");
        b.br(next);
        b.switch_to(next);
        b.ret(Some(LirValue::Local(0)));
        let func = b.finish();
        assert_eq!(func.basic_blocks[1].predecessors, vec![0]);
        assert_eq!(func.basic_blocks[0].successors, vec![1]);
    }

    #[test]
    fn code_after_return_goes_to_a_dead_block() {
        let mut b = builder();
        b.ret(Some(LirValue::Local(0)));
        b.alloca(LirType::I32);
        let func = b.finish();
        assert_eq!(func.basic_blocks.len(), 2);
        assert_eq!(
            func.basic_blocks[1].terminator,
            Some(LirTerminator::Unreachable)
        );
    }
    #[test]
    fn entry_slots_lead_the_entry_block() {
        let mut b = builder();
        let first = b.alloca(LirType::I32);
        let later = b.create_block("later");
        b.br(later);
        b.switch_to(later);
        let flag = b.entry_slot(LirType::I1, LirValue::Constant(LirConstant::Bool(false)));
        let func = b.finish();
        let entry = &func.basic_blocks[0].instructions;
        assert_eq!(entry.len(), 3);
        assert_eq!(LirValue::Register(entry[0].id), flag);
        assert!(matches!(entry[1].kind, LirInstructionKind::Store { .. }));
        assert_eq!(LirValue::Register(entry[2].id), first);
        assert!(func.basic_blocks[1].instructions.is_empty());
    }
}
