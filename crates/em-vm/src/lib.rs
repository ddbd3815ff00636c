//! Interpreter for LIR programs over a flat byte memory. Values cross
//! memory in the same layout the native backend uses, so lowered calling
//! conventions can be exercised without a code generator.

use std::collections::HashMap;

use em_core::lir::layout::{align_to, DataLayout};
use em_core::lir::{
    LirConstant, LirFunction, LirInstruction, LirInstructionKind, LirProgram, LirTerminator,
    LirType, LirValue,
};
use thiserror::Error;
use tracing::trace;

/// Addresses below this are never handed out; 0 is null.
const MEMORY_BASE: u64 = 16;
const MEMORY_LIMIT: usize = 64 << 20;
/// Function values are addresses in a range memory never reaches.
const FUNCTION_BASE: u64 = 1 << 40;
const MAX_CALL_DEPTH: usize = 512;
const MAX_STEPS: u64 = 50_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum VmValue {
    Void,
    /// Two's-complement bits, masked to `bits`.
    Int { value: u128, bits: u32 },
    Float(f64),
    Ptr(u64),
    /// Struct, array and vector values.
    Aggregate(Vec<VmValue>),
}

impl VmValue {
    pub fn int(value: i128, bits: u32) -> Self {
        VmValue::Int {
            value: mask(value as u128, bits),
            bits,
        }
    }

    pub fn bool(value: bool) -> Self {
        VmValue::Int {
            value: value as u128,
            bits: 1,
        }
    }

    /// Sign-extended integer value.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            VmValue::Int { value, bits } => Some(sign_extend(*value, *bits)),
            _ => None,
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            VmValue::Int { value, .. } => Some(*value),
            VmValue::Ptr(addr) => Some(*addr as u128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VmValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("vm error: {message}")]
    Runtime { message: String },
    #[error("unsupported lir: {message}")]
    Unsupported { message: String },
}

fn runtime(message: impl Into<String>) -> VmError {
    VmError::Runtime {
        message: message.into(),
    }
}

fn unsupported(message: impl Into<String>) -> VmError {
    VmError::Unsupported {
        message: message.into(),
    }
}

fn mask(value: u128, bits: u32) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}

fn sign_extend(value: u128, bits: u32) -> i128 {
    if bits == 0 || bits >= 128 {
        return value as i128;
    }
    let shift = 128 - bits;
    ((value << shift) as i128) >> shift
}

fn int_bits(ty: &LirType) -> Option<u32> {
    Some(match ty {
        LirType::I1 => 1,
        LirType::I8 => 8,
        LirType::I16 => 16,
        LirType::I32 => 32,
        LirType::I64 => 64,
        LirType::I128 => 128,
        _ => return None,
    })
}

fn round_float(value: f64, ty: &LirType) -> f64 {
    match ty {
        LirType::F32 => value as f32 as f64,
        _ => value,
    }
}

/// Registers of one activation and the types they were produced with.
struct Frame<'p> {
    function: &'p LirFunction,
    args: Vec<VmValue>,
    registers: HashMap<u32, VmValue>,
    types: HashMap<u32, LirType>,
}

pub struct Vm<'p> {
    program: &'p LirProgram,
    layout: DataLayout,
    memory: Vec<u8>,
    globals: HashMap<String, u64>,
    function_names: Vec<String>,
    depth: usize,
    steps: u64,
}

impl<'p> Vm<'p> {
    /// Loads `program`'s globals into memory.
    pub fn new(program: &'p LirProgram) -> Result<Self, VmError> {
        let mut vm = Self {
            program,
            layout: DataLayout::default(),
            memory: vec![0; MEMORY_BASE as usize],
            globals: HashMap::new(),
            function_names: program.functions.iter().map(|f| f.name.clone()).collect(),
            depth: 0,
            steps: 0,
        };
        for global in &program.globals {
            let addr = vm.alloc(vm.layout.size_of(&global.ty), vm.layout.align_of(&global.ty))?;
            vm.globals.insert(global.name.clone(), addr);
        }
        for global in &program.globals {
            let value = match &global.initializer {
                Some(init) => const_value(init)?,
                None => zero_value(&global.ty),
            };
            vm.store(vm.globals[&global.name], &value, &global.ty)?;
        }
        Ok(vm)
    }

    /// Address of a global, for inspecting memory after a run.
    pub fn global_address(&self, name: &str) -> Option<u64> {
        self.globals.get(name).copied()
    }

    pub fn read_global(&self, name: &str) -> Result<VmValue, VmError> {
        let global = self
            .program
            .global(name)
            .ok_or_else(|| runtime(format!("missing global {}", name)))?;
        self.load(self.globals[name], &global.ty)
    }

    pub fn run_function(&mut self, name: &str, args: Vec<VmValue>) -> Result<VmValue, VmError> {
        let program = self.program;
        let function = program
            .function(name)
            .ok_or_else(|| runtime(format!("missing function {}", name)))?;
        if function.is_declaration() {
            return Err(unsupported(format!("external function {}", name)));
        }
        let expected = function.signature.params.len();
        let variadic = function.signature.is_variadic;
        if args.len() < expected || (args.len() > expected && !variadic) {
            return Err(runtime(format!(
                "function {} expects {} args but got {}",
                name,
                expected,
                args.len()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(runtime(format!("call depth exceeded in {}", name)));
        }
        trace!("vm: enter {}", name);

        let stack_mark = self.memory.len();
        self.depth += 1;
        let mut frame = Frame {
            function,
            args,
            registers: HashMap::new(),
            types: HashMap::new(),
        };
        let result = self.execute(&mut frame);
        self.depth -= 1;
        self.memory.truncate(stack_mark);
        result
    }

    fn execute(&mut self, frame: &mut Frame<'p>) -> Result<VmValue, VmError> {
        let function = frame.function;
        let mut current = function
            .basic_blocks
            .first()
            .map(|bb| bb.id)
            .ok_or_else(|| runtime(format!("function {} has no blocks", function.name)))?;
        loop {
            let block = function
                .get_basic_block(current)
                .ok_or_else(|| runtime(format!("missing block {}", current)))?;
            for inst in &block.instructions {
                self.steps += 1;
                if self.steps > MAX_STEPS {
                    return Err(runtime("step limit exceeded"));
                }
                self.exec_instr(frame, inst)?;
            }
            match &block.terminator {
                Some(LirTerminator::Return(value)) => {
                    return match value {
                        Some(value) => self.eval(frame, value),
                        None => Ok(VmValue::Void),
                    };
                }
                Some(LirTerminator::Br(target)) => current = *target,
                Some(LirTerminator::CondBr {
                    condition,
                    if_true,
                    if_false,
                }) => {
                    let cond = self.eval(frame, condition)?;
                    current = if cond.as_u128().unwrap_or(0) != 0 {
                        *if_true
                    } else {
                        *if_false
                    };
                }
                Some(LirTerminator::Unreachable) => return Err(runtime("unreachable")),
                None => return Err(runtime(format!("block {} is not terminated", current))),
            }
        }
    }

    fn exec_instr(&mut self, frame: &mut Frame<'p>, inst: &LirInstruction) -> Result<(), VmError> {
        use LirInstructionKind as K;
        let hint = inst.type_hint.clone().unwrap_or(LirType::Void);
        let value = match &inst.kind {
            K::Add(a, b)
            | K::Sub(a, b)
            | K::Mul(a, b)
            | K::Div(a, b)
            | K::UDiv(a, b)
            | K::Rem(a, b)
            | K::URem(a, b)
            | K::And(a, b)
            | K::Or(a, b)
            | K::Xor(a, b)
            | K::Shl(a, b)
            | K::Shr(a, b)
            | K::LShr(a, b) => {
                let a = self.eval(frame, a)?;
                let b = self.eval(frame, b)?;
                arith(&inst.kind, a, b, &hint)?
            }
            K::Eq(a, b)
            | K::Ne(a, b)
            | K::Lt(a, b)
            | K::Le(a, b)
            | K::Gt(a, b)
            | K::Ge(a, b)
            | K::ULt(a, b)
            | K::ULe(a, b)
            | K::UGt(a, b)
            | K::UGe(a, b) => {
                let a = self.eval(frame, a)?;
                let b = self.eval(frame, b)?;
                compare(&inst.kind, a, b)?
            }
            K::Neg(v) => match self.eval(frame, v)? {
                VmValue::Int { value, bits } => VmValue::int(-sign_extend(value, bits), bits),
                VmValue::Float(f) => VmValue::Float(-f),
                other => return Err(runtime(format!("cannot negate {:?}", other))),
            },
            K::Not(v) => match self.eval(frame, v)? {
                VmValue::Int { value, bits } => VmValue::Int {
                    value: mask(!value, bits),
                    bits,
                },
                other => return Err(runtime(format!("cannot invert {:?}", other))),
            },
            K::Load { address, .. } => {
                let addr = self.eval_ptr(frame, address)?;
                self.load(addr, &hint)?
            }
            K::Store { value, address, .. } => {
                let ty = self.type_of(frame, value)?;
                let value = self.eval(frame, value)?;
                let addr = self.eval_ptr(frame, address)?;
                self.store(addr, &value, &ty)?;
                VmValue::Void
            }
            K::Alloca { ty, alignment } => {
                let addr = self.alloc(self.layout.size_of(ty), *alignment)?;
                let zero = zero_value(ty);
                self.store(addr, &zero, ty)?;
                VmValue::Ptr(addr)
            }
            K::GetElementPtr { ptr, indices, .. } => self.gep(frame, ptr, indices)?,
            K::PtrToInt(v) => {
                let addr = self.eval_ptr(frame, v)?;
                VmValue::int(addr as i128, int_bits(&hint).unwrap_or(64))
            }
            K::IntToPtr(v) => {
                let value = self.eval(frame, v)?;
                VmValue::Ptr(value.as_u128().unwrap_or(0) as u64)
            }
            K::Trunc(v, ty) | K::ZExt(v, ty) => {
                let value = self.eval(frame, v)?;
                let bits = int_bits(ty).ok_or_else(|| runtime("integer cast to a non-integer"))?;
                VmValue::Int {
                    value: mask(value.as_u128().unwrap_or(0), bits),
                    bits,
                }
            }
            K::SExt(v, ty) => {
                let value = self.eval(frame, v)?;
                let bits = int_bits(ty).ok_or_else(|| runtime("integer cast to a non-integer"))?;
                VmValue::int(value.as_i128().unwrap_or(0), bits)
            }
            K::FPTrunc(v, ty) | K::FPExt(v, ty) => {
                let value = self.eval(frame, v)?;
                VmValue::Float(round_float(value.as_f64().unwrap_or(0.0), ty))
            }
            K::FPToSI(v, ty) => {
                let value = self.eval(frame, v)?;
                let bits = int_bits(ty).ok_or_else(|| runtime("float cast to a non-integer"))?;
                VmValue::int(value.as_f64().unwrap_or(0.0) as i128, bits)
            }
            K::SIToFP(v, ty) => {
                let value = self.eval(frame, v)?;
                VmValue::Float(round_float(value.as_i128().unwrap_or(0) as f64, ty))
            }
            K::Bitcast(v, ty) => {
                let from = self.type_of(frame, v)?;
                let value = self.eval(frame, v)?;
                self.bitcast(value, &from, ty)?
            }
            K::ExtractValue { aggregate, indices } => {
                let mut value = self.eval(frame, aggregate)?;
                for &index in indices {
                    value = match value {
                        VmValue::Aggregate(mut items) if (index as usize) < items.len() => {
                            items.swap_remove(index as usize)
                        }
                        other => {
                            return Err(runtime(format!("cannot extract {} from {:?}", index, other)))
                        }
                    };
                }
                value
            }
            K::InsertValue {
                aggregate,
                element,
                indices,
            } => {
                let mut value = self.eval(frame, aggregate)?;
                let element = self.eval(frame, element)?;
                insert(&mut value, indices, element)?;
                value
            }
            K::Call { function, args, .. } => {
                let name = match function {
                    LirValue::Function(name) => name.clone(),
                    other => {
                        let addr = self.eval_ptr(frame, other)?;
                        self.function_at(addr)?
                    }
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                self.run_function(&name, values)?
            }
        };
        if hint != LirType::Void {
            frame.registers.insert(inst.id, value);
            frame.types.insert(inst.id, hint);
        }
        Ok(())
    }

    fn eval(&self, frame: &Frame<'p>, value: &LirValue) -> Result<VmValue, VmError> {
        match value {
            LirValue::Register(id) => frame
                .registers
                .get(id)
                .cloned()
                .ok_or_else(|| runtime(format!("register %{} read before write", id))),
            LirValue::Constant(constant) => const_value(constant),
            LirValue::Global(name, _) => self
                .globals
                .get(name)
                .map(|addr| VmValue::Ptr(*addr))
                .ok_or_else(|| runtime(format!("missing global {}", name))),
            LirValue::Function(name) => self
                .function_names
                .iter()
                .position(|f| f == name)
                .map(|index| VmValue::Ptr(FUNCTION_BASE + index as u64))
                .ok_or_else(|| runtime(format!("missing function {}", name))),
            LirValue::Local(index) => frame
                .args
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| runtime(format!("missing argument {}", index))),
            LirValue::Undef(ty) => Ok(zero_value(ty)),
            LirValue::Null(_) => Ok(VmValue::Ptr(0)),
        }
    }

    fn eval_ptr(&self, frame: &Frame<'p>, value: &LirValue) -> Result<u64, VmError> {
        match self.eval(frame, value)? {
            VmValue::Ptr(addr) => Ok(addr),
            other => Err(runtime(format!("expected a pointer, got {:?}", other))),
        }
    }

    fn type_of(&self, frame: &Frame<'p>, value: &LirValue) -> Result<LirType, VmError> {
        Ok(match value {
            LirValue::Register(id) => frame
                .types
                .get(id)
                .cloned()
                .ok_or_else(|| runtime(format!("register %{} has no type", id)))?,
            LirValue::Constant(constant) => constant.ty(),
            LirValue::Global(_, ty) => LirType::ptr(ty.clone()),
            LirValue::Function(_) => LirType::ptr(LirType::I8),
            LirValue::Local(index) => frame
                .function
                .signature
                .params
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| runtime(format!("missing argument {}", index)))?,
            LirValue::Undef(ty) | LirValue::Null(ty) => ty.clone(),
        })
    }

    fn function_at(&self, addr: u64) -> Result<String, VmError> {
        addr.checked_sub(FUNCTION_BASE)
            .and_then(|index| self.function_names.get(index as usize))
            .cloned()
            .ok_or_else(|| runtime(format!("call through a non-function address {:#x}", addr)))
    }

    fn gep(
        &self,
        frame: &Frame<'p>,
        ptr: &LirValue,
        indices: &[LirValue],
    ) -> Result<VmValue, VmError> {
        let base_ty = self.type_of(frame, ptr)?;
        let mut addr = self.eval_ptr(frame, ptr)? as i128;
        let mut current = base_ty
            .pointee()
            .cloned()
            .ok_or_else(|| runtime("getelementptr on a non-pointer"))?;
        let mut indices = indices.iter();
        if let Some(first) = indices.next() {
            let index = self.eval(frame, first)?.as_i128().unwrap_or(0);
            addr += index * self.layout.size_of(&current) as i128;
        }
        for index in indices {
            let index = self.eval(frame, index)?.as_i128().unwrap_or(0);
            let next = match &current {
                LirType::Struct { fields, .. } => {
                    let offset = self
                        .layout
                        .element_offset(&current, index as u64)
                        .ok_or_else(|| runtime(format!("field {} out of range", index)))?;
                    addr += offset as i128;
                    fields[index as usize].clone()
                }
                LirType::Array(elem, _) | LirType::Vector(elem, _) => {
                    addr += index * self.layout.size_of(elem) as i128;
                    elem.as_ref().clone()
                }
                other => return Err(runtime(format!("cannot index into {:?}", other))),
            };
            current = next;
        }
        Ok(VmValue::Ptr(addr as u64))
    }

    fn bitcast(&mut self, value: VmValue, from: &LirType, to: &LirType) -> Result<VmValue, VmError> {
        if let VmValue::Ptr(addr) = value {
            if matches!(to, LirType::Ptr(_) | LirType::Function { .. }) {
                return Ok(VmValue::Ptr(addr));
            }
        }
        if self.layout.size_of(from) != self.layout.size_of(to) {
            return Err(runtime(format!("bitcast between sizes of {:?} and {:?}", from, to)));
        }
        let mark = self.memory.len();
        let addr = self.alloc(self.layout.size_of(from), self.layout.align_of(from).max(self.layout.align_of(to)))?;
        self.store(addr, &value, from)?;
        let result = self.load(addr, to);
        self.memory.truncate(mark);
        result
    }

    fn alloc(&mut self, size: u64, align: u32) -> Result<u64, VmError> {
        let addr = align_to(self.memory.len() as u64, align.max(1) as u64);
        let end = (addr + size.max(1)) as usize;
        if end > MEMORY_LIMIT {
            return Err(runtime("out of memory"));
        }
        self.memory.resize(end, 0);
        Ok(addr)
    }

    fn bytes(&self, addr: u64, len: u64) -> Result<&[u8], VmError> {
        if addr < MEMORY_BASE {
            return Err(runtime("null pointer dereference"));
        }
        let (start, end) = (addr as usize, (addr + len) as usize);
        self.memory
            .get(start..end)
            .ok_or_else(|| runtime(format!("access out of bounds at {:#x}", addr)))
    }

    fn bytes_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8], VmError> {
        if addr < MEMORY_BASE {
            return Err(runtime("null pointer dereference"));
        }
        let (start, end) = (addr as usize, (addr + len) as usize);
        self.memory
            .get_mut(start..end)
            .ok_or_else(|| runtime(format!("access out of bounds at {:#x}", addr)))
    }

    /// Writes `value` with the layout of `ty`.
    pub fn store(&mut self, addr: u64, value: &VmValue, ty: &LirType) -> Result<(), VmError> {
        let size = self.layout.size_of(ty);
        match (ty, value) {
            (LirType::Void, _) => Ok(()),
            (_, VmValue::Int { value, .. }) if int_bits(ty).is_some() => {
                let bytes = value.to_le_bytes();
                self.bytes_mut(addr, size)?
                    .copy_from_slice(&bytes[..size as usize]);
                Ok(())
            }
            (LirType::F32, VmValue::Float(v)) => {
                let bytes = (*v as f32).to_bits().to_le_bytes();
                self.bytes_mut(addr, 4)?.copy_from_slice(&bytes);
                Ok(())
            }
            (LirType::F64, VmValue::Float(v)) => {
                let bytes = v.to_bits().to_le_bytes();
                self.bytes_mut(addr, 8)?.copy_from_slice(&bytes);
                Ok(())
            }
            (LirType::F16 | LirType::BF16 | LirType::F128, _) => {
                Err(unsupported(format!("{:?} values", ty)))
            }
            (LirType::Ptr(_) | LirType::Function { .. }, VmValue::Ptr(target)) => {
                let bytes = target.to_le_bytes();
                self.bytes_mut(addr, size)?
                    .copy_from_slice(&bytes[..size as usize]);
                Ok(())
            }
            (LirType::Array(elem, _) | LirType::Vector(elem, _), VmValue::Aggregate(items)) => {
                let stride = self.layout.size_of(elem);
                for (index, item) in items.iter().enumerate() {
                    self.store(addr + stride * index as u64, item, elem)?;
                }
                Ok(())
            }
            (LirType::Struct { fields, .. }, VmValue::Aggregate(items)) => {
                let offsets = self
                    .layout
                    .struct_layout(ty)
                    .map(|layout| layout.field_offsets)
                    .unwrap_or_default();
                for ((field, item), offset) in fields.iter().zip(items).zip(offsets) {
                    self.store(addr + offset, item, field)?;
                }
                Ok(())
            }
            (ty, value) => Err(runtime(format!("cannot store {:?} as {:?}", value, ty))),
        }
    }

    /// Reads a value with the layout of `ty`.
    pub fn load(&self, addr: u64, ty: &LirType) -> Result<VmValue, VmError> {
        if let Some(bits) = int_bits(ty) {
            let size = self.layout.size_of(ty) as usize;
            let mut raw = [0u8; 16];
            raw[..size].copy_from_slice(self.bytes(addr, size as u64)?);
            return Ok(VmValue::Int {
                value: mask(u128::from_le_bytes(raw), bits),
                bits,
            });
        }
        Ok(match ty {
            LirType::F32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(self.bytes(addr, 4)?);
                VmValue::Float(f32::from_bits(u32::from_le_bytes(raw)) as f64)
            }
            LirType::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(self.bytes(addr, 8)?);
                VmValue::Float(f64::from_bits(u64::from_le_bytes(raw)))
            }
            LirType::F16 | LirType::BF16 | LirType::F128 => {
                return Err(unsupported(format!("{:?} values", ty)))
            }
            LirType::Ptr(_) | LirType::Function { .. } => {
                let size = self.layout.size_of(ty) as usize;
                let mut raw = [0u8; 8];
                raw[..size].copy_from_slice(self.bytes(addr, size as u64)?);
                VmValue::Ptr(u64::from_le_bytes(raw))
            }
            LirType::Array(elem, len) => {
                let stride = self.layout.size_of(elem);
                let items = (0..*len)
                    .map(|index| self.load(addr + stride * index, elem))
                    .collect::<Result<_, _>>()?;
                VmValue::Aggregate(items)
            }
            LirType::Vector(elem, len) => {
                let stride = self.layout.size_of(elem);
                let items = (0..*len as u64)
                    .map(|index| self.load(addr + stride * index, elem))
                    .collect::<Result<_, _>>()?;
                VmValue::Aggregate(items)
            }
            LirType::Struct { fields, .. } => {
                let offsets = self
                    .layout
                    .struct_layout(ty)
                    .map(|layout| layout.field_offsets)
                    .unwrap_or_default();
                let items = fields
                    .iter()
                    .zip(offsets)
                    .map(|(field, offset)| self.load(addr + offset, field))
                    .collect::<Result<_, _>>()?;
                VmValue::Aggregate(items)
            }
            LirType::Void => VmValue::Void,
            other => return Err(runtime(format!("cannot load {:?}", other))),
        })
    }
}

fn insert(target: &mut VmValue, indices: &[u32], element: VmValue) -> Result<(), VmError> {
    let Some((&first, rest)) = indices.split_first() else {
        *target = element;
        return Ok(());
    };
    match target {
        VmValue::Aggregate(items) => {
            let slot = items
                .get_mut(first as usize)
                .ok_or_else(|| runtime(format!("insert index {} out of range", first)))?;
            insert(slot, rest, element)
        }
        other => Err(runtime(format!("cannot insert into {:?}", other))),
    }
}

fn arith(kind: &LirInstructionKind, a: VmValue, b: VmValue, ty: &LirType) -> Result<VmValue, VmError> {
    use LirInstructionKind as K;
    match (a, b) {
        (VmValue::Float(x), VmValue::Float(y)) => {
            let result = match kind {
                K::Add(..) => x + y,
                K::Sub(..) => x - y,
                K::Mul(..) => x * y,
                K::Div(..) => x / y,
                K::Rem(..) => x % y,
                _ => return Err(runtime(format!("{:?} on floats", kind))),
            };
            Ok(VmValue::Float(round_float(result, ty)))
        }
        (VmValue::Int { value: x, bits }, VmValue::Int { value: y, .. }) => {
            let (sx, sy) = (sign_extend(x, bits), sign_extend(y, bits));
            let shift = (y % bits.max(1) as u128) as u32;
            let result = match kind {
                K::Add(..) => x.wrapping_add(y),
                K::Sub(..) => x.wrapping_sub(y),
                K::Mul(..) => x.wrapping_mul(y),
                K::Div(..) | K::Rem(..) | K::UDiv(..) | K::URem(..) if y == 0 => {
                    return Err(runtime("division by zero"))
                }
                K::Div(..) => sx.wrapping_div(sy) as u128,
                K::Rem(..) => sx.wrapping_rem(sy) as u128,
                K::UDiv(..) => x / y,
                K::URem(..) => x % y,
                K::And(..) => x & y,
                K::Or(..) => x | y,
                K::Xor(..) => x ^ y,
                K::Shl(..) => x << shift,
                K::Shr(..) => (sx >> shift) as u128,
                K::LShr(..) => x >> shift,
                _ => return Err(runtime(format!("{:?} is not arithmetic", kind))),
            };
            Ok(VmValue::Int {
                value: mask(result, bits),
                bits,
            })
        }
        (a, b) => Err(runtime(format!("{:?} on {:?} and {:?}", kind, a, b))),
    }
}

fn compare(kind: &LirInstructionKind, a: VmValue, b: VmValue) -> Result<VmValue, VmError> {
    use std::cmp::Ordering;
    use LirInstructionKind as K;
    let ordering = match (&a, &b) {
        (VmValue::Float(x), VmValue::Float(y)) => match x.partial_cmp(y) {
            Some(ordering) => ordering,
            // NaN compares unequal to everything
            None => return Ok(VmValue::bool(matches!(kind, K::Ne(..)))),
        },
        (VmValue::Int { value: x, bits }, VmValue::Int { value: y, .. }) => match kind {
            K::ULt(..) | K::ULe(..) | K::UGt(..) | K::UGe(..) => x.cmp(y),
            _ => sign_extend(*x, *bits).cmp(&sign_extend(*y, *bits)),
        },
        (VmValue::Ptr(x), VmValue::Ptr(y)) => x.cmp(y),
        _ => return Err(runtime(format!("cannot compare {:?} and {:?}", a, b))),
    };
    let result = match kind {
        K::Eq(..) => ordering == Ordering::Equal,
        K::Ne(..) => ordering != Ordering::Equal,
        K::Lt(..) | K::ULt(..) => ordering == Ordering::Less,
        K::Le(..) | K::ULe(..) => ordering != Ordering::Greater,
        K::Gt(..) | K::UGt(..) => ordering == Ordering::Greater,
        K::Ge(..) | K::UGe(..) => ordering != Ordering::Less,
        _ => return Err(runtime(format!("{:?} is not a comparison", kind))),
    };
    Ok(VmValue::bool(result))
}

fn const_value(constant: &LirConstant) -> Result<VmValue, VmError> {
    Ok(match constant {
        LirConstant::Int(v, ty) => VmValue::int(*v, int_bits(ty).unwrap_or(64)),
        LirConstant::UInt(v, ty) => VmValue::Int {
            value: mask(*v as u128, int_bits(ty).unwrap_or(64)),
            bits: int_bits(ty).unwrap_or(64),
        },
        LirConstant::Float(v, ty) => match ty {
            LirType::F32 | LirType::F64 => VmValue::Float(round_float(*v, ty)),
            other => return Err(unsupported(format!("{:?} constants", other))),
        },
        LirConstant::Bool(b) => VmValue::bool(*b),
        LirConstant::String(text) => VmValue::Aggregate(
            text.bytes()
                .chain(std::iter::once(0))
                .map(|byte| VmValue::int(byte as i128, 8))
                .collect(),
        ),
        LirConstant::Array(items, _) | LirConstant::Struct(items, _) => {
            VmValue::Aggregate(items.iter().map(const_value).collect::<Result<_, _>>()?)
        }
        LirConstant::Null(_) => VmValue::Ptr(0),
        LirConstant::Undef(ty) | LirConstant::ZeroInitializer(ty) => zero_value(ty),
    })
}

fn zero_value(ty: &LirType) -> VmValue {
    match ty {
        LirType::F16 | LirType::BF16 | LirType::F32 | LirType::F64 | LirType::F128 => {
            VmValue::Float(0.0)
        }
        LirType::Ptr(_) | LirType::Function { .. } => VmValue::Ptr(0),
        LirType::Array(elem, len) => VmValue::Aggregate(vec![zero_value(elem); *len as usize]),
        LirType::Vector(elem, len) => VmValue::Aggregate(vec![zero_value(elem); *len as usize]),
        LirType::Struct { fields, .. } => VmValue::Aggregate(fields.iter().map(zero_value).collect()),
        LirType::Void => VmValue::Void,
        int => VmValue::Int {
            value: 0,
            bits: int_bits(int).unwrap_or(64),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use em_core::lir::builder::{const_i32, const_int};
    use em_core::lir::{
        CallingConvention, FunctionBuilder, LirFunctionSignature, Linkage,
    };
    use pretty_assertions::assert_eq;

    fn function(name: &str, params: Vec<LirType>, ret: LirType) -> FunctionBuilder {
        let function = LirFunction::new(
            name.to_string(),
            LirFunctionSignature {
                params,
                return_type: ret,
                is_variadic: false,
            },
            CallingConvention::C,
            Linkage::External,
        );
        FunctionBuilder::new(function, DataLayout::default())
    }

    #[test]
    fn runs_arithmetic_through_memory() {
        let mut b = function("add", vec![LirType::I32, LirType::I32], LirType::I32);
        let slot = b.alloca(LirType::I32);
        b.store(LirValue::Local(0), slot.clone());
        let x = b.load(slot, LirType::I32);
        let sum = b.push(
            LirInstructionKind::Add(x, LirValue::Local(1)),
            Some(LirType::I32),
        );
        b.ret(Some(sum));
        let mut program = LirProgram::new();
        program.add_function(b.finish());

        let mut vm = Vm::new(&program).unwrap();
        let result = vm
            .run_function("add", vec![VmValue::int(40, 32), VmValue::int(2, 32)])
            .unwrap();
        assert_eq!(result.as_i128(), Some(42));
    }

    #[test]
    fn struct_fields_follow_the_layout() {
        let pair = LirType::Struct {
            fields: vec![LirType::I8, LirType::I32],
            packed: false,
            name: Some("Pair".to_string()),
        };
        let mut b = function("second", vec![], LirType::I64);
        let slot = b.alloca(pair.clone());
        let field = b.field_ptr(slot.clone(), 1, LirType::I32);
        b.store(const_i32(7), field);
        let whole = b.bitcast(slot, LirType::ptr(LirType::I64));
        let raw = b.load(whole, LirType::I64);
        b.ret(Some(raw));
        let mut program = LirProgram::new();
        program.add_function(b.finish());

        let mut vm = Vm::new(&program).unwrap();
        let result = vm.run_function("second", vec![]).unwrap();
        // the int lands after three bytes of padding
        assert_eq!(result.as_i128(), Some(7 << 32));
    }

    #[test]
    fn signed_and_unsigned_division_differ() {
        let kind = LirInstructionKind::Div(const_int(-7, LirType::I8), const_int(2, LirType::I8));
        let signed = arith(&kind, VmValue::int(-7, 8), VmValue::int(2, 8), &LirType::I8).unwrap();
        assert_eq!(signed.as_i128(), Some(-3));
        let kind = LirInstructionKind::UDiv(const_int(-7, LirType::I8), const_int(2, LirType::I8));
        let unsigned = arith(&kind, VmValue::int(-7, 8), VmValue::int(2, 8), &LirType::I8).unwrap();
        assert_eq!(unsigned.as_u128(), Some(124));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let kind = LirInstructionKind::Div(const_i32(1), const_i32(0));
        let err = arith(&kind, VmValue::int(1, 32), VmValue::int(0, 32), &LirType::I32).unwrap_err();
        assert!(matches!(err, VmError::Runtime { .. }));
    }

    #[test]
    fn declarations_cannot_run() {
        let mut program = LirProgram::new();
        program.add_function(LirFunction::new(
            "puts".to_string(),
            LirFunctionSignature {
                params: vec![LirType::ptr(LirType::I8)],
                return_type: LirType::I32,
                is_variadic: false,
            },
            CallingConvention::C,
            Linkage::External,
        ));
        let mut vm = Vm::new(&program).unwrap();
        let err = vm.run_function("puts", vec![VmValue::Ptr(0)]).unwrap_err();
        assert!(matches!(err, VmError::Unsupported { .. }));
    }
}
