use std::collections::HashMap;

use super::*;
use crate::error::{Error, Result};

/// Structural checks a backend would reject a function for. Failures carry
/// the textual dump of the function.
pub fn verify_function(function: &LirFunction, program: &LirProgram) -> Result<()> {
    if function.is_declaration() {
        return Ok(());
    }
    let fail = |message: String| Error::backend(&function.name, message, function.to_string());

    let mut defined: HashMap<RegisterId, (BasicBlockId, usize)> = HashMap::new();
    for block in &function.basic_blocks {
        for (pos, inst) in block.instructions.iter().enumerate() {
            if inst.type_hint.as_ref().is_some_and(|ty| *ty != LirType::Void) {
                defined.insert(inst.id, (block.id, pos));
            }
        }
    }

    let check_value = |value: &LirValue, block: BasicBlockId, pos: usize| -> Result<()> {
        match value {
            LirValue::Register(id) => match defined.get(id) {
                None => Err(fail(format!("use of undefined register %r{}", id))),
                Some((def_block, def_pos)) if *def_block == block && *def_pos >= pos => Err(fail(
                    format!("register %r{} used before its definition in bb{}", id, block),
                )),
                Some(_) => Ok(()),
            },
            LirValue::Local(index) if *index as usize >= function.signature.params.len() => {
                Err(fail(format!("parameter %arg{} out of range", index)))
            }
            _ => Ok(()),
        }
    };

    for block in &function.basic_blocks {
        for (pos, inst) in block.instructions.iter().enumerate() {
            for value in operands(&inst.kind) {
                check_value(value, block.id, pos)?;
            }
            if let LirInstructionKind::Call {
                function: LirValue::Function(callee),
                args,
                ..
            } = &inst.kind
            {
                let signature = if *callee == function.name {
                    Some(&function.signature)
                } else {
                    program.function(callee).map(|f| &f.signature)
                };
                if let Some(signature) = signature {
                    let expected = signature.params.len();
                    let ok = if signature.is_variadic {
                        args.len() >= expected
                    } else {
                        args.len() == expected
                    };
                    if !ok {
                        return Err(fail(format!(
                            "call to @{} passes {} arguments, expected {}",
                            callee,
                            args.len(),
                            expected
                        )));
                    }
                }
            }
        }

        let Some(terminator) = &block.terminator else {
            return Err(fail(format!("block bb{} has no terminator", block.id)));
        };
        let end = block.instructions.len();
        match terminator {
            LirTerminator::Return(value) => {
                let returns_void = function.signature.return_type == LirType::Void;
                match (value, returns_void) {
                    (Some(_), true) => {
                        return Err(fail("void function returns a value".to_string()))
                    }
                    (None, false) => {
                        return Err(fail("non-void function returns without a value".to_string()))
                    }
                    (Some(value), false) => check_value(value, block.id, end)?,
                    (None, true) => {}
                }
            }
            LirTerminator::CondBr { condition, .. } => check_value(condition, block.id, end)?,
            LirTerminator::Br(_) | LirTerminator::Unreachable => {}
        }
        for target in terminator.successors() {
            if function.get_basic_block(target).is_none() {
                return Err(fail(format!(
                    "bb{} branches to missing block bb{}",
                    block.id, target
                )));
            }
        }
    }
    Ok(())
}

fn operands(kind: &LirInstructionKind) -> Vec<&LirValue> {
    use LirInstructionKind::*;
    match kind {
        Add(a, b) | Sub(a, b) | Mul(a, b) | Div(a, b) | UDiv(a, b) | Rem(a, b) | URem(a, b)
        | And(a, b) | Or(a, b) | Xor(a, b) | Shl(a, b) | Shr(a, b) | LShr(a, b) | Eq(a, b)
        | Ne(a, b) | Lt(a, b) | Le(a, b) | Gt(a, b) | Ge(a, b) | ULt(a, b) | ULe(a, b)
        | UGt(a, b) | UGe(a, b) => vec![a, b],
        Neg(a) | Not(a) | PtrToInt(a) | IntToPtr(a) => vec![a],
        Trunc(a, _) | ZExt(a, _) | SExt(a, _) | FPTrunc(a, _) | FPExt(a, _) | FPToSI(a, _)
        | SIToFP(a, _) | Bitcast(a, _) => vec![a],
        Load { address, .. } => vec![address],
        Store { value, address, .. } => vec![value, address],
        Alloca { .. } => Vec::new(),
        GetElementPtr { ptr, indices, .. } => std::iter::once(ptr).chain(indices.iter()).collect(),
        ExtractValue { aggregate, .. } => vec![aggregate],
        InsertValue {
            aggregate, element, ..
        } => vec![aggregate, element],
        Call { function, args, .. } => std::iter::once(function).chain(args.iter()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::layout::DataLayout;

    fn signature(ret: LirType) -> LirFunctionSignature {
        LirFunctionSignature {
            params: vec![],
            return_type: ret,
            is_variadic: false,
        }
    }

    #[test]
    fn well_formed_function_passes() {
        let mut b = FunctionBuilder::new(
            LirFunction::new("ok", signature(LirType::I32), CallingConvention::C, Linkage::External),
            DataLayout::default(),
        );
        let slot = b.alloca(LirType::I32);
        b.store(builder::const_i32(3), slot.clone());
        let value = b.load(slot, LirType::I32);
        b.ret(Some(value));
        let func = b.finish();
        assert!(verify_function(&func, &LirProgram::new()).is_ok());
    }

    #[test]
    fn open_block_is_rejected_with_dump() {
        let b = FunctionBuilder::new(
            LirFunction::new("open", signature(LirType::Void), CallingConvention::C, Linkage::External),
            DataLayout::default(),
        );
        let func = b.finish();
        let err = verify_function(&func, &LirProgram::new()).unwrap_err();
        match err {
            Error::Backend { function, dump, .. } => {
                assert_eq!(function, "open");
                assert!(dump.contains("fn open()"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_return_value_is_rejected() {
        let mut b = FunctionBuilder::new(
            LirFunction::new("bad", signature(LirType::I32), CallingConvention::C, Linkage::External),
            DataLayout::default(),
        );
        b.ret(None);
        let err = verify_function(&b.finish(), &LirProgram::new()).unwrap_err();
        assert!(err.message().contains("without a value"));
    }
}
