use em_core::ast::{Modifier, NodeKind};
use em_core::lir::builder::const_i32;
use em_core::lir::{
    verify_function, FunctionBuilder, LirFunction, LirFunctionSignature, LirLocal, LirType,
    Linkage,
};
use em_core::types::Type;
use em_core::{bail, trace, Location, Result};

use crate::abi::ArgClass;
use crate::context::{CompilationContext, FunctionState};
use crate::guard::StateGuard;
use crate::scope::{LocalVar, Scope};
use crate::symbols::{CallConv, FunctionSymbol};

/// Emits the function registered under `key` once. External declarations
/// become bodiless LIR functions.
pub(crate) fn emit_function(ctx: &mut CompilationContext, key: &str) -> Result<()> {
    let Some(symbol) = ctx.symbols.functions.get(key).cloned() else {
        bail!("unknown function '{}'", key);
    };
    if !ctx.states.begin_emit(symbol.decl) {
        return Ok(());
    }
    let mut guard = StateGuard::scoped(ctx, symbol.subst.clone(), symbol.namespace.clone());
    emit_body(&mut guard, &symbol)
}

impl CompilationContext {
    /// Parameter classes of a function: lowered for `cdecl64`, direct
    /// otherwise.
    pub(crate) fn param_classes(
        &mut self,
        symbol: &FunctionSymbol,
        location: &Location,
    ) -> Result<Vec<ArgClass>> {
        symbol
            .params
            .iter()
            .map(|ty| match symbol.conv {
                CallConv::Cdecl64 => self.classify_param(ty, location),
                _ => Ok(ArgClass::Direct),
            })
            .collect()
    }

    fn lir_signature(
        &mut self,
        symbol: &FunctionSymbol,
        classes: &[ArgClass],
        location: &Location,
    ) -> Result<LirFunctionSignature> {
        let mut params = Vec::with_capacity(classes.len());
        for (ty, class) in symbol.params.iter().zip(classes) {
            params.push(self.abi_param_type(ty, class, location)?);
        }
        let return_type = if implicit_zero(symbol) {
            LirType::I32
        } else {
            self.lower_type(&symbol.ret, location)?
        };
        Ok(LirFunctionSignature {
            params,
            return_type,
            is_variadic: symbol.variadic,
        })
    }
}

pub(super) fn implicit_zero(symbol: &FunctionSymbol) -> bool {
    symbol.link_name == "main" && symbol.owner.is_none() && symbol.ret.is_void()
}

fn emit_body(ctx: &mut CompilationContext, symbol: &FunctionSymbol) -> Result<()> {
    let location = ctx.locate(symbol.decl);
    let NodeKind::Function(decl) = ctx.ast.kind(symbol.decl).clone() else {
        bail!(at location, "'{}' is not a function", symbol.name);
    };
    let classes = ctx.param_classes(symbol, &location)?;
    let signature = ctx.lir_signature(symbol, &classes, &location)?;
    // instances and inline functions may be defined by several units
    let linkage = if symbol.is_instance || decl.has_modifier(&Modifier::Inline) {
        Linkage::LinkOnceOdr
    } else {
        Linkage::External
    };
    let function = LirFunction::new(
        symbol.link_name.clone(),
        signature,
        symbol.conv.lir(),
        linkage,
    );
    let Some(body) = decl.body else {
        if ctx.program.function(&symbol.link_name).is_none() {
            ctx.program.add_function(function);
        }
        return Ok(());
    };
    trace!("emitting {}", symbol.key);

    let param_types = function.signature.params.clone();
    let mut builder = FunctionBuilder::new(function, ctx.layout);
    let exit = builder.create_block("exit");
    ctx.func = Some(FunctionState {
        builder,
        key: symbol.key.clone(),
        ret: symbol.ret.clone(),
        ret_slot: None,
        exit,
        exit_tail: exit,
        scope: Scope::default(),
        loops: Vec::new(),
        implicit_zero: implicit_zero(symbol),
        constructor: symbol.constructor_of.is_some(),
        in_defer: false,
    });
    ctx.func()?.scope.push();

    let span = ctx.ast.span(symbol.decl);
    for (index, ty) in symbol.params.iter().enumerate() {
        let slot = ctx.bind_param(index, ty, &classes[index], &location)?;
        let name = symbol.param_names[index].clone();
        let state = ctx.func()?;
        state.builder.add_local(LirLocal {
            id: index as u32,
            ty: param_types[index].clone(),
            name: Some(name.clone()),
            is_argument: true,
        });
        let declared = state.scope.declare(LocalVar {
            name: name.clone(),
            ty: ty.clone(),
            slot,
            span,
            param_index: Some(index),
            used: false,
        });
        if !declared {
            bail!(at location, "parameter '{}' of '{}' is declared twice", name, symbol.name);
        }
    }
    if let Some(owner) = &symbol.constructor_of {
        // the value under construction is the local `this`
        let ty = Type::named(owner);
        let slot = ctx.default_slot(&ty, &location)?;
        let state = ctx.func()?;
        state.scope.declare(LocalVar {
            name: "this".to_string(),
            ty,
            slot: slot.clone(),
            span,
            param_index: None,
            used: true,
        });
        state.ret_slot = Some(slot);
    } else if !symbol.ret.is_void() {
        let ret_ty = ctx.lower_type(&symbol.ret, &location)?;
        let state = ctx.func()?;
        let slot = state.builder.alloca(ret_ty);
        state.ret_slot = Some(slot);
    }

    ctx.emit_stmt(body)?;

    let ret_ty = ctx.lower_type(&symbol.ret, &location)?;
    let state = ctx.func()?;
    state.builder.br(exit);
    let tail = state.exit_tail;
    state.builder.switch_to(tail);
    if state.implicit_zero {
        state.builder.ret(Some(const_i32(0)));
    } else if let Some(slot) = state.ret_slot.clone() {
        let value = state.builder.load(slot, ret_ty);
        state.builder.ret(Some(value));
    } else {
        state.builder.ret(None);
    }
    let unused = state.scope.pop();
    ctx.report_unused(unused);

    let Some(state) = ctx.func.take() else {
        bail!("function state of '{}' was lost", symbol.name);
    };
    let function = state.builder.finish();
    verify_function(&function, &ctx.program)?;
    ctx.program.add_function(function);
    Ok(())
}
