use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::ty::Ty;
use super::{
    CallingConvention, Linkage, LirBasicBlock, LirConstant, LirFunction, LirGlobal,
    LirInstruction, LirInstructionKind, LirProgram, LirTerminator, LirValue, Visibility,
};

const INDENT: &str = "    ";

impl Display for LirProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "lir::Program {{")?;
        if !self.type_definitions.is_empty() {
            writeln!(f, "{}types:", INDENT)?;
            for typedef in &self.type_definitions {
                writeln!(
                    f,
                    "{0}{0}%{1} = {2}",
                    INDENT,
                    typedef.name,
                    format_struct_body(&typedef.ty)
                )?;
            }
        }

        if !self.globals.is_empty() {
            writeln!(f, "{}globals:", INDENT)?;
            for global in &self.globals {
                writeln!(f, "{0}{0}{1}", INDENT, format_global(global))?;
            }
        }

        if !self.functions.is_empty() {
            writeln!(f, "{}functions:", INDENT)?;
            for (idx, func) in self.functions.iter().enumerate() {
                write_function(func, f, 2)?;
                if idx + 1 < self.functions.len() {
                    writeln!(f)?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

impl Display for LirFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_function(self, f, 0)
    }
}

fn format_global(global: &LirGlobal) -> String {
    let mut line = format!("@{}: {}", global.name, format_type(&global.ty));
    line.push_str(&format!(" [linkage: {}]", format_linkage(&global.linkage)));
    line.push_str(&format!(
        " [visibility: {}]",
        format_visibility(&global.visibility)
    ));
    if global.is_constant {
        line.push_str(" const");
    }
    if let Some(align) = global.alignment {
        line.push_str(&format!(" align {}", align));
    }
    if let Some(initializer) = &global.initializer {
        line.push_str(" = ");
        line.push_str(&format_constant(initializer));
    }
    line
}

fn write_function(func: &LirFunction, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    let mut params = func
        .signature
        .params
        .iter()
        .enumerate()
        .map(|(idx, ty)| format!("arg{}: {}", idx, format_type(ty)))
        .collect_vec();
    if func.signature.is_variadic {
        params.push("...".into());
    }
    let header = format!(
        "{} {}({}) -> {} [cc: {}, linkage: {}]",
        if func.is_declaration() { "declare" } else { "fn" },
        func.name,
        params.join(", "),
        format_type(&func.signature.return_type),
        format_calling_convention(&func.calling_convention),
        format_linkage(&func.linkage)
    );
    if func.is_declaration() {
        return writeln!(f, "{}{}", pad, header);
    }

    writeln!(f, "{}{} {{", pad, header)?;
    for block in &func.basic_blocks {
        write_block(block, f, depth + 1)?;
    }
    writeln!(f, "{}}}", pad)
}

fn write_block(block: &LirBasicBlock, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    let mut header = format!("bb{}", block.id);
    if let Some(label) = &block.label {
        header.push_str(&format!(" // label: {}", label));
    }
    if !block.predecessors.is_empty() {
        let preds = block.predecessors.iter().map(|id| format!("bb{}", id)).join(", ");
        header.push_str(&format!(" // preds: [{}]", preds));
    }
    writeln!(f, "{}{}:", pad, header)?;
    for inst in &block.instructions {
        let mut line = summarize_instruction(inst);
        if let Some(ty) = &inst.type_hint {
            line.push_str(&format!(" : {}", format_type(ty)));
        }
        writeln!(f, "{}{}{}", pad, INDENT, line)?;
    }
    let terminator = match &block.terminator {
        Some(term) => summarize_terminator(term),
        None => "<missing>".to_string(),
    };
    writeln!(f, "{}{}terminator: {}", pad, INDENT, terminator)
}

fn summarize_instruction(inst: &LirInstruction) -> String {
    use LirInstructionKind::*;

    let binary = |name: &str, lhs: &LirValue, rhs: &LirValue| {
        format!(
            "%r{} = {} {}, {}",
            inst.id,
            name,
            format_value(lhs),
            format_value(rhs)
        )
    };
    let cast = |name: &str, value: &LirValue, ty: &Ty| {
        format!(
            "%r{} = {} {} to {}",
            inst.id,
            name,
            format_value(value),
            format_type(ty)
        )
    };

    match &inst.kind {
        Add(lhs, rhs) => binary("add", lhs, rhs),
        Sub(lhs, rhs) => binary("sub", lhs, rhs),
        Mul(lhs, rhs) => binary("mul", lhs, rhs),
        Div(lhs, rhs) => binary("div", lhs, rhs),
        UDiv(lhs, rhs) => binary("udiv", lhs, rhs),
        Rem(lhs, rhs) => binary("rem", lhs, rhs),
        URem(lhs, rhs) => binary("urem", lhs, rhs),
        Neg(value) => format!("%r{} = neg {}", inst.id, format_value(value)),
        And(lhs, rhs) => binary("and", lhs, rhs),
        Or(lhs, rhs) => binary("or", lhs, rhs),
        Xor(lhs, rhs) => binary("xor", lhs, rhs),
        Shl(lhs, rhs) => binary("shl", lhs, rhs),
        Shr(lhs, rhs) => binary("shr", lhs, rhs),
        LShr(lhs, rhs) => binary("lshr", lhs, rhs),
        Not(value) => format!("%r{} = not {}", inst.id, format_value(value)),
        Eq(lhs, rhs) => binary("eq", lhs, rhs),
        Ne(lhs, rhs) => binary("ne", lhs, rhs),
        Lt(lhs, rhs) => binary("lt", lhs, rhs),
        Le(lhs, rhs) => binary("le", lhs, rhs),
        Gt(lhs, rhs) => binary("gt", lhs, rhs),
        Ge(lhs, rhs) => binary("ge", lhs, rhs),
        ULt(lhs, rhs) => binary("ult", lhs, rhs),
        ULe(lhs, rhs) => binary("ule", lhs, rhs),
        UGt(lhs, rhs) => binary("ugt", lhs, rhs),
        UGe(lhs, rhs) => binary("uge", lhs, rhs),
        Load {
            address,
            alignment,
            volatile,
        } => {
            let mut text = format!("%r{} = load {}", inst.id, format_value(address));
            if let Some(align) = alignment {
                text.push_str(&format!(" align {}", align));
            }
            if *volatile {
                text.push_str(" volatile");
            }
            text
        }
        Store {
            value,
            address,
            alignment,
            volatile,
        } => {
            let mut text = format!("store {}, {}", format_value(value), format_value(address));
            if let Some(align) = alignment {
                text.push_str(&format!(" align {}", align));
            }
            if *volatile {
                text.push_str(" volatile");
            }
            text
        }
        Alloca { ty, alignment } => format!(
            "%r{} = alloca {} align {}",
            inst.id,
            format_type(ty),
            alignment
        ),
        GetElementPtr {
            ptr,
            indices,
            inbounds,
        } => {
            let prefix = if *inbounds { "gep inbounds" } else { "gep" };
            let mut text = format!("%r{} = {} {}", inst.id, prefix, format_value(ptr));
            if !indices.is_empty() {
                text.push_str(&format!(" [{}]", indices.iter().map(format_value).join(", ")));
            }
            text
        }
        PtrToInt(value) => format!("%r{} = ptrtoint {}", inst.id, format_value(value)),
        IntToPtr(value) => format!("%r{} = inttoptr {}", inst.id, format_value(value)),
        Trunc(value, ty) => cast("trunc", value, ty),
        ZExt(value, ty) => cast("zext", value, ty),
        SExt(value, ty) => cast("sext", value, ty),
        FPTrunc(value, ty) => cast("fptrunc", value, ty),
        FPExt(value, ty) => cast("fpext", value, ty),
        FPToSI(value, ty) => cast("fptosi", value, ty),
        SIToFP(value, ty) => cast("sitofp", value, ty),
        Bitcast(value, ty) => cast("bitcast", value, ty),
        ExtractValue { aggregate, indices } => format!(
            "%r{} = extractvalue {}, [{}]",
            inst.id,
            format_value(aggregate),
            indices.iter().join(", ")
        ),
        InsertValue {
            aggregate,
            element,
            indices,
        } => format!(
            "%r{} = insertvalue {}, {}, [{}]",
            inst.id,
            format_value(aggregate),
            format_value(element),
            indices.iter().join(", ")
        ),
        Call {
            function,
            args,
            calling_convention,
            tail_call,
        } => {
            let mut text = String::new();
            if *tail_call {
                text.push_str("tail ");
            }
            text.push_str(&format!(
                "%r{} = call {} {}",
                inst.id,
                format_calling_convention(calling_convention),
                format_value(function)
            ));
            text.push_str(&format!("({})", args.iter().map(format_value).join(", ")));
            text
        }
    }
}

fn summarize_terminator(term: &LirTerminator) -> String {
    match term {
        LirTerminator::Return(Some(value)) => format!("ret {}", format_value(value)),
        LirTerminator::Return(None) => "ret void".into(),
        LirTerminator::Br(target) => format!("br bb{}", target),
        LirTerminator::CondBr {
            condition,
            if_true,
            if_false,
        } => format!(
            "condbr {}, bb{}, bb{}",
            format_value(condition),
            if_true,
            if_false
        ),
        LirTerminator::Unreachable => "unreachable".into(),
    }
}

pub fn format_value(value: &LirValue) -> String {
    use LirValue::*;

    match value {
        Register(id) => format!("%r{}", id),
        Constant(constant) => format_constant(constant),
        Global(name, _) => format!("@{}", name),
        Function(name) => format!("@{}", name),
        Local(id) => format!("%arg{}", id),
        Undef(ty) => format!("undef {}", format_type(ty)),
        Null(ty) => format!("null {}", format_type(ty)),
    }
}

pub fn format_constant(constant: &LirConstant) -> String {
    use LirConstant::*;

    match constant {
        Int(value, ty) => format!("{} {}", format_type(ty), value),
        UInt(value, ty) => format!("{} {}", format_type(ty), value),
        Float(value, ty) => format!("{} {:?}", format_type(ty), value),
        Bool(value) => format!("bool {}", value),
        String(s) => format!("c{:?}", s),
        Array(elements, ty) => format!(
            "[{} x {}] {{ {} }}",
            elements.len(),
            format_type(ty),
            elements.iter().map(format_constant).join(", ")
        ),
        Struct(fields, ty) => format!(
            "struct {} {{ {} }}",
            format_type(ty),
            fields.iter().map(format_constant).join(", ")
        ),
        Null(ty) => format!("null {}", format_type(ty)),
        Undef(ty) => format!("undef {}", format_type(ty)),
        ZeroInitializer(ty) => format!("zeroinitializer {}", format_type(ty)),
    }
}

pub fn format_type(ty: &Ty) -> String {
    use Ty::*;

    match ty {
        I1 => "i1".into(),
        I8 => "i8".into(),
        I16 => "i16".into(),
        I32 => "i32".into(),
        I64 => "i64".into(),
        I128 => "i128".into(),
        F16 => "f16".into(),
        BF16 => "bf16".into(),
        F32 => "f32".into(),
        F64 => "f64".into(),
        F128 => "f128".into(),
        Void => "void".into(),
        Ptr(inner) => format!("ptr {}", format_type(inner)),
        Array(inner, count) => format!("[{} x {}]", count, format_type(inner)),
        Struct {
            name: Some(name), ..
        } => format!("%{}", name),
        Struct { .. } => format_struct_body(ty),
        Function {
            return_type,
            param_types,
            is_variadic,
        } => {
            let mut params = param_types.iter().map(format_type).collect_vec();
            if *is_variadic {
                params.push("...".into());
            }
            format!("fn({}) -> {}", params.join(", "), format_type(return_type))
        }
        Vector(inner, count) => format!("<{} x {}>", count, format_type(inner)),
    }
}

fn format_struct_body(ty: &Ty) -> String {
    match ty {
        Ty::Struct { fields, packed, .. } => {
            let body = fields.iter().map(format_type).join(", ");
            if *packed {
                format!("<{{ {} }}>", body)
            } else {
                format!("{{ {} }}", body)
            }
        }
        other => format_type(other),
    }
}

fn format_calling_convention(cc: &CallingConvention) -> &'static str {
    match cc {
        CallingConvention::C => "c",
        CallingConvention::Fast => "fast",
        CallingConvention::Cold => "cold",
        CallingConvention::X86_64SysV => "x86_64_sysv",
    }
}

fn format_linkage(linkage: &Linkage) -> &'static str {
    match linkage {
        Linkage::External => "external",
        Linkage::LinkOnceAny => "linkonce",
        Linkage::LinkOnceOdr => "linkonce_odr",
        Linkage::Internal => "internal",
        Linkage::Private => "private",
    }
}

fn format_visibility(visibility: &Visibility) -> &'static str {
    match visibility {
        Visibility::Default => "default",
        Visibility::Hidden => "hidden",
    }
}
