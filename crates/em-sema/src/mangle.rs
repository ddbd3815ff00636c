//! Type encodings used in function keys and link names.

use em_core::types::{ArrayLen, Type};
use itertools::Itertools;

/// Short encoding of a type: scalar codes, `p` + pointee, `a<n>` +
/// element, `s-<name>` for aggregates, `F` + return + parameters for
/// functions with a trailing `V` when variadic.
pub fn encode_type(ty: &Type) -> String {
    match ty.strip() {
        Type::Void => "v".to_string(),
        Type::Scalar(kind) => kind.code().to_string(),
        Type::Pointer(inner) => format!("p{}", encode_type(inner)),
        Type::Array(inner, ArrayLen::Fixed(len)) => format!("a{}{}", len, encode_type(inner)),
        Type::Array(inner, _) => format!("a?{}", encode_type(inner)),
        agg @ Type::Aggregate { .. } => format!("s-{}", agg.canonical()),
        Type::Function(func) => format!(
            "F{}{}{}",
            encode_type(&func.ret),
            signature(&func.params),
            if func.variadic { "V" } else { "" }
        ),
        Type::TemplateParam(name) => format!("t-{}", name),
        Type::Const(inner) | Type::Alias { target: inner, .. } => encode_type(inner),
    }
}

/// `[_i_l]` for `(int, long)`, `[]` for no parameters.
pub fn signature(types: &[Type]) -> String {
    let body = types.iter().map(|ty| format!("_{}", encode_type(ty))).join("");
    format!("[{}]", body)
}

pub fn function_key(name: &str, params: &[Type]) -> String {
    format!("{}{}", name, signature(params))
}

pub fn function_link_name(key: &str) -> String {
    format!("_EmF{}{}", key.len(), key)
}

pub fn method_link_name(key: &str) -> String {
    format!("_EmM{}{}", key.len(), key)
}

pub fn global_link_name(name: &str) -> String {
    format!("_EmG{}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use em_core::types::ScalarKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn signatures_encode_every_parameter() {
        let params = vec![
            Type::int(),
            Type::Scalar(ScalarKind::Long).pointer_to(),
            Type::named("Point"),
            Type::Scalar(ScalarKind::Char).array_of(4),
        ];
        assert_eq!(signature(&params), "[_i_pl_s-Point_a4c]");
        assert_eq!(signature(&[]), "[]");
        assert_eq!(function_key("add", &[Type::int(), Type::int()]), "add[_i_i]");
    }

    #[test]
    fn function_types_encode_their_shape() {
        let int_fn = Type::function(Type::int(), vec![Type::int()], false);
        let void_fn = Type::function(Type::Void, vec![Type::Scalar(ScalarKind::Long)], false);
        let printf = Type::function(Type::int(), vec![Type::Scalar(ScalarKind::Char).pointer_to()], true);
        assert_eq!(encode_type(&int_fn.clone().pointer_to()), "pFi[_i]");
        assert_eq!(encode_type(&void_fn.pointer_to()), "pFv[_l]");
        assert_eq!(encode_type(&printf), "Fi[_pc]V");
        assert_eq!(function_key("apply", &[int_fn]), "apply[_Fi[_i]]");
    }

    #[test]
    fn const_is_transparent_in_keys() {
        assert_eq!(encode_type(&Type::int().constant()), encode_type(&Type::int()));
    }

    #[test]
    fn link_names_carry_key_length() {
        assert_eq!(function_link_name("f[]"), "_EmF3f[]");
        assert_eq!(method_link_name("P.m[_ps-P]"), "_EmM10P.m[_ps-P]");
        assert_eq!(global_link_name("counter"), "_EmGcounter");
    }
}
