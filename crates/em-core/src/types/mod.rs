use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ast::NodeId;
use crate::lir::layout::checked_align_to;

pub mod cast;
mod scalar;
mod subst;
mod value;

pub use cast::{cast_kind, CastError, CastKind};
pub use scalar::ScalarKind;
pub use subst::Substitution;
pub use value::ConstValue;

/// Source-level type. Identity is the canonical string, see [`Type::canonical`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Void,
    Scalar(ScalarKind),
    Pointer(Box<Type>),
    Array(Box<Type>, ArrayLen),
    /// Named aggregate, possibly generic. Producers also use this variant
    /// for every bare name they cannot classify; checking resolves it.
    Aggregate {
        name: String,
        args: Vec<TemplateArg>,
    },
    Const(Box<Type>),
    Function(FunctionType),
    TemplateParam(String),
    /// A resolved alias. Transparent for identity.
    Alias {
        name: String,
        target: Box<Type>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayLen {
    Fixed(u64),
    /// Bound by a non-type template parameter.
    Param(String),
    /// A compile-time expression not folded yet.
    Expr(NodeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateArg {
    Type(Type),
    Value(ConstValue),
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateArg::Type(ty) => write!(f, "{}", ty),
            TemplateArg::Value(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    pub ret: Box<Type>,
    pub params: Vec<Type>,
    pub variadic: bool,
}

/// Answers the layout questions a [`Type`] cannot answer on its own.
pub trait LayoutSource {
    fn pointer_bits(&self) -> u64;
    /// Field types of a registered aggregate, in layout order.
    fn aggregate_fields(&self, name: &str) -> Option<Vec<Type>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout {
    pub size: u64,
    pub align: u64,
    pub offsets: Vec<u64>,
}

const MAX_LAYOUT_DEPTH: usize = 64;

impl Type {
    pub fn int() -> Type {
        Type::Scalar(ScalarKind::Int)
    }

    pub fn bool() -> Type {
        Type::Scalar(ScalarKind::Bool)
    }

    /// Classifies a bare name: scalar keywords and `void` are built in,
    /// everything else is left as an aggregate reference.
    pub fn named(name: &str) -> Type {
        if name == "void" {
            return Type::Void;
        }
        match ScalarKind::from_str(name) {
            Ok(kind) => Type::Scalar(kind),
            Err(_) => Type::Aggregate {
                name: name.to_string(),
                args: Vec::new(),
            },
        }
    }

    pub fn generic(name: &str, args: Vec<TemplateArg>) -> Type {
        Type::Aggregate {
            name: name.to_string(),
            args,
        }
    }

    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn array_of(self, len: u64) -> Type {
        Type::Array(Box::new(self), ArrayLen::Fixed(len))
    }

    pub fn constant(self) -> Type {
        Type::Const(Box::new(self))
    }

    pub fn function(ret: Type, params: Vec<Type>, variadic: bool) -> Type {
        Type::Function(FunctionType {
            ret: Box::new(ret),
            params,
            variadic,
        })
    }

    /// The structural rendering used as the equality and lookup key.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    pub fn same_as(&self, other: &Type) -> bool {
        self.canonical() == other.canonical()
    }

    /// Peels const qualifiers and resolved aliases.
    pub fn strip(&self) -> &Type {
        match self {
            Type::Const(inner) => inner.strip(),
            Type::Alias { target, .. } => target.strip(),
            other => other,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) | Type::Array(inner, _) | Type::Const(inner) => Some(inner),
            Type::Alias { target, .. } => target.element_type(),
            _ => None,
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.strip() {
            Type::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn aggregate_name(&self) -> Option<String> {
        match self.strip() {
            ty @ Type::Aggregate { .. } => Some(ty.canonical()),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.strip(), Type::Void)
    }

    pub fn is_const(&self) -> bool {
        match self {
            Type::Const(_) => true,
            Type::Alias { target, .. } => target.is_const(),
            _ => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_kind().is_some()
    }

    pub fn is_integer(&self) -> bool {
        self.scalar_kind().is_some_and(ScalarKind::is_integer)
    }

    pub fn is_float(&self) -> bool {
        self.scalar_kind().is_some_and(ScalarKind::is_float)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.strip(), Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.strip(), Type::Array(..))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.strip(), Type::Aggregate { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.strip(), Type::Function(_))
    }

    /// The aggregate a member access on this type targets, looking through
    /// one level of pointer.
    pub fn member_owner(&self) -> Option<String> {
        match self.strip() {
            Type::Pointer(inner) => inner.aggregate_name(),
            other => other.aggregate_name(),
        }
    }

    pub fn has_template_params(&self) -> bool {
        match self {
            Type::TemplateParam(_) => true,
            Type::Pointer(inner) | Type::Const(inner) => inner.has_template_params(),
            Type::Array(inner, len) => {
                matches!(len, ArrayLen::Param(_)) || inner.has_template_params()
            }
            Type::Aggregate { args, .. } => args.iter().any(|arg| match arg {
                TemplateArg::Type(ty) => ty.has_template_params(),
                TemplateArg::Value(_) => false,
            }),
            Type::Function(func) => {
                func.ret.has_template_params()
                    || func.params.iter().any(Type::has_template_params)
            }
            Type::Alias { target, .. } => target.has_template_params(),
            Type::Void | Type::Scalar(_) => false,
        }
    }

    /// Size in bits. Scalars report their declared width (`bool` is 1),
    /// aggregates and arrays their laid-out storage.
    pub fn size_bits(&self, layouts: &dyn LayoutSource) -> Option<u64> {
        match self.strip() {
            Type::Scalar(kind) => Some(kind.bits()),
            _ => self.size_bytes(layouts)?.checked_mul(8),
        }
    }

    pub fn size_bytes(&self, layouts: &dyn LayoutSource) -> Option<u64> {
        self.size_bytes_at(layouts, 0)
    }

    fn size_bytes_at(&self, layouts: &dyn LayoutSource, depth: usize) -> Option<u64> {
        if depth > MAX_LAYOUT_DEPTH {
            return None;
        }
        match self.strip() {
            Type::Void => Some(0),
            Type::Scalar(kind) => Some(kind.bytes()),
            Type::Pointer(_) | Type::Function(_) => Some(layouts.pointer_bits() / 8),
            Type::Array(inner, ArrayLen::Fixed(len)) => {
                inner.size_bytes_at(layouts, depth + 1)?.checked_mul(*len)
            }
            Type::Array(..) | Type::TemplateParam(_) => None,
            ty @ Type::Aggregate { .. } => {
                let fields = layouts.aggregate_fields(&ty.canonical())?;
                Some(aggregate_layout_at(&fields, layouts, depth + 1)?.size)
            }
            Type::Const(_) | Type::Alias { .. } => None,
        }
    }

    /// Alignment in bytes.
    pub fn alignment(&self, layouts: &dyn LayoutSource) -> Option<u64> {
        self.alignment_at(layouts, 0)
    }

    fn alignment_at(&self, layouts: &dyn LayoutSource, depth: usize) -> Option<u64> {
        if depth > MAX_LAYOUT_DEPTH {
            return None;
        }
        match self.strip() {
            Type::Void => Some(1),
            Type::Scalar(kind) => Some(kind.align()),
            Type::Pointer(_) | Type::Function(_) => Some(layouts.pointer_bits() / 8),
            Type::Array(inner, _) => inner.alignment_at(layouts, depth + 1),
            ty @ Type::Aggregate { .. } => {
                let fields = layouts.aggregate_fields(&ty.canonical())?;
                Some(aggregate_layout_at(&fields, layouts, depth + 1)?.align)
            }
            Type::TemplateParam(_) | Type::Const(_) | Type::Alias { .. } => None,
        }
    }

    /// Replaces template parameters in place. Applying the same
    /// substitution twice is the same as applying it once.
    pub fn substitute(&mut self, subst: &Substitution) {
        if subst.is_empty() {
            return;
        }
        match self {
            Type::TemplateParam(name) => {
                if let Some(ty) = subst.get_type(name) {
                    *self = ty.clone();
                }
            }
            Type::Aggregate { name, args } => {
                if args.is_empty() {
                    if let Some(ty) = subst.get_type(name) {
                        *self = ty.clone();
                        return;
                    }
                }
                for arg in args.iter_mut() {
                    subst_template_arg(arg, subst);
                }
            }
            Type::Pointer(inner) | Type::Const(inner) => inner.substitute(subst),
            Type::Array(inner, len) => {
                inner.substitute(subst);
                if let ArrayLen::Param(name) = len {
                    if let Some(count) = subst.get_value(name).and_then(ConstValue::as_int) {
                        *len = ArrayLen::Fixed(count.max(0) as u64);
                    }
                }
            }
            Type::Function(func) => {
                func.ret.substitute(subst);
                for param in func.params.iter_mut() {
                    param.substitute(subst);
                }
            }
            Type::Alias { target, .. } => target.substitute(subst),
            Type::Void | Type::Scalar(_) => {}
        }
    }
}

fn subst_template_arg(arg: &mut TemplateArg, subst: &Substitution) {
    let TemplateArg::Type(ty) = arg else {
        return;
    };
    let bare_name = match ty {
        Type::TemplateParam(name) => Some(name.as_str()),
        Type::Aggregate { name, args } if args.is_empty() => Some(name.as_str()),
        _ => None,
    };
    // a bare name bound to a value is a non-type argument passed through
    if let Some(value) = bare_name.and_then(|name| subst.get_value(name)) {
        *arg = TemplateArg::Value(value.clone());
        return;
    }
    ty.substitute(subst);
}

/// Natural C layout of a field list.
pub fn aggregate_layout(fields: &[Type], layouts: &dyn LayoutSource) -> Option<AggregateLayout> {
    aggregate_layout_at(fields, layouts, 0)
}

fn aggregate_layout_at(
    fields: &[Type],
    layouts: &dyn LayoutSource,
    depth: usize,
) -> Option<AggregateLayout> {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut offset = 0u64;
    let mut max_align = 1u64;
    for field in fields {
        let align = field.alignment_at(layouts, depth)?.max(1);
        max_align = max_align.max(align);
        offset = checked_align_to(offset, align)?;
        offsets.push(offset);
        offset = offset.checked_add(field.size_bytes_at(layouts, depth)?)?;
    }
    Some(AggregateLayout {
        size: checked_align_to(offset, max_align)?,
        align: max_align,
        offsets,
    })
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Scalar(kind) => write!(f, "{}", kind),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array(inner, ArrayLen::Fixed(len)) => write!(f, "{}[{}]", inner, len),
            Type::Array(inner, ArrayLen::Param(name)) => write!(f, "{}[{}]", inner, name),
            Type::Array(inner, ArrayLen::Expr(id)) => write!(f, "{}[#{}]", inner, id),
            Type::Aggregate { name, args } if args.is_empty() => write!(f, "{}", name),
            Type::Aggregate { name, args } => write!(f, "{}<{}>", name, args.iter().join(",")),
            Type::Const(inner) => write!(f, "{}", inner),
            Type::Function(func) => {
                let mut params = func.params.iter().map(Type::to_string).collect_vec();
                if func.variadic {
                    params.push("...".into());
                }
                write!(f, "{}({})", func.ret, params.join(","))
            }
            Type::TemplateParam(name) => write!(f, "{}", name),
            Type::Alias { target, .. } => write!(f, "{}", target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct Layouts(HashMap<String, Vec<Type>>);

    impl LayoutSource for Layouts {
        fn pointer_bits(&self) -> u64 {
            64
        }

        fn aggregate_fields(&self, name: &str) -> Option<Vec<Type>> {
            self.0.get(name).cloned()
        }
    }

    fn layouts() -> Layouts {
        let mut map = HashMap::new();
        map.insert("Pair".to_string(), vec![Type::int(), Type::int()]);
        map.insert(
            "Mixed".to_string(),
            vec![
                Type::Scalar(ScalarKind::Char),
                Type::Scalar(ScalarKind::Long),
                Type::Scalar(ScalarKind::Short),
            ],
        );
        Layouts(map)
    }

    #[test]
    fn canonical_strings_are_structural() {
        let a = Type::generic("Vec", vec![TemplateArg::Type(Type::int())]).pointer_to();
        let b = Type::Pointer(Box::new(Type::Aggregate {
            name: "Vec".into(),
            args: vec![TemplateArg::Type(Type::named("int"))],
        }));
        assert_eq!(a.canonical(), "Vec<int>*");
        assert!(a.same_as(&b));
        assert_eq!(Type::int().array_of(4).canonical(), "int[4]");
        assert_eq!(Type::int().constant().canonical(), "int");
    }

    #[test]
    fn aliases_are_transparent() {
        let alias = Type::Alias {
            name: "Size".into(),
            target: Box::new(Type::Scalar(ScalarKind::Ulong)),
        };
        assert!(alias.same_as(&Type::Scalar(ScalarKind::Ulong)));
        assert!(alias.is_integer());
    }

    #[test]
    fn layout_follows_natural_alignment() {
        let layouts = layouts();
        assert_eq!(Type::named("Pair").size_bits(&layouts), Some(64));
        assert_eq!(Type::named("Mixed").size_bytes(&layouts), Some(24));
        assert_eq!(Type::named("Mixed").alignment(&layouts), Some(8));
        assert_eq!(Type::bool().size_bits(&layouts), Some(1));
        assert_eq!(Type::bool().array_of(3).size_bits(&layouts), Some(24));
        assert_eq!(Type::named("Missing").size_bits(&layouts), None);
    }

    #[test]
    fn substitution_is_idempotent() {
        let mut subst = Substitution::new();
        subst.bind_type("T", Type::int());
        subst.bind_value("N", ConstValue::int(4));

        let mut ty = Type::Array(
            Box::new(Type::named("T").pointer_to()),
            ArrayLen::Param("N".into()),
        );
        ty.substitute(&subst);
        assert_eq!(ty.canonical(), "int*[4]");
        let once = ty.clone();
        ty.substitute(&subst);
        assert_eq!(ty, once);

        let mut generic = Type::generic(
            "Buf",
            vec![
                TemplateArg::Type(Type::TemplateParam("T".into())),
                TemplateArg::Type(Type::named("N")),
            ],
        );
        generic.substitute(&subst);
        assert_eq!(generic.canonical(), "Buf<int,4>");
    }
}
