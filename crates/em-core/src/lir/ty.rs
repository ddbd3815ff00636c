#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    I1,
    I8,
    I16,
    I32,
    I64,
    I128,
    F16,
    BF16,
    F32,
    F64,
    F128,
    Ptr(Box<Ty>),
    Array(Box<Ty>, u64),
    Struct {
        fields: Vec<Ty>,
        packed: bool,
        name: Option<String>,
    },
    Function {
        return_type: Box<Ty>,
        param_types: Vec<Ty>,
        is_variadic: bool,
    },
    Vector(Box<Ty>, u32),
    Void,
}

impl Ty {
    pub fn ptr(inner: Ty) -> Ty {
        Ty::Ptr(Box::new(inner))
    }

    pub fn int_of_bits(bits: u64) -> Option<Ty> {
        match bits {
            1 => Some(Ty::I1),
            8 => Some(Ty::I8),
            16 => Some(Ty::I16),
            32 => Some(Ty::I32),
            64 => Some(Ty::I64),
            128 => Some(Ty::I128),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Ty::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Type reached by indexing into an aggregate with a constant index.
    pub fn element(&self, index: u64) -> Option<&Ty> {
        match self {
            Ty::Array(elem, _) | Ty::Vector(elem, _) => Some(elem),
            Ty::Struct { fields, .. } => fields.get(index as usize),
            _ => None,
        }
    }
}
