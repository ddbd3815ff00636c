use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ScalarKind, Type};

/// A compile-time value: the result of constant folding and the payload of
/// non-type template arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i128, ScalarKind),
    Float(f64, ScalarKind),
    Bool(bool),
    Str(String),
    Null,
}

impl ConstValue {
    pub fn int(value: i128) -> Self {
        ConstValue::Int(value, ScalarKind::for_int_literal(value))
    }

    pub fn ty(&self) -> Type {
        match self {
            ConstValue::Int(_, kind) | ConstValue::Float(_, kind) => Type::Scalar(*kind),
            ConstValue::Bool(_) => Type::Scalar(ScalarKind::Bool),
            ConstValue::Str(_) => Type::Scalar(ScalarKind::Char).pointer_to(),
            ConstValue::Null => Type::Void.pointer_to(),
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            ConstValue::Int(v, _) => Some(*v),
            ConstValue::Bool(b) => Some(*b as i128),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConstValue::Float(v, _) => Some(*v),
            ConstValue::Int(v, _) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn truthy(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            ConstValue::Int(v, _) => Some(*v != 0),
            ConstValue::Float(v, _) => Some(*v != 0.0),
            ConstValue::Null => Some(false),
            ConstValue::Str(_) => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v, _) => write!(f, "{}", v),
            ConstValue::Float(v, _) => write!(f, "{:?}", v),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Str(s) => write!(f, "{:?}", s),
            ConstValue::Null => write!(f, "null"),
        }
    }
}
