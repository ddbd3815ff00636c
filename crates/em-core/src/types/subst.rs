use std::collections::BTreeMap;

use super::{ConstValue, Type};

/// Active mapping from template-parameter names to concrete types and
/// non-type values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    types: BTreeMap<String, Type>,
    values: BTreeMap<String, ConstValue>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_type(&mut self, name: impl Into<String>, ty: Type) {
        self.types.insert(name.into(), ty);
    }

    pub fn bind_value(&mut self, name: impl Into<String>, value: ConstValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get_type(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn get_value(&self, name: &str) -> Option<&ConstValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len() + self.values.len()
    }
}
