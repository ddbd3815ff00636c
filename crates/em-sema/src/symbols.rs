use std::collections::{BTreeMap, HashMap};

use em_core::ast::{NodeId, OperatorTag};
use em_core::lir::CallingConvention;
use em_core::types::{ConstValue, LayoutSource, Substitution, Type};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallConv {
    #[default]
    Default,
    /// C-compatible x86-64 convention; aggregate parameters are lowered.
    Cdecl64,
    Fast,
    Cold,
}

impl CallConv {
    pub fn lir(self) -> CallingConvention {
        match self {
            CallConv::Default => CallingConvention::C,
            CallConv::Cdecl64 => CallingConvention::X86_64SysV,
            CallConv::Fast => CallingConvention::Fast,
            CallConv::Cold => CallingConvention::Cold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSymbol {
    pub decl: NodeId,
    /// Qualified display name: `math::add`, `Vec<int>.push`, `max<int>`.
    pub name: String,
    /// `name` followed by the parameter signature; the table key.
    pub key: String,
    pub link_name: String,
    /// Resolved parameter types, `this` included for methods.
    pub params: Vec<Type>,
    pub param_names: Vec<String>,
    pub ret: Type,
    pub variadic: bool,
    pub conv: CallConv,
    pub owner: Option<String>,
    /// Set on `this(...)` constructors; they are called by the aggregate's
    /// name and return the built value.
    pub constructor_of: Option<String>,
    pub namespace: Vec<String>,
    /// Template instances and inherited copies.
    pub is_instance: bool,
    pub is_extern: bool,
    /// Environment the body is emitted under.
    pub subst: Substitution,
}

impl FunctionSymbol {
    pub fn fn_type(&self) -> Type {
        Type::function(self.ret.clone(), self.params.clone(), self.variadic)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSymbol {
    pub name: String,
    pub ty: Type,
    pub index: u32,
    /// Initializer used when the aggregate is default-initialized.
    pub default: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSymbol {
    pub decl: NodeId,
    /// Canonical name, e.g. `Point` or `Vec<int>`.
    pub name: String,
    pub fields: Vec<FieldSymbol>,
    pub base: Option<String>,
    /// Operator tag to argument signature to function key.
    pub operators: BTreeMap<OperatorTag, BTreeMap<String, String>>,
    /// Method keys to emit with the type, inherited copies included.
    pub methods: Vec<String>,
    pub is_instance: bool,
    pub namespace: Vec<String>,
    pub subst: Substitution,
}

impl AggregateSymbol {
    pub fn field(&self, name: &str) -> Option<&FieldSymbol> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_types(&self) -> Vec<Type> {
        self.fields.iter().map(|field| field.ty.clone()).collect()
    }

    pub fn has_defaults(&self) -> bool {
        self.fields.iter().any(|field| field.default.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSymbol {
    pub decl: NodeId,
    pub name: String,
    pub link_name: String,
    pub ty: Type,
    pub is_const: bool,
    pub value: Option<ConstValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AliasEntry {
    Type(Type),
    Value(ConstValue),
}

/// Where a template declaration lives.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSymbol {
    pub decl: NodeId,
    pub namespace: Vec<String>,
}

/// Global tables filled by checking and read by emission. Keys are
/// qualified names; function keys carry the parameter signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTables {
    pub(crate) functions: HashMap<String, FunctionSymbol>,
    /// Qualified base name to overload keys, in declaration order.
    pub(crate) overloads: HashMap<String, Vec<String>>,
    pub(crate) templates: HashMap<String, TemplateSymbol>,
    /// Instance name (`max<int>`) to function key.
    pub(crate) instances: HashMap<String, String>,
    pub(crate) aggregates: HashMap<String, AggregateSymbol>,
    pub(crate) aggregate_templates: HashMap<String, TemplateSymbol>,
    /// Aggregates seen by the declaration pre-pass, checked on demand.
    pub(crate) declared_aggregates: HashMap<String, TemplateSymbol>,
    /// `(aggregate, method)` to overload keys.
    pub(crate) methods: HashMap<(String, String), Vec<String>>,
    pub(crate) fields: HashMap<(String, String), FieldSymbol>,
    pub(crate) globals: HashMap<String, GlobalSymbol>,
    pub(crate) aliases: HashMap<String, AliasEntry>,
    pub(crate) decl_functions: HashMap<NodeId, String>,
    pub(crate) decl_aggregates: HashMap<NodeId, String>,
}

impl SymbolTables {
    pub fn function(&self, key: &str) -> Option<&FunctionSymbol> {
        self.functions.get(key)
    }

    pub fn overloads(&self, name: &str) -> &[String] {
        self.overloads.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn aggregate(&self, name: &str) -> Option<&AggregateSymbol> {
        self.aggregates.get(name)
    }

    pub fn field(&self, owner: &str, name: &str) -> Option<&FieldSymbol> {
        self.fields.get(&(owner.to_string(), name.to_string()))
    }

    pub fn methods(&self, owner: &str, name: &str) -> &[String] {
        self.methods
            .get(&(owner.to_string(), name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn global(&self, name: &str) -> Option<&GlobalSymbol> {
        self.globals.get(name)
    }

    pub fn alias(&self, name: &str) -> Option<&AliasEntry> {
        self.aliases.get(name)
    }

    pub fn is_template(&self, name: &str) -> bool {
        self.templates.contains_key(name) || self.aggregate_templates.contains_key(name)
    }

    pub fn instance(&self, name: &str) -> Option<&FunctionSymbol> {
        self.instances.get(name).and_then(|key| self.functions.get(key))
    }

    pub(crate) fn function_for_decl(&self, decl: NodeId) -> Option<&FunctionSymbol> {
        self.decl_functions
            .get(&decl)
            .and_then(|key| self.functions.get(key))
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Layout queries answered from the aggregate table.
pub(crate) struct TableLayout<'a> {
    pub symbols: &'a SymbolTables,
    pub pointer_bits: u64,
}

impl LayoutSource for TableLayout<'_> {
    fn pointer_bits(&self) -> u64 {
        self.pointer_bits
    }

    fn aggregate_fields(&self, name: &str) -> Option<Vec<Type>> {
        self.symbols.aggregates.get(name).map(AggregateSymbol::field_types)
    }
}
