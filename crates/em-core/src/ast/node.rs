use serde::{Deserialize, Serialize};

use super::{BinaryOp, NodeId, OperatorTag, UnaryOp};
use crate::types::{ScalarKind, TemplateArg, Type};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Int(i128),
    Float(f64),
    Bool(bool),
    Char(u8),
    Str(String),
    Null,
    /// A name, optionally with explicit template arguments (`max<int>`).
    Ident {
        name: String,
        template_args: Vec<TemplateArg>,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// Member access `base.name`; pointers are looked through.
    Get {
        base: NodeId,
        name: String,
    },
    Index {
        base: NodeId,
        index: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Cast {
        ty: Type,
        value: NodeId,
    },
    SizeOf(Type),
    /// `[a, b, c]`; the element type comes from the first value.
    ArrayLit(Vec<NodeId>),
    /// `Point { 1, 2 }` with values in field order.
    AggregateLit {
        ty: Type,
        values: Vec<NodeId>,
    },
    /// `@name(args)`.
    Builtin {
        name: String,
        args: Vec<BuiltinArg>,
    },
    Block(Vec<NodeId>),
    If {
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    },
    /// `foreach (name in data)`; `length` is required when `data` is a pointer.
    Foreach {
        name: String,
        data: NodeId,
        length: Option<NodeId>,
        body: NodeId,
    },
    /// Cases never fall through.
    Switch {
        value: NodeId,
        cases: Vec<SwitchCase>,
        default: Option<NodeId>,
    },
    Break,
    Continue,
    Return(Option<NodeId>),
    /// Runs the statement when the function exits, if it was reached.
    Defer(NodeId),
    /// `~value`: calls the aggregate's destructor, if it has one.
    Destroy(NodeId),
    /// `@if(cond) { ... } @else { ... }`, resolved at compile time.
    ComptimeIf {
        cond: NodeId,
        then: NodeId,
        otherwise: Option<NodeId>,
    },
    Var(VariableDecl),
    Function(FunctionDecl),
    Aggregate(AggregateDecl),
    Alias(AliasDecl),
    Namespace {
        name: String,
        items: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuiltinArg {
    Type(Type),
    Expr(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    /// The C-compatible convention aggregate parameters are lowered for.
    Cdecl64,
    FastCc,
    ColdCc,
    /// Keep the plain source name as the link name.
    C,
    LinkName(String),
    Vararg,
    Inline,
    /// Not inherited by extending aggregates.
    NoCopy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateParamKind {
    Type,
    Value(ScalarKind),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParam {
    pub name: String,
    pub kind: TemplateParamKind,
}

impl TemplateParam {
    pub fn ty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TemplateParamKind::Type,
        }
    }

    pub fn value(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind: TemplateParamKind::Value(kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    /// `None` for external declarations.
    pub body: Option<NodeId>,
    pub modifiers: Vec<Modifier>,
    pub template_params: Vec<TemplateParam>,
    /// Set on operator functions declared inside an aggregate.
    pub operator: Option<OperatorTag>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret,
            body: None,
            modifiers: Vec::new(),
            template_params: Vec::new(),
            operator: None,
        }
    }

    /// `this(...)` inside an aggregate; called as the aggregate's name.
    pub fn constructor() -> Self {
        Self::new(CONSTRUCTOR, Type::Void)
    }

    pub fn destructor() -> Self {
        Self::new(DESTRUCTOR, Type::Void)
    }

    pub fn operator(tag: OperatorTag, ret: Type) -> Self {
        Self {
            operator: Some(tag),
            ..Self::new(tag.to_string(), ret)
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn body(mut self, body: NodeId) -> Self {
        self.body = Some(body);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn template(mut self, param: TemplateParam) -> Self {
        self.template_params.push(param);
        self
    }

    pub fn has_modifier(&self, modifier: &Modifier) -> bool {
        self.modifiers.contains(modifier)
    }

    pub fn link_name(&self) -> Option<&str> {
        self.modifiers.iter().find_map(|m| match m {
            Modifier::LinkName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn is_template(&self) -> bool {
        !self.template_params.is_empty()
    }
}

pub const CONSTRUCTOR: &str = "this";
pub const DESTRUCTOR: &str = "~this";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    /// Used when the aggregate is default-initialized.
    pub default: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDecl {
    pub name: String,
    pub template_params: Vec<TemplateParam>,
    pub base: Option<Type>,
    pub fields: Vec<FieldDecl>,
    /// Function nodes: methods and operator functions.
    pub methods: Vec<NodeId>,
}

impl AggregateDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_params: Vec::new(),
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    pub fn field_default(mut self, name: impl Into<String>, ty: Type, value: NodeId) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
            default: Some(value),
        });
        self
    }

    pub fn method(mut self, method: NodeId) -> Self {
        self.methods.push(method);
        self
    }

    pub fn extends(mut self, base: Type) -> Self {
        self.base = Some(base);
        self
    }

    pub fn template(mut self, param: TemplateParam) -> Self {
        self.template_params.push(param);
        self
    }

    pub fn is_template(&self) -> bool {
        !self.template_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    /// Inferred from the initializer when absent.
    pub ty: Option<Type>,
    pub init: Option<NodeId>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AliasTarget {
    Type(Type),
    Value(NodeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDecl {
    pub name: String,
    pub target: AliasTarget,
}

impl NodeKind {
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::Function(_)
                | NodeKind::Aggregate(_)
                | NodeKind::Alias(_)
                | NodeKind::Namespace { .. }
        )
    }

    /// Rebuilds the node with every child id passed through `f`.
    pub fn map_children(&self, f: &mut impl FnMut(NodeId) -> NodeId) -> NodeKind {
        match self {
            NodeKind::Int(_)
            | NodeKind::Float(_)
            | NodeKind::Bool(_)
            | NodeKind::Char(_)
            | NodeKind::Str(_)
            | NodeKind::Null
            | NodeKind::Ident { .. }
            | NodeKind::SizeOf(_)
            | NodeKind::Break
            | NodeKind::Continue => self.clone(),
            NodeKind::Unary { op, operand } => NodeKind::Unary {
                op: *op,
                operand: f(*operand),
            },
            NodeKind::Binary { op, lhs, rhs } => NodeKind::Binary {
                op: *op,
                lhs: f(*lhs),
                rhs: f(*rhs),
            },
            NodeKind::Get { base, name } => NodeKind::Get {
                base: f(*base),
                name: name.clone(),
            },
            NodeKind::Index { base, index } => NodeKind::Index {
                base: f(*base),
                index: f(*index),
            },
            NodeKind::Call { callee, args } => NodeKind::Call {
                callee: f(*callee),
                args: args.iter().map(|a| f(*a)).collect(),
            },
            NodeKind::Cast { ty, value } => NodeKind::Cast {
                ty: ty.clone(),
                value: f(*value),
            },
            NodeKind::ArrayLit(values) => NodeKind::ArrayLit(values.iter().map(|v| f(*v)).collect()),
            NodeKind::AggregateLit { ty, values } => NodeKind::AggregateLit {
                ty: ty.clone(),
                values: values.iter().map(|v| f(*v)).collect(),
            },
            NodeKind::Builtin { name, args } => NodeKind::Builtin {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|arg| match arg {
                        BuiltinArg::Expr(id) => BuiltinArg::Expr(f(*id)),
                        BuiltinArg::Type(ty) => BuiltinArg::Type(ty.clone()),
                    })
                    .collect(),
            },
            NodeKind::Block(items) => NodeKind::Block(items.iter().map(|i| f(*i)).collect()),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => NodeKind::If {
                cond: f(*cond),
                then: f(*then),
                otherwise: map_opt(otherwise, f),
            },
            NodeKind::While { cond, body } => NodeKind::While {
                cond: f(*cond),
                body: f(*body),
            },
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => NodeKind::For {
                init: map_opt(init, f),
                cond: map_opt(cond, f),
                step: map_opt(step, f),
                body: f(*body),
            },
            NodeKind::Foreach {
                name,
                data,
                length,
                body,
            } => NodeKind::Foreach {
                name: name.clone(),
                data: f(*data),
                length: map_opt(length, f),
                body: f(*body),
            },
            NodeKind::Switch {
                value,
                cases,
                default,
            } => NodeKind::Switch {
                value: f(*value),
                cases: cases
                    .iter()
                    .map(|case| SwitchCase {
                        value: f(case.value),
                        body: f(case.body),
                    })
                    .collect(),
                default: map_opt(default, f),
            },
            NodeKind::Return(value) => NodeKind::Return(map_opt(value, f)),
            NodeKind::Defer(stmt) => NodeKind::Defer(f(*stmt)),
            NodeKind::Destroy(value) => NodeKind::Destroy(f(*value)),
            NodeKind::ComptimeIf {
                cond,
                then,
                otherwise,
            } => NodeKind::ComptimeIf {
                cond: f(*cond),
                then: f(*then),
                otherwise: map_opt(otherwise, f),
            },
            NodeKind::Var(decl) => NodeKind::Var(VariableDecl {
                init: map_opt(&decl.init, f),
                ..decl.clone()
            }),
            NodeKind::Function(decl) => NodeKind::Function(FunctionDecl {
                body: map_opt(&decl.body, f),
                ..decl.clone()
            }),
            NodeKind::Aggregate(decl) => NodeKind::Aggregate(AggregateDecl {
                fields: decl
                    .fields
                    .iter()
                    .map(|field| FieldDecl {
                        default: map_opt(&field.default, f),
                        ..field.clone()
                    })
                    .collect(),
                methods: decl.methods.iter().map(|m| f(*m)).collect(),
                ..decl.clone()
            }),
            NodeKind::Alias(decl) => NodeKind::Alias(AliasDecl {
                name: decl.name.clone(),
                target: match &decl.target {
                    AliasTarget::Value(id) => AliasTarget::Value(f(*id)),
                    AliasTarget::Type(ty) => AliasTarget::Type(ty.clone()),
                },
            }),
            NodeKind::Namespace { name, items } => NodeKind::Namespace {
                name: name.clone(),
                items: items.iter().map(|i| f(*i)).collect(),
            },
        }
    }
}

fn map_opt(id: &Option<NodeId>, f: &mut impl FnMut(NodeId) -> NodeId) -> Option<NodeId> {
    id.map(|inner| f(inner))
}
