use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "+=")]
    AddAssign,
    #[strum(serialize = "-=")]
    SubAssign,
    #[strum(serialize = "*=")]
    MulAssign,
    #[strum(serialize = "/=")]
    DivAssign,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Ne | Lt | Gt | Le | Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_assignment(self) -> bool {
        use BinaryOp::*;
        matches!(self, Assign | AddAssign | SubAssign | MulAssign | DivAssign)
    }

    /// The arithmetic part of a compound assignment.
    pub fn compound_base(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubAssign => Some(BinaryOp::Sub),
            BinaryOp::MulAssign => Some(BinaryOp::Mul),
            BinaryOp::DivAssign => Some(BinaryOp::Div),
            _ => None,
        }
    }

    /// The operator-table tag an aggregate can overload this operator with.
    pub fn overload_tag(self) -> Option<OperatorTag> {
        use BinaryOp::*;
        let tag = match self {
            Add => OperatorTag::Add,
            Sub => OperatorTag::Sub,
            Mul => OperatorTag::Mul,
            Div => OperatorTag::Div,
            Rem => OperatorTag::Rem,
            BitAnd => OperatorTag::BitAnd,
            BitOr => OperatorTag::BitOr,
            BitXor => OperatorTag::BitXor,
            Shl => OperatorTag::Shl,
            Shr => OperatorTag::Shr,
            Eq => OperatorTag::Eq,
            Ne => OperatorTag::Ne,
            Lt => OperatorTag::Lt,
            Gt => OperatorTag::Gt,
            Le => OperatorTag::Le,
            Ge => OperatorTag::Ge,
            And | Or | Assign | AddAssign | SubAssign | MulAssign | DivAssign => return None,
        };
        Some(tag)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitNot,
    #[strum(serialize = "*")]
    Deref,
    #[strum(serialize = "&")]
    AddrOf,
}

/// Key of an aggregate's operator table. Renders as the operator function
/// name, e.g. `(==)`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum OperatorTag {
    #[strum(serialize = "(+)")]
    Add,
    #[strum(serialize = "(-)")]
    Sub,
    #[strum(serialize = "(*)")]
    Mul,
    #[strum(serialize = "(/)")]
    Div,
    #[strum(serialize = "(%)")]
    Rem,
    #[strum(serialize = "(&)")]
    BitAnd,
    #[strum(serialize = "(|)")]
    BitOr,
    #[strum(serialize = "(^)")]
    BitXor,
    #[strum(serialize = "(<<)")]
    Shl,
    #[strum(serialize = "(>>)")]
    Shr,
    #[strum(serialize = "(==)")]
    Eq,
    #[strum(serialize = "(!=)")]
    Ne,
    #[strum(serialize = "(<)")]
    Lt,
    #[strum(serialize = "(>)")]
    Gt,
    #[strum(serialize = "(<=)")]
    Le,
    #[strum(serialize = "(>=)")]
    Ge,
    #[strum(serialize = "([])")]
    Index,
    #[strum(serialize = "([]=)")]
    IndexAssign,
}

impl OperatorTag {
    /// The positive operator whose negation stands in when this one is
    /// not defined.
    pub fn negated_counterpart(self) -> Option<OperatorTag> {
        match self {
            OperatorTag::Ne => Some(OperatorTag::Eq),
            OperatorTag::Ge => Some(OperatorTag::Lt),
            OperatorTag::Le => Some(OperatorTag::Gt),
            _ => None,
        }
    }

    pub fn returns_bool(self) -> bool {
        use OperatorTag::*;
        matches!(self, Eq | Ne | Lt | Gt | Le | Ge)
    }
}
