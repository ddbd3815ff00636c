//! Arena-allocated syntax tree handed over by the parser.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::span::{Location, SourceMap, Span};

mod builder;
mod node;
mod ops;

pub use builder::AstBuilder;
pub use node::*;
pub use ops::{BinaryOp, OperatorTag, UnaryOp};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// One compilation unit's nodes. Nodes reference each other by [`NodeId`];
/// the arena only grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
    #[serde(default)]
    sources: SourceMap,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.push(Node { kind, span });
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Panics on an id from another arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut SourceMap {
        &mut self.sources
    }

    pub fn locate(&self, id: NodeId) -> Location {
        self.sources.locate(self.span(id))
    }

    /// Deep-copies the subtree rooted at `id` and returns the new root.
    /// Types embedded in the nodes are cloned, not shared.
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        let kind = node.kind.map_children(&mut |child| self.copy_subtree(child));
        self.push(kind, node.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use pretty_assertions::assert_eq;

    #[test]
    fn copy_subtree_produces_fresh_ids() {
        let mut b = AstBuilder::new("copy.em");
        let x = b.ident("x");
        let one = b.int(1);
        let sum = b.binary(BinaryOp::Add, x, one);
        let ret = b.ret(Some(sum));
        let body = b.block(vec![ret]);
        let func = b.function(FunctionDecl::new("inc", Type::int()).param("x", Type::int()).body(body));
        let mut ast = b.finish();

        let before = ast.len();
        let copy = ast.copy_subtree(func);
        assert_eq!(ast.len(), before * 2);
        assert_ne!(copy, func);

        let NodeKind::Function(original) = ast.kind(func).clone() else {
            panic!("expected function");
        };
        let NodeKind::Function(copied) = ast.kind(copy).clone() else {
            panic!("expected function");
        };
        assert_eq!(original.name, copied.name);
        assert_ne!(original.body, copied.body);
        assert_eq!(
            ast.kind(original.body.unwrap()).clone().map_children(&mut |_| NodeId(0)),
            ast.kind(copied.body.unwrap()).clone().map_children(&mut |_| NodeId(0)),
        );
    }

    #[test]
    fn copies_reach_field_defaults_and_switch_cases() {
        let mut b = AstBuilder::new("copy.em");
        let seven = b.int(7);
        let agg = b.aggregate(AggregateDecl::new("Cfg").field_default("n", Type::int(), seven));
        let value = b.ident("v");
        let case = b.int(1);
        let body = b.break_();
        let switch = b.switch(value, vec![(case, body)], None);
        let mut ast = b.finish();

        let agg_copy = ast.copy_subtree(agg);
        let NodeKind::Aggregate(copied) = ast.kind(agg_copy).clone() else {
            panic!("expected aggregate");
        };
        let default = copied.fields[0].default.unwrap();
        assert_ne!(default, seven);
        assert_eq!(ast.kind(default), &NodeKind::Int(7));

        let switch_copy = ast.copy_subtree(switch);
        let NodeKind::Switch { cases, .. } = ast.kind(switch_copy).clone() else {
            panic!("expected switch");
        };
        assert_ne!(cases[0].value, case);
        assert_eq!(ast.kind(cases[0].body), &NodeKind::Break);
    }

    #[test]
    fn json_interchange_keeps_nodes_and_files() {
        let mut b = AstBuilder::new("json.em");
        b.at_line(7);
        let value = b.int(42);
        let ast = b.finish();

        let text = ast.to_json().unwrap();
        let back = Ast::from_json(&text).unwrap();
        assert_eq!(back.kind(value), &NodeKind::Int(42));
        assert_eq!(back.locate(value), Location::new("json.em", 7));
    }
}
