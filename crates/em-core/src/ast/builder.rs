use super::*;
use crate::span::{FileId, Span};
use crate::types::{TemplateArg, Type};

/// Compact construction of syntax trees, used by producers and tests.
/// Every node gets the current file and line.
#[derive(Debug)]
pub struct AstBuilder {
    ast: Ast,
    file: FileId,
    line: u32,
}

impl AstBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        let mut ast = Ast::new();
        let file = ast.sources_mut().add_file(file);
        Self { ast, file, line: 1 }
    }

    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn finish(self) -> Ast {
        self.ast
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        self.ast.push(kind, Span::new(self.file, self.line))
    }

    pub fn int(&mut self, value: i128) -> NodeId {
        self.push(NodeKind::Int(value))
    }

    pub fn float(&mut self, value: f64) -> NodeId {
        self.push(NodeKind::Float(value))
    }

    pub fn bool(&mut self, value: bool) -> NodeId {
        self.push(NodeKind::Bool(value))
    }

    pub fn char(&mut self, value: u8) -> NodeId {
        self.push(NodeKind::Char(value))
    }

    pub fn str(&mut self, value: &str) -> NodeId {
        self.push(NodeKind::Str(value.to_string()))
    }

    pub fn null(&mut self) -> NodeId {
        self.push(NodeKind::Null)
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.generic_ident(name, Vec::new())
    }

    pub fn generic_ident(&mut self, name: &str, template_args: Vec<TemplateArg>) -> NodeId {
        self.push(NodeKind::Ident {
            name: name.to_string(),
            template_args,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        self.push(NodeKind::Unary { op, operand })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(NodeKind::Binary { op, lhs, rhs })
    }

    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinaryOp::Assign, lhs, rhs)
    }

    pub fn get(&mut self, base: NodeId, name: &str) -> NodeId {
        self.push(NodeKind::Get {
            base,
            name: name.to_string(),
        })
    }

    pub fn index(&mut self, base: NodeId, index: NodeId) -> NodeId {
        self.push(NodeKind::Index { base, index })
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Call { callee, args })
    }

    /// `name(args)`
    pub fn call_named(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.ident(name);
        self.call(callee, args)
    }

    /// `name<targs>(args)`
    pub fn call_generic(
        &mut self,
        name: &str,
        template_args: Vec<TemplateArg>,
        args: Vec<NodeId>,
    ) -> NodeId {
        let callee = self.generic_ident(name, template_args);
        self.call(callee, args)
    }

    /// `base.name(args)`
    pub fn method_call(&mut self, base: NodeId, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.get(base, name);
        self.call(callee, args)
    }

    pub fn cast(&mut self, ty: Type, value: NodeId) -> NodeId {
        self.push(NodeKind::Cast { ty, value })
    }

    pub fn size_of(&mut self, ty: Type) -> NodeId {
        self.push(NodeKind::SizeOf(ty))
    }

    pub fn array_lit(&mut self, values: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::ArrayLit(values))
    }

    pub fn aggregate_lit(&mut self, ty: Type, values: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::AggregateLit { ty, values })
    }

    pub fn builtin(&mut self, name: &str, args: Vec<BuiltinArg>) -> NodeId {
        self.push(NodeKind::Builtin {
            name: name.to_string(),
            args,
        })
    }

    pub fn block(&mut self, items: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Block(items))
    }

    pub fn if_(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
        self.push(NodeKind::If {
            cond,
            then,
            otherwise,
        })
    }

    pub fn while_(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.push(NodeKind::While { cond, body })
    }

    pub fn for_(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    ) -> NodeId {
        self.push(NodeKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    /// `foreach (name in data)`
    pub fn foreach(&mut self, name: &str, data: NodeId, length: Option<NodeId>, body: NodeId) -> NodeId {
        self.push(NodeKind::Foreach {
            name: name.to_string(),
            data,
            length,
            body,
        })
    }

    /// `switch (value)` with `(case value, body)` pairs.
    pub fn switch(
        &mut self,
        value: NodeId,
        cases: Vec<(NodeId, NodeId)>,
        default: Option<NodeId>,
    ) -> NodeId {
        let cases = cases
            .into_iter()
            .map(|(value, body)| SwitchCase { value, body })
            .collect();
        self.push(NodeKind::Switch {
            value,
            cases,
            default,
        })
    }

    pub fn defer(&mut self, stmt: NodeId) -> NodeId {
        self.push(NodeKind::Defer(stmt))
    }

    pub fn destroy(&mut self, value: NodeId) -> NodeId {
        self.push(NodeKind::Destroy(value))
    }

    pub fn break_(&mut self) -> NodeId {
        self.push(NodeKind::Break)
    }

    pub fn continue_(&mut self) -> NodeId {
        self.push(NodeKind::Continue)
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.push(NodeKind::Return(value))
    }

    pub fn comptime_if(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
        self.push(NodeKind::ComptimeIf {
            cond,
            then,
            otherwise,
        })
    }

    pub fn var(&mut self, name: &str, ty: Option<Type>, init: Option<NodeId>) -> NodeId {
        self.push(NodeKind::Var(VariableDecl {
            name: name.to_string(),
            ty,
            init,
            is_const: false,
        }))
    }

    pub fn const_var(&mut self, name: &str, ty: Option<Type>, init: NodeId) -> NodeId {
        self.push(NodeKind::Var(VariableDecl {
            name: name.to_string(),
            ty,
            init: Some(init),
            is_const: true,
        }))
    }

    pub fn function(&mut self, decl: FunctionDecl) -> NodeId {
        self.push(NodeKind::Function(decl))
    }

    pub fn aggregate(&mut self, decl: AggregateDecl) -> NodeId {
        self.push(NodeKind::Aggregate(decl))
    }

    pub fn alias_type(&mut self, name: &str, ty: Type) -> NodeId {
        self.push(NodeKind::Alias(AliasDecl {
            name: name.to_string(),
            target: AliasTarget::Type(ty),
        }))
    }

    pub fn alias_value(&mut self, name: &str, value: NodeId) -> NodeId {
        self.push(NodeKind::Alias(AliasDecl {
            name: name.to_string(),
            target: AliasTarget::Value(value),
        }))
    }

    pub fn namespace(&mut self, name: &str, items: Vec<NodeId>) -> NodeId {
        self.push(NodeKind::Namespace {
            name: name.to_string(),
            items,
        })
    }
}
