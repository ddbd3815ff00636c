use std::collections::HashMap;

use em_core::lir::{BasicBlockId, LirValue};
use em_core::span::Span;
use em_core::types::Type;

use crate::symbols::AliasEntry;

#[derive(Debug, Clone)]
pub(crate) struct LocalVar {
    pub name: String,
    pub ty: Type,
    /// Pointer to the variable's storage.
    pub slot: LirValue,
    pub span: Span,
    pub param_index: Option<usize>,
    pub used: bool,
}

#[derive(Debug, Clone, Default)]
struct Frame {
    vars: Vec<LocalVar>,
    aliases: HashMap<String, AliasEntry>,
}

/// Lexical scopes of the function being emitted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    frames: Vec<Frame>,
}

impl Scope {
    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pops the innermost frame and returns its locals that were never
    /// referenced. Parameters are not reported.
    pub fn pop(&mut self) -> Vec<LocalVar> {
        let Some(frame) = self.frames.pop() else {
            return Vec::new();
        };
        frame
            .vars
            .into_iter()
            .filter(|var| !var.used && var.param_index.is_none())
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Adds a variable to the innermost frame; false when the frame
    /// already holds one with that name.
    pub fn declare(&mut self, var: LocalVar) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        if frame.vars.iter().any(|existing| existing.name == var.name) {
            return false;
        }
        frame.vars.push(var);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&LocalVar> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.vars.iter().rev().find(|var| var.name == name))
    }

    pub fn mark_used(&mut self, name: &str) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(var) = frame.vars.iter_mut().rev().find(|var| var.name == name) {
                var.used = true;
                return;
            }
        }
    }

    pub fn declare_alias(&mut self, name: &str, entry: AliasEntry) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        frame.aliases.insert(name.to_string(), entry).is_none()
    }

    pub fn alias(&self, name: &str) -> Option<&AliasEntry> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.aliases.get(name))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopTargets {
    pub break_to: BasicBlockId,
    pub continue_to: BasicBlockId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use em_core::lir::LirType;

    fn var(name: &str, param_index: Option<usize>) -> LocalVar {
        LocalVar {
            name: name.to_string(),
            ty: Type::int(),
            slot: LirValue::Undef(LirType::ptr(LirType::I32)),
            span: Span::default(),
            param_index,
            used: false,
        }
    }

    #[test]
    fn shadowing_and_unused_reporting() {
        let mut scope = Scope::default();
        scope.push();
        assert!(scope.declare(var("p", Some(0))));
        assert!(scope.declare(var("x", None)));
        assert!(!scope.declare(var("x", None)));

        scope.push();
        assert!(scope.declare(var("x", None)));
        scope.mark_used("x");
        assert!(scope.pop().is_empty());

        let unused = scope.pop();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].name, "x");
        assert_eq!(scope.depth(), 0);
    }

    #[test]
    fn aliases_resolve_innermost_first() {
        let mut scope = Scope::default();
        scope.push();
        scope.declare_alias("T", AliasEntry::Type(Type::int()));
        scope.push();
        scope.declare_alias("T", AliasEntry::Type(Type::bool()));
        assert_eq!(scope.alias("T"), Some(&AliasEntry::Type(Type::bool())));
        scope.pop();
        assert_eq!(scope.alias("T"), Some(&AliasEntry::Type(Type::int())));
    }
}
