use em_core::ast::NodeId;
use serde::{Deserialize, Serialize};

/// Per-node progress through the phases. Checking and emitting a node in
/// a state that already covers the phase is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Unchecked,
    Checked,
    Emitted,
}

/// Side table of node states indexed by [`NodeId`]; the tree itself stays
/// immutable with respect to phase bookkeeping.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeStates {
    states: Vec<NodeState>,
}

impl NodeStates {
    pub fn get(&self, id: NodeId) -> NodeState {
        self.states.get(id.index()).copied().unwrap_or_default()
    }

    pub fn set(&mut self, id: NodeId, state: NodeState) {
        let index = id.index();
        if index >= self.states.len() {
            self.states.resize(index + 1, NodeState::Unchecked);
        }
        self.states[index] = state;
    }

    /// Marks `id` checked, returning false when it already was.
    pub fn begin_check(&mut self, id: NodeId) -> bool {
        if self.get(id) != NodeState::Unchecked {
            return false;
        }
        self.set(id, NodeState::Checked);
        true
    }

    /// Marks `id` emitted, returning false when it already was.
    pub fn begin_emit(&mut self, id: NodeId) -> bool {
        if self.get(id) == NodeState::Emitted {
            return false;
        }
        self.set(id, NodeState::Emitted);
        true
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_one_shot() {
        let mut states = NodeStates::default();
        let id = NodeId(3);
        assert_eq!(states.get(id), NodeState::Unchecked);
        assert!(states.begin_check(id));
        assert!(!states.begin_check(id));
        assert!(states.begin_emit(id));
        assert!(!states.begin_emit(id));
        assert!(!states.begin_check(id));
        states.clear();
        assert_eq!(states.get(id), NodeState::Unchecked);
    }
}
