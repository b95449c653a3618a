//! Checker output, keyed by tree node.

use rustc_hash::FxHashMap;

use crate::ast::ast::NodeId;

use super::{
    symbols::{FuncId, ValueId},
    types::TypeId,
};

#[derive(Debug, Clone, Default)]
pub struct Annotations {
    /// Resolved type of every checked expression.
    pub expr_types: FxHashMap<NodeId, TypeId>,
    /// Values introduced by a declaration expression.
    pub decl_values: FxHashMap<NodeId, Vec<ValueId>>,
    /// Overload selected at each call site.
    pub call_targets: FxHashMap<NodeId, FuncId>,
    /// Value each identifier or member access resolved to.
    pub value_refs: FxHashMap<NodeId, ValueId>,
    pub class_types: FxHashMap<NodeId, TypeId>,
    pub func_defs: FxHashMap<NodeId, FuncId>,
}

impl Annotations {
    pub fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.expr_types.get(&node).copied()
    }

    pub fn call_target(&self, node: NodeId) -> Option<FuncId> {
        self.call_targets.get(&node).copied()
    }

    pub fn declared(&self, node: NodeId) -> &[ValueId] {
        self.decl_values
            .get(&node)
            .map(|values| values.as_slice())
            .unwrap_or(&[])
    }
}
