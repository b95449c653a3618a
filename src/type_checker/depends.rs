//! Forward-use tracking.
//!
//! Top-level code runs as it is reached, so a function defined early may be
//! called before a variable it reads has been initialized. Each function
//! and class keeps a graph of the values it reads (direct entries) and the
//! graphs it reaches through calls (remote entries). Remote entries are
//! references resolved through a [`GraphSource`], so cycles between
//! mutually recursive functions are fine: a [`SearchToken`] threaded
//! through one query marks graphs already visited.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{symbols::FuncId, symbols::ValueId, types::TypeId};

/// Names a graph owned by a type or a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphRef {
    Type(TypeId),
    Func(FuncId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub value: ValueId,
    /// Position at which `value` becomes initialized.
    pub init_where: u32,
    /// Position of the read.
    pub use_where: u32,
    pub is_member: bool,
}

pub trait GraphSource {
    fn graph(&self, graph: GraphRef) -> Option<&DependencyGraph>;
}

impl GraphSource for FxHashMap<GraphRef, DependencyGraph> {
    fn graph(&self, graph: GraphRef) -> Option<&DependencyGraph> {
        self.get(&graph)
    }
}

/// Visitation state for one `locate` query.
#[derive(Debug, Default)]
pub struct SearchToken {
    visited: FxHashSet<GraphRef>,
}

impl SearchToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a query rooted at `origin`, which is never revisited.
    pub fn rooted_at(origin: GraphRef) -> Self {
        let mut token = Self::new();
        token.visited.insert(origin);
        token
    }

    /// Marks `graph` visited; false if it already was.
    pub fn visit(&mut self, graph: GraphRef) -> bool {
        self.visited.insert(graph)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    directs: Vec<Dependency>,
    remotes: Vec<GraphRef>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dependency: Dependency) {
        self.directs.push(dependency);
    }

    pub fn add_remote(&mut self, graph: GraphRef) {
        if !self.remotes.contains(&graph) {
            self.remotes.push(graph);
        }
    }

    pub fn clear(&mut self) {
        self.directs.clear();
        self.remotes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.directs.is_empty() && self.remotes.is_empty()
    }

    pub fn directs(&self) -> &[Dependency] {
        &self.directs
    }

    pub fn remotes(&self) -> &[GraphRef] {
        &self.remotes
    }

    /// First dependency initialized after `pos`. `is_class_def` selects
    /// member dependencies (class pre-constructor code) instead of
    /// context-level ones.
    pub fn locate<S: GraphSource + ?Sized>(
        &self,
        pos: u32,
        is_class_def: bool,
        source: &S,
        token: &mut SearchToken,
    ) -> Option<Dependency> {
        if let Some(found) = self
            .directs
            .iter()
            .find(|dep| dep.is_member == is_class_def && dep.init_where > pos)
        {
            return Some(found.clone());
        }

        for remote in &self.remotes {
            if !token.visit(*remote) {
                continue;
            }
            let Some(graph) = source.graph(*remote) else {
                continue;
            };
            if let Some(found) = graph.locate(pos, is_class_def, source, token) {
                return Some(found);
            }
        }

        None
    }
}
