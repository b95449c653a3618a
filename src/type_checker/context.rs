use std::rc::Rc;

use crate::ast::ast::Program;

use super::{
    annotations::Annotations,
    namespace::NspcId,
    symbols::{FuncId, ValueId},
    types::TypeId,
};

crate::MK_HANDLE!(
    /// Handle to a [`Context`] record.
    ContextId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Progress {
    NotStarted,
    ClassesScanned,
    FullyDone,
}

/// How much of the pipeline `check_context` should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HowMuch {
    All,
    ClassesOnly,
    /// Second pass only, on a context whose classes are already scanned.
    NoClasses,
}

/// One compiled source fragment.
#[derive(Debug)]
pub struct Context {
    pub filename: String,
    pub full_path: String,
    pub nspc: NspcId,
    pub parse_tree: Option<Rc<Program>>,
    pub public_class_def: Option<TypeId>,
    pub progress: Progress,
    pub has_error: bool,
    pub new_types: Vec<TypeId>,
    pub new_values: Vec<ValueId>,
    pub new_funcs: Vec<FuncId>,
    pub new_nspcs: Vec<NspcId>,
    pub annotations: Annotations,
}

impl Context {
    pub fn new(filename: &str, full_path: &str, nspc: NspcId, tree: Rc<Program>) -> Self {
        Context {
            filename: filename.to_string(),
            full_path: full_path.to_string(),
            nspc,
            parse_tree: Some(tree),
            public_class_def: None,
            progress: Progress::NotStarted,
            has_error: false,
            new_types: vec![],
            new_values: vec![],
            new_funcs: vec![],
            new_nspcs: vec![nspc],
            annotations: Annotations::default(),
        }
    }

    pub fn owns_nspc(&self, nspc: NspcId) -> bool {
        self.new_nspcs.contains(&nspc)
    }

    /// Drops the context's reference to its tree. Functions keep their own
    /// reference until `Func::funcdef_decouple_ast`.
    pub fn decouple_ast(&mut self) {
        self.parse_tree = None;
    }
}
