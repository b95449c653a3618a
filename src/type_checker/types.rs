//! Type records.
//!
//! A type is one of a handful of shapes (primitive, object, array,
//! function, ...) plus its place in the single-inheritance hierarchy.

use std::fmt::Display;

use super::{
    depends::DependencyGraph,
    namespace::NspcId,
    symbols::{FuncId, NativeHook},
};

crate::MK_HANDLE!(
    /// Handle to a [`Type`] record.
    TypeId
);

/// Primitive value shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Int,
    Float,
    Time,
    Dur,
    Complex,
    Polar,
    Vec3,
    Vec4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    /// Placeholder replaced by inference at the declaration site.
    Auto,
    Null,
    Primitive(PrimKind),
    /// A class; members live in the type's `info` namespace.
    Object,
    Array { element: TypeId, depth: u32 },
    /// `func` is `None` only for the built-in `function` type itself.
    Function { func: Option<FuncId> },
}

/// How the code generator should move a value of this type around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Void,
    Int,
    Float,
    Complex,
    Vec3,
    Vec4,
}

/// Where a type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Builtin,
    NativeExtension,
    ImportedLibrary,
    UserDefined,
    Generated,
}

impl Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Origin::Builtin => "builtin",
            Origin::NativeExtension => "native extension",
            Origin::ImportedLibrary => "imported library",
            Origin::UserDefined => "user-defined",
            Origin::Generated => "generated",
        };
        write!(f, "{}", text)
    }
}

/// Opaque signal-processing callbacks registered by a native extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UGenInfo {
    pub tick: Option<NativeHook>,
    pub tickf: Option<NativeHook>,
    pub pmsg: Option<NativeHook>,
    pub num_ins: u32,
    pub num_outs: u32,
    /// Analysis callbacks; `None` for plain signal generators.
    pub tock: Option<NativeHook>,
    pub num_ins_ana: u32,
    pub num_outs_ana: u32,
}

impl Default for UGenInfo {
    fn default() -> Self {
        UGenInfo {
            tick: None,
            tickf: None,
            pmsg: None,
            num_ins: 1,
            num_outs: 1,
            tock: None,
            num_ins_ana: 1,
            num_outs_ana: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Type {
    pub kind: TypeKind,
    /// Full display name; array types carry their brackets (`int[][]`).
    pub base_name: String,
    pub parent: Option<TypeId>,
    /// Size in bytes of a value of this type (a reference, for objects).
    pub size: usize,
    /// Size in bytes of an instance, for object types.
    pub obj_size: usize,
    pub owner: Option<NspcId>,
    pub info: Option<NspcId>,
    pub ugen_info: Option<UGenInfo>,
    pub is_copy: bool,
    pub is_complete: bool,
    pub has_constructor: bool,
    pub has_destructor: bool,
    pub origin: Origin,
    pub depends: DependencyGraph,
    pub doc: String,
    pub examples: Vec<String>,
}

impl Type {
    pub fn new(kind: TypeKind, name: &str, parent: Option<TypeId>, size: usize) -> Self {
        Type {
            kind,
            base_name: name.to_string(),
            parent,
            size,
            obj_size: 0,
            owner: None,
            info: None,
            ugen_info: None,
            is_copy: false,
            is_complete: true,
            has_constructor: false,
            has_destructor: false,
            origin: Origin::Builtin,
            depends: DependencyGraph::new(),
            doc: String::new(),
            examples: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.base_name
    }

    pub fn array_depth(&self) -> u32 {
        match self.kind {
            TypeKind::Array { depth, .. } => depth,
            _ => 0,
        }
    }

    pub fn array_element(&self) -> Option<TypeId> {
        match self.kind {
            TypeKind::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn func(&self) -> Option<FuncId> {
        match self.kind {
            TypeKind::Function { func } => func,
            _ => None,
        }
    }
}

/// Byte sizes of the primitive shapes.
pub mod sizes {
    pub const VOID: usize = 0;
    pub const INT: usize = 8;
    pub const FLOAT: usize = 8;
    pub const TIME: usize = 8;
    pub const DUR: usize = 8;
    pub const COMPLEX: usize = 16;
    pub const POLAR: usize = 16;
    pub const VEC3: usize = 24;
    pub const VEC4: usize = 32;
    pub const REF: usize = 8;
}
