//! The type environment.
//!
//! One `Environment` holds every symbol record for a running system: the
//! arenas, the global and user namespaces, the resident contexts, and the
//! stacks the checker pushes while it walks nested classes and functions.
//! Nothing here is process-wide; environments are fully independent.

use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::{
    ast::ast::{Access, Program, TypeDecl},
    config::{DeprecateLevel, EnvConfig},
    errors::{
        diagnostics::Diagnostics,
        errors::{Error, ErrorImpl},
    },
    Position, MK_ERROR,
};

use super::{
    arena::Arena,
    builtins::Builtins,
    context::{Context, ContextId, Progress},
    depends::{Dependency, DependencyGraph, GraphRef, GraphSource, SearchToken},
    import::ImportFrame,
    namespace::{Namespace, NspcId},
    reserved::{ReservedKind, RESERVED_LOOKUP},
    scope::{Climb, MANGLE_SENTINEL},
    symbols::{Func, FuncId, Value, ValueId},
    type_checker::DeferredUse,
    types::{Type, TypeId, TypeKind},
};

lazy_static! {
    static ref TYPE_PATTERN: Regex = Regex::new(
        r"^\s*([A-Za-z_][A-Za-z0-9_]*(?:\s*\.\s*[A-Za-z_][A-Za-z0-9_]*)*)\s*((?:\[\s*\]\s*)*)$"
    )
    .expect("type pattern compiles");
    static ref IDENT_PATTERN: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles");
}

/// Splits `"Foo.Bar[][]"` into its path and array depth.
pub fn parse_type_str(text: &str) -> Option<(Vec<String>, u32)> {
    let captures = TYPE_PATTERN.captures(text)?;
    let path = captures
        .get(1)?
        .as_str()
        .split('.')
        .map(|part| part.trim().to_string())
        .collect();
    let depth = captures
        .get(2)
        .map(|brackets| brackets.as_str().matches('[').count() as u32)
        .unwrap_or(0);
    Some((path, depth))
}

pub fn is_identifier(name: &str) -> bool {
    IDENT_PATTERN.is_match(name)
}

#[derive(Debug, Clone, Copy)]
struct Reserved {
    kind: ReservedKind,
    enabled: bool,
}

#[derive(Debug)]
pub struct Environment {
    pub types: Arena<TypeId, Type>,
    pub values: Arena<ValueId, Value>,
    pub funcs: Arena<FuncId, Func>,
    pub nspcs: Arena<NspcId, Namespace>,
    pub contexts: Arena<ContextId, Context>,
    pub builtins: Builtins,
    pub diagnostics: Diagnostics,
    pub config: EnvConfig,
    global: NspcId,
    user: Option<NspcId>,
    resident: Vec<ContextId>,
    pub(crate) context: Option<ContextId>,
    pub(crate) nspc_stack: Vec<NspcId>,
    pub(crate) class_stack: Vec<TypeId>,
    pub(crate) func: Option<FuncId>,
    /// Set while checking the operand of a `spork ~` expression.
    pub(crate) sporking: bool,
    pub(crate) loop_depth: usize,
    pub(crate) frame_offset: usize,
    pub(crate) array_types: FxHashMap<(TypeId, u32), TypeId>,
    pub(crate) import: Option<ImportFrame>,
    /// Calls and instantiations in immediately-run code, checked for
    /// forward use once every body in the context has been checked.
    pub(crate) deferred_uses: Vec<DeferredUse>,
    reserved: FxHashMap<String, Reserved>,
    deprecated: FxHashMap<String, String>,
}

impl Environment {
    pub fn new(config: EnvConfig) -> Result<Self, Error> {
        let mut types = Arena::new();
        let mut nspcs = Arena::new();
        let global = nspcs.insert(Namespace::new("global", None));
        let builtins = Builtins::allocate(&mut types);

        let reserved = RESERVED_LOOKUP
            .iter()
            .map(|(name, kind)| {
                (
                    name.to_string(),
                    Reserved {
                        kind: *kind,
                        enabled: true,
                    },
                )
            })
            .collect();

        let mut env = Environment {
            types,
            values: Arena::new(),
            funcs: Arena::new(),
            nspcs,
            contexts: Arena::new(),
            builtins,
            diagnostics: Diagnostics::new(),
            config,
            global,
            user: None,
            resident: vec![],
            context: None,
            nspc_stack: vec![global],
            class_stack: vec![],
            func: None,
            sporking: false,
            loop_depth: 0,
            frame_offset: 0,
            array_types: FxHashMap::default(),
            import: None,
            deferred_uses: vec![],
            reserved,
            deprecated: FxHashMap::default(),
        };

        env.install_builtins()?;
        if config.load_user_namespace {
            env.load_user_namespace();
        }

        info!(
            types = env.types.len(),
            deprecate_level = %config.deprecate_level,
            "type environment ready"
        );
        Ok(env)
    }

    pub fn global(&self) -> NspcId {
        self.global
    }

    pub fn user(&self) -> Option<NspcId> {
        self.user
    }

    pub fn nspc_top(&self) -> NspcId {
        self.nspc_stack.last().copied().unwrap_or(self.global)
    }

    pub fn class_top(&self) -> Option<TypeId> {
        self.class_stack.last().copied()
    }

    pub fn func_top(&self) -> Option<FuncId> {
        self.func
    }

    pub fn current_context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn resident_contexts(&self) -> &[ContextId] {
        &self.resident
    }

    pub fn is_sporking(&self) -> bool {
        self.sporking
    }

    /// True outside every class body and function body.
    pub fn is_global(&self) -> bool {
        self.class_stack.is_empty() && self.func.is_none()
    }

    fn base_stack(&self) -> Vec<NspcId> {
        let mut stack = vec![self.global];
        stack.extend(self.user);
        stack
    }

    pub(crate) fn is_shared_nspc(&self, nspc: NspcId) -> bool {
        nspc == self.global || Some(nspc) == self.user
    }

    // ---------------------------------------------------------------------
    // Lifecycle

    pub fn load_user_namespace(&mut self) -> NspcId {
        if let Some(user) = self.user {
            return user;
        }
        let user = self.nspcs.insert(Namespace::new("user", Some(self.global)));
        self.user = Some(user);
        if self.context.is_none() && self.import.is_none() {
            self.nspc_stack = self.base_stack();
        }
        debug!("user namespace loaded");
        user
    }

    /// Unloads every resident context, then empties the user namespace.
    pub fn clear_user_namespace(&mut self) {
        self.release_all_contexts();
        let Some(user) = self.user else {
            return;
        };

        let (types, values, funcs) = {
            let nspc = &self.nspcs[user];
            (
                nspc.types.get_top_level(true),
                nspc.values.get_top_level(true),
                nspc.funcs.get_top_level(true),
            )
        };
        for f in funcs {
            self.funcs.remove(f);
        }
        for v in values {
            self.values.remove(v);
        }
        for t in types {
            if let Some(info) = self.types.remove(t).and_then(|ty| ty.info) {
                self.nspcs.remove(info);
            }
        }

        let nspc = &mut self.nspcs[user];
        nspc.types.reset();
        nspc.values.reset();
        nspc.funcs.reset();
        self.purge_array_types();
        info!("user namespace cleared");
    }

    /// Back to the state right after construction, apart from imports
    /// made into the global namespace.
    pub fn reset(&mut self) {
        self.import_abort();
        if let Some(ctx) = self.context {
            self.unload_context(ctx).ok();
        }
        self.clear_user_namespace();
        self.nspc_stack = self.base_stack();
        self.class_stack.clear();
        self.func = None;
        self.sporking = false;
        self.loop_depth = 0;
        self.frame_offset = 0;
        info!("type environment reset");
    }

    fn release_all_contexts(&mut self) {
        while let Some(ctx) = self.resident.last().copied() {
            if Some(ctx) == self.context {
                self.unload_context(ctx).ok();
            }
            // Every resident context goes, dependents included.
            if let Some(context) = self.contexts.remove(ctx) {
                self.release_symbols(&context);
            }
            self.resident.retain(|resident| *resident != ctx);
        }
    }

    pub fn make_context(&mut self, program: Program, filename: &str) -> ContextId {
        let parent = self.user.unwrap_or(self.global);
        let nspc = self.nspcs.insert(Namespace::new(filename, Some(parent)));
        self.contexts
            .insert(Context::new(filename, filename, nspc, Rc::new(program)))
    }

    fn context_position(&self, ctx: ContextId) -> Position {
        let filename = self
            .contexts
            .get(ctx)
            .map(|c| c.filename.clone())
            .unwrap_or_default();
        Position(0, Rc::new(filename))
    }

    pub(crate) fn invalid_context(&self, ctx: ContextId, message: &str) -> Error {
        let position = self.context_position(ctx);
        Error::new(
            ErrorImpl::InvalidContextState {
                filename: position.1.to_string(),
                message: message.to_string(),
            },
            position,
        )
    }

    pub fn load_context(&mut self, ctx: ContextId) -> Result<(), Error> {
        let Some(nspc) = self.contexts.get(ctx).map(|c| c.nspc) else {
            return Err(self.invalid_context(ctx, "context does not exist"));
        };
        if self.context.is_some() {
            return Err(self.invalid_context(ctx, "another context is already loaded"));
        }
        if self.import.is_some() {
            return Err(self.invalid_context(ctx, "an import is in progress"));
        }
        if self.contexts[ctx].progress == Progress::FullyDone {
            return Err(self.invalid_context(ctx, "context is already committed"));
        }

        self.nspc_stack = self.base_stack();
        self.nspc_stack.push(nspc);
        self.context = Some(ctx);
        if !self.resident.contains(&ctx) {
            self.resident.push(ctx);
        }
        self.frame_offset = 0;
        debug!(file = %self.contexts[ctx].filename, "loaded context");
        Ok(())
    }

    /// Pops the context. A context that finished checking is committed; one
    /// that failed (or never finished) is rolled back and released.
    pub fn unload_context(&mut self, ctx: ContextId) -> Result<(), Error> {
        if self.context != Some(ctx) {
            return Err(self.invalid_context(ctx, "context is not loaded"));
        }

        self.nspc_stack = self.base_stack();
        self.class_stack.clear();
        self.func = None;
        self.sporking = false;
        self.loop_depth = 0;
        self.deferred_uses.clear();
        self.context = None;

        if self.contexts[ctx].progress == Progress::FullyDone {
            self.commit_context(ctx);
        } else {
            self.rollback_context(ctx);
        }
        Ok(())
    }

    fn commit_context(&mut self, ctx: ContextId) {
        let context = &self.contexts[ctx];
        let nspcs: Vec<NspcId> = context
            .new_nspcs
            .iter()
            .copied()
            .chain(self.base_stack())
            .collect();
        let graphs: Vec<GraphRef> = context
            .new_types
            .iter()
            .map(|t| GraphRef::Type(*t))
            .chain(context.new_funcs.iter().map(|f| GraphRef::Func(*f)))
            .collect();

        for nspc in nspcs {
            if let Some(nspc) = self.nspcs.get_mut(nspc) {
                nspc.commit();
            }
        }
        for graph in graphs {
            if let Some(graph) = self.graph_mut(graph) {
                graph.clear();
            }
        }
        self.decouple_ast(ctx);
        info!(file = %self.contexts[ctx].filename, "context committed");
    }

    fn rollback_context(&mut self, ctx: ContextId) {
        let nspcs: Vec<NspcId> = self.contexts[ctx]
            .new_nspcs
            .iter()
            .copied()
            .chain(self.base_stack())
            .collect();
        for nspc in nspcs {
            if let Some(nspc) = self.nspcs.get_mut(nspc) {
                nspc.rollback();
            }
        }

        if let Some(context) = self.contexts.remove(ctx) {
            self.release_symbols(&context);
            info!(file = %context.filename, "context rolled back");
        }
        self.resident.retain(|resident| *resident != ctx);
    }

    /// Severs every tie between the context's symbols and its tree.
    pub fn decouple_ast(&mut self, ctx: ContextId) {
        let Some(context) = self.contexts.get_mut(ctx) else {
            return;
        };
        context.decouple_ast();
        let funcs = context.new_funcs.clone();
        for f in funcs {
            if let Some(func) = self.funcs.get_mut(f) {
                func.funcdef_decouple_ast();
            }
        }
    }

    /// Unloads a previously committed context, removing everything it
    /// introduced. Refused while symbols of other contexts still refer to
    /// its types; release those contexts first.
    pub fn release_context(&mut self, ctx: ContextId) -> Result<(), Error> {
        if self.context == Some(ctx) {
            return Err(self.invalid_context(ctx, "context is still being checked"));
        }
        let Some(context) = self.contexts.get(ctx) else {
            return Err(self.invalid_context(ctx, "context does not exist"));
        };
        if let Some(dependent) = self.release_blocker(context) {
            return Err(self.invalid_context(
                ctx,
                &format!("'{}' still depends on types it declares", dependent),
            ));
        }
        let Some(context) = self.contexts.remove(ctx) else {
            return Err(self.invalid_context(ctx, "context does not exist"));
        };
        self.release_symbols(&context);
        self.resident.retain(|resident| *resident != ctx);
        info!(file = %context.filename, "context released");
        Ok(())
    }

    /// Name of the first symbol outside `context` that refers to one of
    /// its types.
    fn release_blocker(&self, context: &Context) -> Option<String> {
        let owned_types: FxHashSet<TypeId> = context.new_types.iter().copied().collect();
        let owned_values: FxHashSet<ValueId> = context.new_values.iter().copied().collect();
        let owned_funcs: FxHashSet<FuncId> = context.new_funcs.iter().copied().collect();
        let doomed = |t: TypeId| {
            owned_types.contains(&t)
                || self
                    .types
                    .get(t)
                    .and_then(|ty| ty.array_element())
                    .is_some_and(|element| owned_types.contains(&element))
        };

        let types = self
            .types
            .iter()
            .filter(|(t, ty)| !owned_types.contains(t) && ty.array_element().is_none())
            .find(|(_, ty)| ty.parent.is_some_and(&doomed))
            .map(|(_, ty)| ty.name().to_string());
        let values = || {
            self.values
                .iter()
                .filter(|(v, _)| !owned_values.contains(v))
                .find(|(_, value)| doomed(value.ty))
                .map(|(_, value)| value.name.clone())
        };
        let funcs = || {
            self.funcs
                .iter()
                .filter(|(f, _)| !owned_funcs.contains(f))
                .find(|(_, func)| doomed(func.ret) || func.params.iter().any(|p| doomed(p.ty)))
                .map(|(_, func)| func.name.clone())
        };
        types.or_else(values).or_else(funcs)
    }

    fn release_symbols(&mut self, context: &Context) {
        for f in &context.new_funcs {
            self.funcs.remove(*f);
        }
        for v in &context.new_values {
            self.values.remove(*v);
        }
        for t in &context.new_types {
            self.types.remove(*t);
        }
        for n in &context.new_nspcs {
            self.nspcs.remove(*n);
        }
        self.purge_array_types();
        self.prune_shared_scopes();
        debug!(
            types = context.new_types.len(),
            values = context.new_values.len(),
            funcs = context.new_funcs.len(),
            nspcs = context.new_nspcs.len(),
            "released symbols"
        );
    }

    /// Drops generated array types whose element type is gone.
    fn purge_array_types(&mut self) {
        let stale: Vec<((TypeId, u32), TypeId)> = self
            .array_types
            .iter()
            .filter(|((element, _), _)| !self.types.contains(*element))
            .map(|(key, array)| (*key, *array))
            .collect();
        for (key, array) in stale {
            self.array_types.remove(&key);
            self.types.remove(array);
        }
    }

    fn prune_shared_scopes(&mut self) {
        let (types, values, funcs) = (&self.types, &self.values, &self.funcs);
        for nspc in [Some(self.global), self.user].into_iter().flatten() {
            let Some(namespace) = self.nspcs.get_mut(nspc) else {
                continue;
            };
            namespace.types.retain(|t| types.contains(*t));
            namespace.values.retain(|v| values.contains(*v));
            namespace.funcs.retain(|f| funcs.contains(*f));
        }
    }

    // ---------------------------------------------------------------------
    // Ownership

    pub(crate) fn own_type(&mut self, t: TypeId) {
        if let Some(frame) = self.import.as_mut() {
            frame.created_types.push(t);
        } else if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.new_types.push(t);
        }
    }

    pub(crate) fn own_value(&mut self, v: ValueId) {
        if let Some(frame) = self.import.as_mut() {
            frame.created_values.push(v);
        } else if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.new_values.push(v);
        }
    }

    pub(crate) fn own_func(&mut self, f: FuncId) {
        if let Some(frame) = self.import.as_mut() {
            frame.created_funcs.push(f);
        } else if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.new_funcs.push(f);
        }
    }

    pub(crate) fn own_nspc(&mut self, n: NspcId) {
        if let Some(frame) = self.import.as_mut() {
            frame.created_nspcs.push(n);
        } else if let Some(context) = self.context.and_then(|c| self.contexts.get_mut(c)) {
            context.new_nspcs.push(n);
        }
    }

    /// True for namespaces introduced by the context being checked.
    pub(crate) fn current_context_owns(&self, nspc: NspcId) -> bool {
        self.context
            .and_then(|c| self.contexts.get(c))
            .map(|c| c.owns_nspc(nspc))
            .unwrap_or(false)
    }

    pub(crate) fn context_nspc(&self) -> Option<NspcId> {
        self.context
            .and_then(|c| self.contexts.get(c))
            .map(|c| c.nspc)
    }

    // ---------------------------------------------------------------------
    // Lookup

    fn climb_from<T: Copy>(
        &self,
        start: NspcId,
        climb: Climb,
        stay_within_class: bool,
        here: impl Fn(&Namespace, Climb) -> Option<T>,
        inherited: impl Fn(TypeId) -> Option<T>,
    ) -> Option<T> {
        if climb != Climb::Outward {
            return here(self.nspcs.get(start)?, climb);
        }

        // Once a class boundary is crossed with `stay_within_class`, only
        // the shared namespaces remain visible.
        let mut current = Some(start);
        let mut left_class = false;
        while let Some(id) = current {
            let nspc = self.nspcs.get(id)?;
            if !left_class || self.is_shared_nspc(id) {
                if let Some(found) = here(nspc, Climb::Outward) {
                    return Some(found);
                }
                let parent = nspc
                    .class_type
                    .and_then(|class| self.types.get(class))
                    .and_then(|class| class.parent);
                if let Some(found) = parent.and_then(&inherited) {
                    return Some(found);
                }
            }
            if stay_within_class && nspc.is_class() {
                left_class = true;
            }
            current = nspc.parent;
        }
        None
    }

    pub fn lookup_type(&self, name: &str, climb: Climb, stay_within_class: bool) -> Option<TypeId> {
        self.lookup_type_from(self.nspc_top(), name, climb, stay_within_class)
    }

    pub fn lookup_type_from(
        &self,
        start: NspcId,
        name: &str,
        climb: Climb,
        stay_within_class: bool,
    ) -> Option<TypeId> {
        self.climb_from(
            start,
            climb,
            stay_within_class,
            |nspc, climb| {
                nspc.types
                    .lookup(name, climb)
                    .filter(|t| self.types.contains(*t))
            },
            |_| None,
        )
    }

    pub fn lookup_value(
        &self,
        name: &str,
        climb: Climb,
        stay_within_class: bool,
    ) -> Option<ValueId> {
        self.lookup_value_from(self.nspc_top(), name, climb, stay_within_class)
    }

    pub fn lookup_value_from(
        &self,
        start: NspcId,
        name: &str,
        climb: Climb,
        stay_within_class: bool,
    ) -> Option<ValueId> {
        self.climb_from(
            start,
            climb,
            stay_within_class,
            |nspc, climb| {
                nspc.values
                    .lookup(name, climb)
                    .filter(|v| self.values.contains(*v))
            },
            |parent| self.find_value_in_type(parent, name),
        )
    }

    pub fn lookup_func(&self, name: &str, climb: Climb, stay_within_class: bool) -> Option<FuncId> {
        self.climb_from(
            self.nspc_top(),
            climb,
            stay_within_class,
            |nspc, climb| {
                nspc.funcs
                    .lookup(name, climb)
                    .filter(|f| self.funcs.contains(*f))
            },
            |parent| self.find_func_in_type(parent, name),
        )
    }

    /// Member value `name` of `t` or of its nearest ancestor declaring it.
    pub fn find_value_in_type(&self, t: TypeId, name: &str) -> Option<ValueId> {
        self.ancestry(t).into_iter().find_map(|class| {
            let info = self.types.get(class)?.info?;
            self.nspcs
                .get(info)?
                .values
                .lookup(name, Climb::Global)
                .filter(|v| self.values.contains(*v))
        })
    }

    /// Head of the overload chain for `name` in `t` or its nearest
    /// ancestor declaring it.
    pub fn find_func_in_type(&self, t: TypeId, name: &str) -> Option<FuncId> {
        self.ancestry(t).into_iter().find_map(|class| {
            let info = self.types.get(class)?.info?;
            self.nspcs
                .get(info)?
                .funcs
                .lookup(name, Climb::Global)
                .filter(|f| self.funcs.contains(*f))
        })
    }

    /// `t` followed by its parents, root last.
    pub fn ancestry(&self, t: TypeId) -> Vec<TypeId> {
        let mut chain = vec![];
        let mut current = Some(t);
        while let Some(class) = current {
            if chain.contains(&class) {
                break;
            }
            chain.push(class);
            current = self.types.get(class).and_then(|ty| ty.parent);
        }
        chain
    }

    pub fn find_type(&mut self, path: &[String]) -> Option<TypeId> {
        let (first, rest) = path.split_first()?;
        let mut t = self.lookup_type(first, Climb::Outward, false)?;
        for part in rest {
            let info = self.types.get(t)?.info?;
            t = self
                .nspcs
                .get(info)?
                .types
                .lookup(part, Climb::Global)
                .filter(|t| self.types.contains(*t))?;
        }
        Some(t)
    }

    /// Resolves a written type such as `"Foo.Bar[][]"`.
    pub fn find_type_str(&mut self, text: &str) -> Option<TypeId> {
        let (path, depth) = parse_type_str(text)?;
        let t = self.find_type(&path)?;
        if depth == 0 {
            return Some(t);
        }
        Some(self.new_array_type(t, depth, self.global))
    }

    pub fn find_nspc(&mut self, path: &[String]) -> Option<NspcId> {
        let t = self.find_type(path)?;
        self.types.get(t)?.info
    }

    pub fn names_to_types(&mut self, names: &[&str]) -> Option<Vec<TypeId>> {
        names.iter().map(|name| self.find_type_str(name)).collect()
    }

    /// Resolves a written type path, honoring deprecations and the class
    /// currently being imported.
    pub(crate) fn resolve_type_path(
        &mut self,
        path: &[String],
        array_depth: u32,
        pos: &Position,
    ) -> Result<TypeId, Error> {
        let Some((first, rest)) = path.split_first() else {
            return MK_ERROR!(
                ErrorImpl::UndeclaredIdentifier {
                    name: String::new()
                },
                pos
            );
        };

        let first = self.check_deprecate(first, pos)?.unwrap_or_else(|| first.clone());
        let importing = self
            .import
            .as_ref()
            .filter(|frame| rest.is_empty() && self.types[frame.class].base_name == first)
            .map(|frame| frame.class);

        let mut full_path = vec![first.clone()];
        full_path.extend(rest.iter().cloned());
        let found = match importing {
            Some(class) => Some(class),
            None => self.find_type(&full_path),
        };
        let Some(t) = found else {
            return MK_ERROR!(
                ErrorImpl::UndeclaredIdentifier {
                    name: full_path.join(".")
                },
                pos
            );
        };

        if array_depth == 0 {
            return Ok(t);
        }
        Ok(self.new_array_type(t, array_depth, self.global))
    }

    pub(crate) fn resolve_type_decl(&mut self, decl: &TypeDecl) -> Result<TypeId, Error> {
        self.resolve_type_path(&decl.path, decl.array_depth, &decl.span.start)
    }

    // ---------------------------------------------------------------------
    // Reserved words and deprecation

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved
            .get(name)
            .map(|reserved| reserved.enabled)
            .unwrap_or(false)
    }

    pub fn reserved_kind(&self, name: &str) -> Option<ReservedKind> {
        self.reserved.get(name).map(|reserved| reserved.kind)
    }

    pub fn check_reserved(&self, name: &str, pos: &Position) -> Result<(), Error> {
        if self.is_reserved(name) {
            return MK_ERROR!(
                ErrorImpl::ReservedWordViolation {
                    name: name.to_string()
                },
                pos
            );
        }
        Ok(())
    }

    /// Turns a reserved word off (or back on). Returns false for names that
    /// are not reserved at all.
    pub fn enable_reserved(&mut self, name: &str, enabled: bool) -> bool {
        match self.reserved.get_mut(name) {
            Some(reserved) => {
                reserved.enabled = enabled;
                debug!(name, enabled, "reserved word toggled");
                true
            }
            None => false,
        }
    }

    pub fn register_deprecate(&mut self, former: &str, latter: &str) {
        self.deprecated
            .insert(former.to_string(), latter.to_string());
    }

    pub fn get_deprecate(&self, name: &str) -> Option<&str> {
        self.deprecated.get(name).map(|latter| latter.as_str())
    }

    /// The replacement for a deprecated `name`, if it is deprecated and the
    /// configured level allows it.
    pub fn check_deprecate(&mut self, name: &str, pos: &Position) -> Result<Option<String>, Error> {
        let Some(latter) = self.deprecated.get(name).cloned() else {
            return Ok(None);
        };
        match self.config.deprecate_level {
            DeprecateLevel::Reject => MK_ERROR!(
                ErrorImpl::DeprecatedName {
                    former: name.to_string(),
                    latter,
                },
                pos
            ),
            DeprecateLevel::Warn => {
                self.diagnostics.warn(
                    format!("'{}' is deprecated, use '{}' instead", name, latter),
                    pos.clone(),
                );
                Ok(Some(latter))
            }
            DeprecateLevel::Ignore => Ok(Some(latter)),
        }
    }

    // ---------------------------------------------------------------------
    // Symbol registration

    /// Creates the member namespace of a class type.
    pub(crate) fn new_class_nspc(&mut self, t: TypeId, lexical_parent: Option<NspcId>) -> NspcId {
        let mut nspc = Namespace::new(self.types[t].name(), lexical_parent);
        nspc.class_type = Some(t);
        let n = self.nspcs.insert(nspc);
        self.types[t].info = Some(n);
        self.own_nspc(n);
        n
    }

    /// Starts a class's layout where its parent's ends: inherited vtable,
    /// instance offset and signal-processing info.
    pub(crate) fn inherit_layout(&mut self, t: TypeId) {
        let Some(info) = self.types[t].info else {
            return;
        };
        let parent = self.types[t].parent.and_then(|p| self.types.get(p));
        let (vtable, offset, ugen_info) = match parent {
            Some(parent) => {
                let parent_nspc = parent.info.and_then(|n| self.nspcs.get(n));
                (
                    parent_nspc.map(|n| n.vtable.clone()).unwrap_or_default(),
                    parent_nspc.map(|n| n.offset).unwrap_or(0),
                    parent.ugen_info,
                )
            }
            None => (vec![], 0, None),
        };

        let nspc = &mut self.nspcs[info];
        nspc.vtable = vtable;
        nspc.offset = offset;
        let ty = &mut self.types[t];
        ty.obj_size = offset;
        if ty.ugen_info.is_none() {
            ty.ugen_info = ugen_info;
        }
    }

    /// `head` followed by every overload chained behind it.
    pub fn overload_chain(&self, head: Option<FuncId>) -> Vec<FuncId> {
        let mut chain = vec![];
        let mut current = head;
        while let Some(f) = current {
            let Some(func) = self.funcs.get(f) else {
                break;
            };
            if chain.contains(&f) {
                break;
            }
            chain.push(f);
            current = func.next;
        }
        chain
    }

    pub(crate) fn same_params(&self, a: &[TypeId], b: &[TypeId]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.equals(*x, *y))
    }

    /// Installs `func` in `where_`: overload chaining, name mangling, the
    /// backing value and function type, and a vtable slot for members.
    pub(crate) fn register_func(
        &mut self,
        mut func: Func,
        where_: NspcId,
        access: Access,
        pos: &Position,
    ) -> Result<FuncId, Error> {
        let base = func.base_name.clone();
        let (head, clashing_value, nspc_name) = {
            let nspc = &self.nspcs[where_];
            (
                nspc.funcs
                    .lookup(&base, Climb::Current)
                    .filter(|f| self.funcs.contains(*f)),
                nspc.values
                    .lookup(&base, Climb::Current)
                    .filter(|v| self.values.contains(*v)),
                nspc.name.clone(),
            )
        };
        if clashing_value.is_some() {
            return MK_ERROR!(ErrorImpl::DuplicateDeclaration { name: base }, pos);
        }

        let overloads = self.overload_chain(head);
        let params = func.param_types();
        if overloads
            .iter()
            .any(|other| self.same_params(&self.funcs[*other].param_types(), &params))
        {
            return MK_ERROR!(ErrorImpl::DuplicateDeclaration { name: base }, pos);
        }

        let mangled = format!(
            "{}{}{}{}{}",
            base,
            MANGLE_SENTINEL,
            overloads.len(),
            MANGLE_SENTINEL,
            nspc_name
        );
        func.name = mangled.clone();
        func.next = head;
        let (is_member, is_static, owner_class) = (func.is_member, func.is_static, func.owner_class);
        let f = self.funcs.insert(func);
        self.own_func(f);

        let mut fn_type = Type::new(
            TypeKind::Function { func: Some(f) },
            "function",
            Some(self.builtins.function),
            super::types::sizes::REF,
        );
        fn_type.owner = Some(where_);
        let fn_type = self.types.insert(fn_type);
        self.own_type(fn_type);

        let mut value = Value::new(&mangled, fn_type);
        value.func_ref = Some(f);
        value.is_const = true;
        value.is_member = is_member;
        value.is_static = is_static;
        value.access = access;
        value.owner = Some(where_);
        value.owner_class = owner_class;
        value.func_num_overloads = overloads.len() + 1;
        value.is_context_top_level = owner_class.is_none() && self.context_nspc() == Some(where_);
        let v = self.values.insert(value);
        self.own_value(v);
        self.funcs[f].value_ref = Some(v);

        let nspc = &mut self.nspcs[where_];
        nspc.values.add(&mangled, v);
        nspc.funcs.add(&base, f);
        nspc.funcs.add(&mangled, f);

        if let (true, Some(class)) = (is_member, owner_class) {
            self.assign_vtable_slot(f, class, pos)?;
        }
        Ok(f)
    }

    /// The nearest inherited member function with the same name and
    /// parameter types.
    fn find_overridden(&self, class: TypeId, f: FuncId) -> Option<FuncId> {
        let func = &self.funcs[f];
        let params = func.param_types();
        let parent = self.types.get(class)?.parent?;
        self.ancestry(parent).into_iter().find_map(|ancestor| {
            let info = self.types.get(ancestor)?.info?;
            let head = self.nspcs.get(info)?.funcs.lookup(&func.base_name, Climb::Global);
            self.overload_chain(head).into_iter().find(|candidate| {
                let candidate = &self.funcs[*candidate];
                candidate.is_member && self.same_params(&candidate.param_types(), &params)
            })
        })
    }

    fn assign_vtable_slot(&mut self, f: FuncId, class: TypeId, pos: &Position) -> Result<(), Error> {
        let Some(info) = self.types[class].info else {
            return Ok(());
        };

        let overridden = self.find_overridden(class, f);
        match overridden.and_then(|o| self.funcs[o].vt_index.map(|slot| (o, slot))) {
            Some((overridden, slot)) => {
                let (ret, parent_ret, up) = {
                    let parent = &self.funcs[overridden];
                    (self.funcs[f].ret, parent.ret, parent.value_ref)
                };
                if !self.isa(ret, parent_ret) {
                    return MK_ERROR!(
                        ErrorImpl::InvalidReturn {
                            message: format!(
                                "'{}' overrides a function returning '{}' but returns '{}'",
                                self.funcs[f].base_name,
                                self.type_name(parent_ret),
                                self.type_name(ret)
                            )
                        },
                        pos
                    );
                }
                let func = &mut self.funcs[f];
                func.vt_index = Some(slot);
                func.up = up;
                let vtable = &mut self.nspcs[info].vtable;
                if slot < vtable.len() {
                    vtable[slot] = f;
                } else {
                    vtable.push(f);
                }
            }
            None => {
                let vtable = &mut self.nspcs[info].vtable;
                self.funcs[f].vt_index = Some(vtable.len());
                vtable.push(f);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Dependency graphs

    pub(crate) fn graph_mut(&mut self, graph: GraphRef) -> Option<&mut DependencyGraph> {
        match graph {
            GraphRef::Type(t) => self.types.get_mut(t).map(|t| &mut t.depends),
            GraphRef::Func(f) => self.funcs.get_mut(f).map(|f| &mut f.depends),
        }
    }

    /// Runs `locate` on one graph with a fresh search token.
    pub fn locate(&self, graph: GraphRef, pos: u32, is_class_def: bool) -> Option<Dependency> {
        let mut token = SearchToken::rooted_at(graph);
        self.graph(graph)?
            .locate(pos, is_class_def, self, &mut token)
    }
}

impl GraphSource for Environment {
    fn graph(&self, graph: GraphRef) -> Option<&DependencyGraph> {
        match graph {
            GraphRef::Type(t) => self.types.get(t).map(|t| &t.depends),
            GraphRef::Func(f) => self.funcs.get(f).map(|f| &f.depends),
        }
    }
}
