//! Unit tests for the type environment and checker.
//!
//! Programs are assembled with [`AstBuilder`], whose positions follow
//! creation order. Tests that exercise forward-use detection build nodes in
//! the order they would appear in source.

use rustc_hash::FxHashMap;

use crate::{
    ast::{
        ast::{Access, BinaryOp, Program, Section, VarDecl},
        builder::AstBuilder,
    },
    config::{DeprecateLevel, EnvConfig},
    errors::errors::Error,
};

use super::{
    arena::Arena,
    context::{ContextId, HowMuch, Progress},
    depends::{Dependency, DependencyGraph, GraphRef, SearchToken},
    env::{parse_type_str, Environment},
    import::ImportedFunc,
    reserved::ReservedKind,
    scope::{Climb, Scope},
    symbols::{FuncId, NativeHook, ValueId},
    types::{Origin, TypeId},
};

fn env() -> Environment {
    Environment::new(EnvConfig::default()).unwrap()
}

fn check(env: &mut Environment, program: Program, file: &str) -> Result<ContextId, Error> {
    env.check_program(program, file)
}

fn error_name(result: Result<ContextId, Error>) -> String {
    result.unwrap_err().get_error_name().to_string()
}

fn user_type(env: &Environment, name: &str) -> TypeId {
    env.types
        .iter()
        .find(|(_, ty)| ty.name() == name && ty.origin == Origin::UserDefined)
        .map(|(t, _)| t)
        .unwrap()
}

/// `value => type name;`
fn init_stmt(b: &mut AstBuilder, value: i64, ty: &str, name: &str) -> Section {
    let value = b.int(value);
    let decl = b.decl(ty, name);
    let chuck = b.chuck(value, decl);
    Section::stmt(b.expr_stmt(chuck))
}

#[test]
fn test_scope_commit_and_rollback() {
    let mut scope: Scope<u32> = Scope::new();

    scope.add("a", 1);
    assert!(scope.has_pending());
    assert_eq!(scope.lookup("a", Climb::Current), Some(1));
    assert_eq!(scope.rollback(), vec![1]);
    assert_eq!(scope.lookup("a", Climb::Outward), None);

    scope.add("a", 2);
    scope.commit();
    assert!(!scope.has_pending());
    assert_eq!(scope.lookup("a", Climb::Global), Some(2));
    assert!(scope.rollback().is_empty());
    assert_eq!(scope.lookup("a", Climb::Global), Some(2));
}

#[test]
fn test_scope_shadowing() {
    let mut scope: Scope<u32> = Scope::new();
    scope.add("x", 1);
    scope.commit();

    scope.push();
    scope.add("x", 2);
    assert_eq!(scope.lookup("x", Climb::Current), Some(2));
    assert_eq!(scope.lookup("x", Climb::Outward), Some(2));
    assert_eq!(scope.lookup("x", Climb::Global), Some(1));
    assert_eq!(scope.depth(), 2);

    assert_eq!(scope.pop(), Some(vec![2]));
    assert_eq!(scope.lookup("x", Climb::Current), Some(1));
    assert_eq!(scope.pop(), None);
}

#[test]
fn test_climb_from_integer() {
    assert_eq!(Climb::from(0), Climb::Current);
    assert_eq!(Climb::from(1), Climb::Outward);
    assert_eq!(Climb::from(-1), Climb::Global);
}

#[test]
fn test_parse_type_str() {
    assert_eq!(
        parse_type_str("Foo.Bar[][]"),
        Some((vec!["Foo".to_string(), "Bar".to_string()], 2))
    );
    assert_eq!(parse_type_str("int"), Some((vec!["int".to_string()], 0)));
    assert_eq!(parse_type_str("3int"), None);
    assert_eq!(parse_type_str("int[]x"), None);
}

#[test]
fn test_builtin_lookup() {
    let mut env = env();
    let b = env.builtins;

    assert_eq!(env.find_type_str("int"), Some(b.int));
    assert_eq!(env.find_type_str("Object"), Some(b.object));
    assert_eq!(env.find_type_str("NoSuchType"), None);
    let now = env.lookup_value("now", Climb::Outward, false).unwrap();
    assert_eq!(env.values[now].owner, Some(env.global()));
    assert!(env.find_func_in_type(b.string, "toString").is_some());
    assert!(env.find_func_in_type(b.string, "length").is_some());
    assert!(env.find_func_in_type(b.object, "length").is_none());
}

#[test]
fn test_array_types_are_cached() {
    let mut env = env();
    let b = env.builtins;
    let global = env.global();

    let first = env.new_array_type(b.int, 1, global);
    let second = env.new_array_type(b.int, 1, global);
    assert_eq!(first, second);
    assert_eq!(env.type_name(first), "int[]");

    let nested = env.new_array_type(first, 1, global);
    assert_eq!(env.find_type_str("int[][]"), Some(nested));
    assert_eq!(env.types[nested].array_depth(), 2);
    assert_eq!(env.types[nested].array_element(), Some(b.int));

    let floats = env.new_array_type(b.float, 1, global);
    assert!(!env.equals(first, floats));
    assert!(!env.isa(first, floats));
    assert!(env.isa(first, b.object));
    assert!(env.isobj(first));
}

#[test]
fn test_subtyping_and_common_ancestor() {
    let mut env = env();
    let b = env.builtins;

    assert!(env.isa(b.fileio, b.io));
    assert!(env.isa(b.fileio, b.event));
    assert!(env.isa(b.fileio, b.object));
    assert!(!env.isa(b.event, b.io));
    assert!(env.isa(b.null, b.string));
    assert!(!env.isa(b.string, b.null));
    assert!(!env.isa(b.int, b.float));
    assert!(env.assignable(b.int, b.float));

    assert_eq!(env.find_common_anc(b.fileio, b.chout), Some(b.io));
    assert_eq!(env.find_common_anc(b.string, b.event), Some(b.object));
    assert_eq!(env.find_common_anc(b.io, b.fileio), Some(b.io));
    assert_eq!(env.find_common_anc(b.int, b.string), None);

    let global = env.global();
    let files = env.new_array_type(b.fileio, 1, global);
    let events = env.new_array_type(b.event, 1, global);
    assert!(env.isa(files, events));
    assert!(!env.isa(events, files));
}

#[test]
fn test_type_predicates() {
    let env = env();
    let b = env.builtins;

    assert!(env.isvoid(b.void));
    assert!(env.isprim(b.dur));
    assert!(!env.isprim(b.string));
    assert!(env.isobj(b.null));
    assert!(!env.isobj(b.int));
    assert!(env.iskindofint(b.int));
    assert!(env.iskindofint(b.event));
    assert!(!env.iskindofint(b.float));
    assert_eq!(env.next_offset(8, b.vec3), 32);
}

#[test]
fn test_dependency_graph_cycle() {
    let mut funcs: Arena<FuncId, ()> = Arena::new();
    let mut values: Arena<ValueId, ()> = Arena::new();
    let (f, g) = (GraphRef::Func(funcs.insert(())), GraphRef::Func(funcs.insert(())));
    let x = values.insert(());

    let mut graphs: FxHashMap<GraphRef, DependencyGraph> = FxHashMap::default();
    let mut fg = DependencyGraph::new();
    fg.add_remote(g);
    fg.add_remote(g);
    assert_eq!(fg.remotes().len(), 1);
    let mut gg = DependencyGraph::new();
    gg.add_remote(f);
    gg.add(Dependency {
        value: x,
        init_where: 10,
        use_where: 3,
        is_member: false,
    });
    graphs.insert(f, fg);
    graphs.insert(g, gg);

    let found = graphs[&f].locate(5, false, &graphs, &mut SearchToken::rooted_at(f));
    assert_eq!(found.map(|dep| dep.value), Some(x));
    assert!(graphs[&f]
        .locate(20, false, &graphs, &mut SearchToken::rooted_at(f))
        .is_none());
    assert!(graphs[&f]
        .locate(5, true, &graphs, &mut SearchToken::rooted_at(f))
        .is_none());
}

#[test]
fn test_forward_call_before_initialization() {
    let mut env = env();
    let mut b = AstBuilder::new("fwd.ck");

    let x = b.id("x");
    let y = b.decl("int", "y");
    let read = b.chuck(x, y);
    let read = b.expr_stmt(read);
    let foo = b.func("void", "foo", &[], vec![read]);
    let call = b.call("foo", vec![]);
    let call = b.expr_stmt(call);
    let decl = init_stmt(&mut b, 5, "int", "x");
    let program = b.program(vec![Section::func(foo), Section::stmt(call), decl]);

    assert_eq!(error_name(check(&mut env, program, "fwd.ck")), "IllegalForwardUse");
    assert_eq!(env.contexts.len(), 0);
}

#[test]
fn test_call_before_function_definition_is_still_checked() {
    let mut env = env();
    let mut b = AstBuilder::new("fwd.ck");

    let call = b.call("foo", vec![]);
    let call = b.expr_stmt(call);
    let decl = init_stmt(&mut b, 5, "int", "x");
    let x = b.id("x");
    let y = b.decl("int", "y");
    let read = b.chuck(x, y);
    let read = b.expr_stmt(read);
    let foo = b.func("void", "foo", &[], vec![read]);
    let program = b.program(vec![Section::stmt(call), decl, Section::func(foo)]);

    assert_eq!(error_name(check(&mut env, program, "fwd.ck")), "IllegalForwardUse");
}

#[test]
fn test_call_after_initialization_commits_and_clears_graphs() {
    let mut env = env();
    let mut b = AstBuilder::new("ok.ck");

    let x = b.id("x");
    let y = b.decl("int", "y");
    let read = b.chuck(x, y);
    let read = b.expr_stmt(read);
    let foo = b.func("void", "foo", &[], vec![read]);
    let foo_id = foo.id;
    let decl = init_stmt(&mut b, 5, "int", "x");
    let call = b.call("foo", vec![]);
    let call = b.expr_stmt(call);
    let program = b.program(vec![Section::func(foo), decl, Section::stmt(call)]);

    let ctx = check(&mut env, program, "ok.ck").unwrap();
    let context = &env.contexts[ctx];
    assert_eq!(context.progress, Progress::FullyDone);
    assert!(context.parse_tree.is_none());

    let f = context.annotations.func_defs[&foo_id];
    assert!(env.funcs[f].depends.is_empty());
    assert!(env.funcs[f].def().is_none());
    assert_eq!(env.locate(GraphRef::Func(f), 0, false), None);
}

#[test]
fn test_instantiation_before_preconstructor_dependency() {
    let mut env = env();
    let mut b = AstBuilder::new("ctor.ck");

    let x = b.id("x");
    let z = b.decl("int", "z");
    let read = b.chuck(x, z);
    let read = b.expr_stmt(read);
    let class = b.class("A", None, false, vec![Section::stmt(read)]);
    let a = b.decl("A", "a");
    let a = b.expr_stmt(a);
    let decl = init_stmt(&mut b, 5, "int", "x");
    let program = b.program(vec![Section::class(class), Section::stmt(a), decl]);

    assert_eq!(error_name(check(&mut env, program, "ctor.ck")), "IllegalForwardUse");

    let mut b = AstBuilder::new("ctor2.ck");
    let decl = init_stmt(&mut b, 5, "int", "x");
    let x = b.id("x");
    let z = b.decl("int", "z");
    let read = b.chuck(x, z);
    let read = b.expr_stmt(read);
    let class = b.class("A", None, false, vec![Section::stmt(read)]);
    let a = b.decl("A", "a");
    let a = b.expr_stmt(a);
    let program = b.program(vec![decl, Section::class(class), Section::stmt(a)]);

    assert!(check(&mut env, program, "ctor2.ck").is_ok());
}

#[test]
fn test_preconstructor_call_reads_later_member() {
    let mut env = env();
    let mut b = AstBuilder::new("member.ck");

    let n = b.id("n");
    let ret = b.ret(Some(n));
    let get = b.func("int", "get", &[], vec![ret]);
    let call = b.call("get", vec![]);
    let m = b.decl("int", "m");
    let init_m = b.chuck(call, m);
    let init_m = b.expr_stmt(init_m);
    let init_n = init_stmt(&mut b, 5, "int", "n");
    let class = b.class(
        "B",
        None,
        false,
        vec![Section::func(get), Section::stmt(init_m), init_n],
    );
    let program = b.program(vec![Section::class(class)]);

    assert_eq!(error_name(check(&mut env, program, "member.ck")), "IllegalForwardUse");
}

#[test]
fn test_classes_reference_each_other_in_any_order() {
    for (first, second) in [("A", "B"), ("B", "A")] {
        let mut env = env();
        let mut b = AstBuilder::new("mutual.ck");

        let to_second = b.decl(&format!("{} @", second), "other");
        let to_second = b.expr_stmt(to_second);
        let first_class = b.class(first, None, false, vec![Section::stmt(to_second)]);
        let to_first = b.decl(&format!("{} @", first), "other");
        let to_first = b.expr_stmt(to_first);
        let second_class = b.class(second, None, false, vec![Section::stmt(to_first)]);
        let program = b.program(vec![Section::class(first_class), Section::class(second_class)]);

        check(&mut env, program, "mutual.ck").unwrap();
        let (a, b) = (user_type(&env, "A"), user_type(&env, "B"));
        let member = env.find_value_in_type(a, "other").unwrap();
        assert_eq!(env.values[member].ty, b);
        assert!(env.types[a].is_complete);
        assert_eq!(env.types[a].obj_size, 8);
    }
}

#[test]
fn test_class_cannot_contain_itself() {
    let mut env = env();
    let mut b = AstBuilder::new("self.ck");
    let next = b.decl("Node", "next");
    let next = b.expr_stmt(next);
    let class = b.class("Node", None, false, vec![Section::stmt(next)]);
    let program = b.program(vec![Section::class(class)]);
    assert_eq!(error_name(check(&mut env, program, "self.ck")), "IncompleteType");

    let mut b = AstBuilder::new("self.ck");
    let next = b.decl("Node @", "next");
    let next = b.expr_stmt(next);
    let class = b.class("Node", None, false, vec![Section::stmt(next)]);
    let program = b.program(vec![Section::class(class)]);
    assert!(check(&mut env, program, "self.ck").is_ok());
}

#[test]
fn test_cyclic_inheritance() {
    let mut env = env();
    let mut b = AstBuilder::new("cycle.ck");
    let a = b.class("A", Some("B"), false, vec![]);
    let c = b.class("B", Some("A"), false, vec![]);
    let program = b.program(vec![Section::class(a), Section::class(c)]);
    assert_eq!(error_name(check(&mut env, program, "cycle.ck")), "CyclicInheritance");

    let mut b = AstBuilder::new("cycle.ck");
    let a = b.class("A", Some("A"), false, vec![]);
    let program = b.program(vec![Section::class(a)]);
    assert_eq!(error_name(check(&mut env, program, "cycle.ck")), "CyclicInheritance");
}

#[test]
fn test_multiple_public_classes() {
    let mut env = env();
    let mut b = AstBuilder::new("pub.ck");
    let a = b.class("A", None, true, vec![]);
    let c = b.class("C", None, true, vec![]);
    let program = b.program(vec![Section::class(a), Section::class(c)]);
    assert_eq!(error_name(check(&mut env, program, "pub.ck")), "MultiplePublicClasses");
}

#[test]
fn test_public_classes_outlive_their_fragment() {
    let mut env = env();
    let mut b = AstBuilder::new("one.ck");
    let v = b.decl("int", "v");
    let v = b.expr_stmt(v);
    let shared = b.class("Shared", None, true, vec![Section::stmt(v)]);
    let hidden = b.class("Hidden", None, false, vec![]);
    let program = b.program(vec![Section::class(shared), Section::class(hidden)]);
    let one = check(&mut env, program, "one.ck").unwrap();

    let mut b = AstBuilder::new("two.ck");
    let s = b.decl("Shared", "s");
    let s = b.expr_stmt(s);
    let read = b.id("s");
    let read = b.member(read, "v");
    let w = b.decl("int", "w");
    let read = b.chuck(read, w);
    let read = b.expr_stmt(read);
    let program = b.program(vec![Section::stmt(s), Section::stmt(read)]);
    check(&mut env, program, "two.ck").unwrap();

    let mut b = AstBuilder::new("three.ck");
    let h = b.decl("Hidden", "h");
    let h = b.expr_stmt(h);
    let program = b.program(vec![Section::stmt(h)]);
    assert_eq!(error_name(check(&mut env, program, "three.ck")), "UndeclaredIdentifier");

    assert!(env.find_type_str("Shared").is_some());
    env.release_context(one).unwrap();
    assert_eq!(env.find_type_str("Shared"), None);
}

#[test]
fn test_failed_fragment_leaves_nothing_behind() {
    let mut env = env();
    let before = (env.types.len(), env.values.len(), env.funcs.len(), env.nspcs.len());

    let mut b = AstBuilder::new("bad.ck");
    let class = b.class("Tmp", None, true, vec![]);
    let good = init_stmt(&mut b, 1, "int", "good");
    let helper = b.func("void", "helper", &[], vec![]);
    let missing = b.id("undefined_thing");
    let missing = b.expr_stmt(missing);
    let program = b.program(vec![
        Section::class(class),
        good,
        Section::func(helper),
        Section::stmt(missing),
    ]);
    assert_eq!(error_name(check(&mut env, program, "bad.ck")), "UndeclaredIdentifier");

    let after = (env.types.len(), env.values.len(), env.funcs.len(), env.nspcs.len());
    assert_eq!(before, after);
    assert_eq!(env.contexts.len(), 0);
    assert_eq!(env.find_type_str("Tmp"), None);
    assert_eq!(
        env.diagnostics.last_error().map(|e| e.get_error_name()),
        Some("UndeclaredIdentifier")
    );

    let mut b = AstBuilder::new("good.ck");
    let class = b.class("Tmp", None, true, vec![]);
    let program = b.program(vec![Section::class(class)]);
    assert!(check(&mut env, program, "good.ck").is_ok());
}

#[test]
fn test_context_progress_and_states() {
    let mut env = env();
    let mut b = AstBuilder::new("staged.ck");
    let class = b.class("Staged", None, false, vec![]);
    let program = b.program(vec![Section::class(class)]);

    let ctx = env.make_context(program, "staged.ck");
    assert_eq!(error_name(env.check_context(ctx, HowMuch::All).map(|_| ctx)), "InvalidContextState");

    let mut b = AstBuilder::new("staged.ck");
    let class = b.class("Staged", None, false, vec![]);
    let program = b.program(vec![Section::class(class)]);
    let ctx = env.make_context(program, "staged.ck");
    env.load_context(ctx).unwrap();
    assert!(env.load_context(ctx).is_err());

    env.check_context(ctx, HowMuch::ClassesOnly).unwrap();
    assert_eq!(env.contexts[ctx].progress, Progress::ClassesScanned);
    env.check_context(ctx, HowMuch::NoClasses).unwrap();
    assert_eq!(env.contexts[ctx].progress, Progress::FullyDone);
    env.unload_context(ctx).unwrap();
    assert!(env.contexts.contains(ctx));

    let mut b = AstBuilder::new("early.ck");
    let program = b.program(vec![]);
    let early = env.make_context(program, "early.ck");
    env.load_context(early).unwrap();
    assert!(env.check_context(early, HowMuch::NoClasses).is_err());
    env.unload_context(early).unwrap();
    assert!(!env.contexts.contains(early));
}

/// `public class name [extends parent] {}` checked as its own fragment.
fn public_class(env: &mut Environment, file: &str, name: &str, parent: Option<&str>) -> ContextId {
    let mut b = AstBuilder::new(file);
    let class = b.class(name, parent, true, vec![]);
    let program = b.program(vec![Section::class(class)]);
    check(env, program, file).unwrap()
}

#[test]
fn test_committed_context_cannot_be_checked_again() {
    let mut env = env();
    let ctx = public_class(&mut env, "shared.ck", "Shared", None);
    assert_eq!(env.contexts[ctx].progress, Progress::FullyDone);

    assert_eq!(error_name(env.load_context(ctx).map(|_| ctx)), "InvalidContextState");
    assert!(env.current_context().is_none());
    assert_eq!(error_name(env.check_context(ctx, HowMuch::All).map(|_| ctx)), "InvalidContextState");
    assert!(env.unload_context(ctx).is_err());

    assert!(env.contexts.contains(ctx));
    assert!(!env.contexts[ctx].has_error);
    assert!(env.find_type_str("Shared").is_some());

    let mut b = AstBuilder::new("user.ck");
    let s = b.decl("Shared", "s");
    let s = b.expr_stmt(s);
    let program = b.program(vec![Section::stmt(s)]);
    let user = check(&mut env, program, "user.ck").unwrap();

    env.release_context(user).unwrap();
    env.release_context(ctx).unwrap();
    assert_eq!(env.find_type_str("Shared"), None);
}

#[test]
fn test_release_waits_for_dependent_contexts() {
    let mut env = env();
    let base = public_class(&mut env, "a.ck", "Base", None);
    let derived = public_class(&mut env, "b.ck", "Derived", Some("Base"));

    assert_eq!(error_name(env.release_context(base).map(|_| base)), "InvalidContextState");
    assert!(env.contexts.contains(base));
    assert!(env.find_type_str("Base").is_some());
    let d = env.find_type_str("Derived").unwrap();
    assert!(env.isobj(d));

    let mut b = AstBuilder::new("c.ck");
    let decl = b.decl("Derived", "d");
    let decl = b.expr_stmt(decl);
    let read = b.id("d");
    let o = b.decl("Object", "o");
    let upcast = b.chuck(read, o);
    let upcast = b.expr_stmt(upcast);
    let program = b.program(vec![Section::stmt(decl), Section::stmt(upcast)]);
    let user = check(&mut env, program, "c.ck").unwrap();

    let mut b = AstBuilder::new("holder.ck");
    let decl = b.decl("Base", "bb");
    let decl = b.expr_stmt(decl);
    let program = b.program(vec![Section::stmt(decl)]);
    let holder = check(&mut env, program, "holder.ck").unwrap();

    assert_eq!(error_name(env.release_context(derived).map(|_| derived)), "InvalidContextState");
    env.release_context(user).unwrap();
    env.release_context(derived).unwrap();
    assert_eq!(env.find_type_str("Derived"), None);

    assert_eq!(error_name(env.release_context(base).map(|_| base)), "InvalidContextState");
    env.release_context(holder).unwrap();
    env.release_context(base).unwrap();
    assert_eq!(env.find_type_str("Base"), None);
    assert!(env.resident_contexts().is_empty());
}

#[test]
fn test_reserved_words() {
    let mut env = env();
    assert_eq!(env.reserved_kind("int"), Some(ReservedKind::Type));
    assert_eq!(env.reserved_kind("while"), Some(ReservedKind::Word));
    assert_eq!(env.reserved_kind("pi"), Some(ReservedKind::Value));
    assert!(!env.is_reserved("frequency"));

    let mut b = AstBuilder::new("r.ck");
    let pi = b.decl("float", "pi");
    let pi = b.expr_stmt(pi);
    let program = b.program(vec![Section::stmt(pi)]);
    assert_eq!(error_name(check(&mut env, program, "r.ck")), "ReservedWordViolation");

    assert!(env.enable_reserved("pi", false));
    assert!(!env.enable_reserved("frequency", false));
    let mut b = AstBuilder::new("r.ck");
    let pi = b.decl("float", "pi");
    let pi = b.expr_stmt(pi);
    let program = b.program(vec![Section::stmt(pi)]);
    assert!(check(&mut env, program, "r.ck").is_ok());
}

fn deprecated_program() -> Program {
    let mut b = AstBuilder::new("old.ck");
    let e = b.decl("Evt", "e");
    let e = b.expr_stmt(e);
    b.program(vec![Section::stmt(e)])
}

#[test]
fn test_deprecation_levels() {
    let mut env = env();
    env.register_deprecate("Evt", "Event");
    assert_eq!(env.get_deprecate("Evt"), Some("Event"));
    assert!(check(&mut env, deprecated_program(), "old.ck").is_ok());
    assert!(!env.diagnostics.warnings().is_empty());

    let config = EnvConfig::default().with_deprecate_level(DeprecateLevel::Reject);
    let mut env = Environment::new(config).unwrap();
    env.register_deprecate("Evt", "Event");
    assert_eq!(error_name(check(&mut env, deprecated_program(), "old.ck")), "DeprecatedName");

    let config = EnvConfig::default().with_deprecate_level(DeprecateLevel::Ignore);
    let mut env = Environment::new(config).unwrap();
    env.register_deprecate("Evt", "Event");
    assert!(check(&mut env, deprecated_program(), "old.ck").is_ok());
    assert!(env.diagnostics.warnings().is_empty());
}

#[test]
fn test_overloads_and_overrides() {
    let mut env = env();
    let mut b = AstBuilder::new("over.ck");

    let a = b.id("a");
    let ret = b.ret(Some(a));
    let f_int = b.func("int", "f", &[("int", "a")], vec![ret]);
    let a = b.id("a");
    let ret = b.ret(Some(a));
    let f_float = b.func("float", "f", &[("float", "a")], vec![ret]);
    let base = b.class("Base", None, false, vec![Section::func(f_int), Section::func(f_float)]);

    let a = b.id("a");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, a, one);
    let ret = b.ret(Some(sum));
    let f_override = b.func("int", "f", &[("int", "a")], vec![ret]);
    let derived = b.class("Derived", Some("Base"), false, vec![Section::func(f_override)]);

    let d = b.decl("Derived", "d");
    let d = b.expr_stmt(d);
    let receiver = b.id("d");
    let one = b.int(1);
    let int_call = b.method_call(receiver, "f", vec![one]);
    let int_call_id = int_call.id;
    let int_call = b.expr_stmt(int_call);
    let receiver = b.id("d");
    let half = b.float(2.5);
    let float_call = b.method_call(receiver, "f", vec![half]);
    let float_call_id = float_call.id;
    let float_call = b.expr_stmt(float_call);

    let program = b.program(vec![
        Section::class(base),
        Section::class(derived),
        Section::stmt(d),
        Section::stmt(int_call),
        Section::stmt(float_call),
    ]);
    let ctx = check(&mut env, program, "over.ck").unwrap();

    let (base, derived) = (user_type(&env, "Base"), user_type(&env, "Derived"));
    let vtable = env.nspcs[env.types[derived].info.unwrap()].vtable.clone();
    assert_eq!(vtable.len(), 3);
    assert_eq!(env.funcs[vtable[1]].owner_class, Some(derived));
    assert!(env.funcs[vtable[1]].up.is_some());
    assert_eq!(env.funcs[vtable[2]].owner_class, Some(base));
    assert_eq!(env.funcs[vtable[2]].name, "f@1@Base");

    let annotations = &env.contexts[ctx].annotations;
    let int_target = annotations.call_target(int_call_id).unwrap();
    let float_target = annotations.call_target(float_call_id).unwrap();
    assert_eq!(int_target, vtable[1]);
    assert_eq!(float_target, vtable[2]);
    assert_eq!(annotations.type_of(float_call_id), Some(env.builtins.float));
}

#[test]
fn test_duplicate_signature_and_no_matching_overload() {
    let mut env = env();
    let mut b = AstBuilder::new("dup.ck");
    let first = b.func("void", "g", &[("int", "a")], vec![]);
    let second = b.func("int", "g", &[("int", "b")], vec![]);
    let program = b.program(vec![Section::func(first), Section::func(second)]);
    assert_eq!(error_name(check(&mut env, program, "dup.ck")), "DuplicateDeclaration");

    let mut b = AstBuilder::new("nomatch.ck");
    let g = b.func("void", "g", &[("int", "a")], vec![]);
    let text = b.string("text");
    let call = b.call("g", vec![text]);
    let call = b.expr_stmt(call);
    let program = b.program(vec![Section::func(g), Section::stmt(call)]);
    assert_eq!(error_name(check(&mut env, program, "nomatch.ck")), "NoMatchingOverload");
}

#[test]
fn test_auto_inference() {
    let mut env = env();
    let mut b = AstBuilder::new("auto.ck");

    let five = b.int(5);
    let x = b.decl("auto", "x");
    let x_id = x.id;
    let init_x = b.chuck(five, x);
    let init_x = b.expr_stmt(init_x);
    let read = b.id("x");
    let two = b.float(2.0);
    let sum = b.binary(BinaryOp::Add, read, two);
    let y = b.decl("auto", "y");
    let y_id = y.id;
    let init_y = b.chuck(sum, y);
    let init_y = b.expr_stmt(init_y);
    let program = b.program(vec![Section::stmt(init_x), Section::stmt(init_y)]);

    let ctx = check(&mut env, program, "auto.ck").unwrap();
    let annotations = &env.contexts[ctx].annotations;
    let x = annotations.declared(x_id)[0];
    let y = annotations.declared(y_id)[0];
    assert_eq!(env.values[x].ty, env.builtins.int);
    assert_eq!(env.values[y].ty, env.builtins.float);

    let mut b = AstBuilder::new("auto.ck");
    let bare = b.decl("auto", "z");
    let bare = b.expr_stmt(bare);
    let program = b.program(vec![Section::stmt(bare)]);
    assert_eq!(error_name(check(&mut env, program, "auto.ck")), "ExpectedExplicitValue");

    let mut b = AstBuilder::new("auto.ck");
    let null = b.id("null");
    let n = b.decl("auto", "n");
    let init = b.chuck(null, n);
    let init = b.expr_stmt(init);
    let program = b.program(vec![Section::stmt(init)]);
    assert_eq!(error_name(check(&mut env, program, "auto.ck")), "TypeMismatch");
}

#[test]
fn test_spork_restrictions() {
    let mut env = env();
    let mut b = AstBuilder::new("spork.ck");
    let worker = b.func("void", "worker", &[], vec![]);
    let call = b.call("worker", vec![]);
    let spork = b.spork(call);
    let spork_id = spork.id;
    let spork = b.expr_stmt(spork);
    let program = b.program(vec![Section::func(worker), Section::stmt(spork)]);
    let ctx = check(&mut env, program, "spork.ck").unwrap();
    assert_eq!(
        env.contexts[ctx].annotations.type_of(spork_id),
        Some(env.builtins.shred)
    );

    let mut b = AstBuilder::new("spork.ck");
    let five = b.int(5);
    let spork = b.spork(five);
    let spork = b.expr_stmt(spork);
    let program = b.program(vec![Section::stmt(spork)]);
    assert_eq!(error_name(check(&mut env, program, "spork.ck")), "SporkRestriction");

    let mut b = AstBuilder::new("nested.ck");
    let worker = b.func("void", "worker", &[], vec![]);
    let outer = b.func("void", "outer", &[("Shred", "s")], vec![]);
    let inner_call = b.call("worker", vec![]);
    let inner = b.spork(inner_call);
    let outer_call = b.call("outer", vec![inner]);
    let spork = b.spork(outer_call);
    let spork = b.expr_stmt(spork);
    let program = b.program(vec![
        Section::func(worker),
        Section::func(outer),
        Section::stmt(spork),
    ]);
    assert_eq!(error_name(check(&mut env, program, "nested.ck")), "SporkRestriction");
}

#[test]
fn test_member_functions_do_not_see_file_variables() {
    let mut env = env();
    let mut b = AstBuilder::new("enc.ck");
    let decl = init_stmt(&mut b, 5, "int", "x");
    let x = b.id("x");
    let y = b.decl("int", "y");
    let read = b.chuck(x, y);
    let read = b.expr_stmt(read);
    let f = b.func("void", "f", &[], vec![read]);
    let class = b.class("A", None, false, vec![Section::func(f)]);
    let program = b.program(vec![decl, Section::class(class)]);
    assert_eq!(error_name(check(&mut env, program, "enc.ck")), "UndeclaredIdentifier");
}

#[test]
fn test_static_and_private_member_access() {
    let mut env = env();
    let mut b = AstBuilder::new("access.ck");
    let total = b.static_decl("int", "total");
    let total = b.expr_stmt(total);
    let n = b.decl("int", "n");
    let n = b.expr_stmt(n);
    let secret_ty = b.ty("int");
    let secret = b.decl_with(VarDecl {
        ty: secret_ty,
        name: "secret".to_string(),
        is_static: false,
        is_const: false,
        access: Access::Private,
    });
    let secret = b.expr_stmt(secret);
    let class = b.class(
        "Counter",
        None,
        false,
        vec![Section::stmt(total), Section::stmt(n), Section::stmt(secret)],
    );
    let class_name = b.id("Counter");
    let read = b.member(class_name, "total");
    let t = b.decl("int", "t");
    let read = b.chuck(read, t);
    let read = b.expr_stmt(read);
    let program = b.program(vec![Section::class(class), Section::stmt(read)]);
    let ctx = check(&mut env, program, "access.ck").unwrap();

    let counter = user_type(&env, "Counter");
    let info = env.types[counter].info.unwrap();
    assert_eq!(env.nspcs[info].class_data_size, 8);
    assert_eq!(env.types[counter].obj_size, 16);
    assert!(env.contexts.contains(ctx));

    let mut b = AstBuilder::new("access2.ck");
    let n = b.decl("int", "n");
    let n = b.expr_stmt(n);
    let class = b.class("Other", None, false, vec![Section::stmt(n)]);
    let class_name = b.id("Other");
    let read = b.member(class_name, "n");
    let read = b.expr_stmt(read);
    let program = b.program(vec![Section::class(class), Section::stmt(read)]);
    assert_eq!(error_name(check(&mut env, program, "access2.ck")), "AccessViolation");

    let mut b = AstBuilder::new("access3.ck");
    let secret_ty = b.ty("int");
    let secret = b.decl_with(VarDecl {
        ty: secret_ty,
        name: "secret".to_string(),
        is_static: false,
        is_const: false,
        access: Access::Private,
    });
    let secret = b.expr_stmt(secret);
    let class = b.class("Vault", None, false, vec![Section::stmt(secret)]);
    let v = b.decl("Vault", "v");
    let v = b.expr_stmt(v);
    let receiver = b.id("v");
    let read = b.member(receiver, "secret");
    let read = b.expr_stmt(read);
    let program = b.program(vec![Section::class(class), Section::stmt(v), Section::stmt(read)]);
    assert_eq!(error_name(check(&mut env, program, "access3.ck")), "AccessViolation");
}

#[test]
fn test_statement_errors() {
    let mut env = env();

    let mut b = AstBuilder::new("ctl.ck");
    let brk = b.brk();
    let program = b.program(vec![Section::stmt(brk)]);
    assert_eq!(error_name(check(&mut env, program, "ctl.ck")), "MisplacedControl");

    let mut b = AstBuilder::new("ctl.ck");
    let ret = b.ret(None);
    let program = b.program(vec![Section::stmt(ret)]);
    assert_eq!(error_name(check(&mut env, program, "ctl.ck")), "MisplacedControl");

    let mut b = AstBuilder::new("ret.ck");
    let text = b.string("no");
    let ret = b.ret(Some(text));
    let f = b.func("int", "f", &[], vec![ret]);
    let program = b.program(vec![Section::func(f)]);
    assert_eq!(error_name(check(&mut env, program, "ret.ck")), "InvalidReturn");

    let mut b = AstBuilder::new("const.ck");
    let five = b.int(5);
    let now = b.id("now");
    let assign = b.chuck(five, now);
    let assign = b.expr_stmt(assign);
    let program = b.program(vec![Section::stmt(assign)]);
    assert_eq!(error_name(check(&mut env, program, "const.ck")), "ConstAssignment");

    let mut b = AstBuilder::new("mismatch.ck");
    let text = b.string("hi");
    let x = b.decl("int", "x");
    let assign = b.chuck(text, x);
    let assign = b.expr_stmt(assign);
    let program = b.program(vec![Section::stmt(assign)]);
    assert_eq!(error_name(check(&mut env, program, "mismatch.ck")), "TypeMismatch");
}

#[test]
fn test_loops_allow_break() {
    let mut env = env();
    let mut b = AstBuilder::new("loop.ck");
    let cond = b.int(1);
    let brk = b.brk();
    let body = b.block(vec![brk]);
    let lp = b.while_stmt(cond, body);
    let program = b.program(vec![Section::stmt(lp)]);
    assert!(check(&mut env, program, "loop.ck").is_ok());
}

#[test]
fn test_expression_types() {
    let mut env = env();
    let mut b = AstBuilder::new("expr.ck");

    let cond = b.int(1);
    let two = b.int(2);
    let three = b.float(3.0);
    let ternary = b.ternary(cond, two, three);
    let ternary_id = ternary.id;
    let ternary = b.expr_stmt(ternary);

    let one = b.int(1);
    let two = b.float(2.0);
    let array = b.array(vec![one, two]);
    let array_id = array.id;
    let zero = b.int(0);
    let index = b.index(array, zero);
    let index_id = index.id;
    let index = b.expr_stmt(index);

    let second = b.id("second");
    let two = b.int(2);
    let doubled = b.binary(BinaryOp::Mul, second, two);
    let doubled_id = doubled.id;
    let doubled = b.expr_stmt(doubled);

    let now = b.id("now");
    let ms = b.id("ms");
    let later = b.binary(BinaryOp::Add, now, ms);
    let later_id = later.id;
    let later = b.expr_stmt(later);

    let pi = b.id("pi");
    let cast = b.cast(pi, "int");
    let cast_id = cast.id;
    let cast = b.expr_stmt(cast);

    let program = b.program(vec![
        Section::stmt(ternary),
        Section::stmt(index),
        Section::stmt(doubled),
        Section::stmt(later),
        Section::stmt(cast),
    ]);
    let ctx = check(&mut env, program, "expr.ck").unwrap();

    let builtins = env.builtins;
    let float_array = env.find_type_str("float[]").unwrap();
    let annotations = &env.contexts[ctx].annotations;
    assert_eq!(annotations.type_of(ternary_id), Some(builtins.float));
    assert_eq!(annotations.type_of(array_id), Some(float_array));
    assert_eq!(annotations.type_of(index_id), Some(builtins.float));
    assert_eq!(annotations.type_of(doubled_id), Some(builtins.dur));
    assert_eq!(annotations.type_of(later_id), Some(builtins.time));
    assert_eq!(annotations.type_of(cast_id), Some(builtins.int));
}

#[test]
fn test_expression_errors() {
    let mut env = env();

    let mut b = AstBuilder::new("empty.ck");
    let empty = b.array(vec![]);
    let empty = b.expr_stmt(empty);
    let program = b.program(vec![Section::stmt(empty)]);
    assert_eq!(error_name(check(&mut env, program, "empty.ck")), "TypeMismatch");

    let mut b = AstBuilder::new("op.ck");
    let now = b.id("now");
    let later = b.id("now");
    let sum = b.binary(BinaryOp::Add, now, later);
    let sum = b.expr_stmt(sum);
    let program = b.program(vec![Section::stmt(sum)]);
    assert_eq!(error_name(check(&mut env, program, "op.ck")), "NoSuchOperator");

    let mut b = AstBuilder::new("cast.ck");
    let text = b.string("s");
    let cast = b.cast(text, "int");
    let cast = b.expr_stmt(cast);
    let program = b.program(vec![Section::stmt(cast)]);
    assert_eq!(error_name(check(&mut env, program, "cast.ck")), "TypeMismatch");
}

#[test]
fn test_import_class() {
    let mut env = env();
    let global = env.global();

    let counter = env
        .import_class_begin("Counter", "Object", global, Some(NativeHook(1)), None, "counts")
        .unwrap();
    assert_eq!(env.find_type_str("Counter"), None);
    assert_eq!(env.import_mvar("int", "count", false, "").unwrap(), 0);
    assert_eq!(env.import_mvar("float", "rate", false, "").unwrap(), 8);
    env.import_svar("int", "instances", true, NativeHook(2), "").unwrap();
    let get = env
        .import_mfun(ImportedFunc::new("int", "get", NativeHook(3)).doc("current count"))
        .unwrap();
    env.import_sfun(
        ImportedFunc::new("int", "make", NativeHook(4)).arg("int", "start"),
    )
    .unwrap();
    env.import_add_ex("Counter c; c.get();").unwrap();
    assert_eq!(env.import_class_end().unwrap(), counter);

    assert_eq!(env.find_type_str("Counter"), Some(counter));
    let ty = &env.types[counter];
    assert!(ty.is_complete);
    assert_eq!(ty.obj_size, 16);
    assert_eq!(ty.origin, Origin::NativeExtension);
    assert_eq!(env.funcs[get].vt_index, Some(1));

    let text = env.apropos(counter);
    assert!(text.starts_with("class Counter extends Object"));
    assert!(text.contains("fun int Counter.get()"));
    assert!(text.contains("static fun int Counter.make( int start )"));
    assert!(text.contains("inherited from Object"));
    assert!(text.contains("Counter c; c.get();"));
}

#[test]
fn test_failed_import_is_atomic() {
    let mut env = env();
    let global = env.global();
    let before = (env.types.len(), env.values.len(), env.funcs.len(), env.nspcs.len());

    env.import_class_begin("Osc", "UGen", global, None, None, "").unwrap();
    env.import_mvar("float", "freq", false, "").unwrap();
    let clash = env.import_mfun(ImportedFunc::new("float", "freq", NativeHook(1)));
    assert_eq!(clash.unwrap_err().get_error_name(), "DuplicateDeclaration");

    let after = (env.types.len(), env.values.len(), env.funcs.len(), env.nspcs.len());
    assert_eq!(before, after);
    assert_eq!(env.find_type_str("Osc"), None);
    assert!(env.import_class_end().is_err());

    env.import_class_begin("Osc", "UGen", global, None, None, "").unwrap();
    env.import_class_end().unwrap();
    assert!(env.find_type_str("Osc").is_some());
}

#[test]
fn test_import_contract_violations() {
    let mut env = env();
    let global = env.global();

    env.import_class_begin("First", "Object", global, None, None, "").unwrap();
    let nested = env.import_class_begin("Second", "Object", global, None, None, "");
    assert_eq!(nested.unwrap_err().get_error_name(), "ImportContractViolation");
    assert_eq!(env.find_type_str("First"), None);
    assert_eq!(env.find_type_str("Second"), None);

    assert!(env.import_mvar("int", "orphan", false, "").is_err());
    let reserved = env.import_class_begin("while", "Object", global, None, None, "");
    assert_eq!(reserved.unwrap_err().get_error_name(), "ReservedWordViolation");
    let not_ugen = env.import_ugen_begin(
        "Fake",
        "Event",
        global,
        None,
        None,
        Default::default(),
        "",
    );
    assert_eq!(not_ugen.unwrap_err().get_error_name(), "TypeMismatch");

    let mut b = AstBuilder::new("busy.ck");
    let program = b.program(vec![]);
    let ctx = env.make_context(program, "busy.ck");
    env.load_context(ctx).unwrap();
    let busy = env.import_class_begin("Busy", "Object", global, None, None, "");
    assert_eq!(busy.unwrap_err().get_error_name(), "ImportContractViolation");
    env.unload_context(ctx).unwrap();
}

#[test]
fn test_clear_user_namespace() {
    let mut env = env();
    let mut b = AstBuilder::new("pub.ck");
    let class = b.class("Temp", None, true, vec![]);
    let program = b.program(vec![Section::class(class)]);
    check(&mut env, program, "pub.ck").unwrap();
    assert!(env.find_type_str("Temp").is_some());

    env.clear_user_namespace();
    assert_eq!(env.find_type_str("Temp"), None);
    assert!(env.resident_contexts().is_empty());
    assert!(env.find_type_str("Object").is_some());
}
