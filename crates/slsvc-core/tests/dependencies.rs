//! Dependency tracking and shutdown ordering.

mod common;

use common::*;
use slsvc_core::{ModuleId, Runtime, UnloadError};

fn loads_and_uses_base(rt: &Runtime, me: ModuleId) -> bool {
    let base = match rt.find_module("svc/base") {
        Some(base) => base,
        None => match rt.load_module("svc/base") {
            Ok(base) => base,
            Err(_) => return false,
        },
    };
    rt.use_module(base, me);
    record("child init");
    true
}

fn releases_base(rt: &Runtime, me: ModuleId, shutdown: bool) -> bool {
    if let Some(base) = rt.find_module("svc/base") {
        rt.unuse_module(base, me);
    }
    record(format!("child exit shutdown={shutdown}"));
    true
}

fn forgets_base(_rt: &Runtime, _me: ModuleId, _shutdown: bool) -> bool {
    true
}

fn pair() -> (Runtime, ModuleId, ModuleId) {
    let rt = runtime(vec![module("a"), module("b"), module("c")]);
    let a = rt.load_module("a").unwrap();
    let b = rt.load_module("b").unwrap();
    (rt, a, b)
}

#[test]
fn second_edge_of_a_cycle_is_rejected() {
    let (rt, a, b) = pair();
    rt.use_module(a, b);
    rt.use_module(b, a);
    assert_eq!(rt.dependents(a), vec![b]);
    assert!(rt.dependents(b).is_empty());
}

#[test]
fn transitive_cycles_are_rejected() {
    let (rt, a, b) = pair();
    let c = rt.load_module("c").unwrap();
    rt.use_module(a, b);
    rt.use_module(b, c);
    rt.use_module(c, a);
    assert!(rt.dependents(c).is_empty());
}

#[test]
fn self_use_is_a_no_op() {
    let (rt, a, _) = pair();
    rt.use_module(a, a);
    assert!(rt.dependents(a).is_empty());
}

#[test]
fn used_module_cannot_unload_until_released() {
    let (rt, a, b) = pair();
    rt.use_module(a, b);

    assert_eq!(
        rt.unload_module(a),
        Err(UnloadError::InUse {
            module: "a".into(),
            dependents: vec!["b".into()],
        })
    );
    assert!(rt.is_loaded(a));

    rt.unuse_module(a, b);
    assert_eq!(rt.unload_module(a), Ok(()));
}

#[test]
fn repeated_use_needs_repeated_unuse() {
    let (rt, a, b) = pair();
    rt.use_module(a, b);
    rt.use_module(a, b);
    rt.unuse_module(a, b);
    assert!(rt.unload_module(a).is_err());
    rt.unuse_module(a, b);
    assert!(rt.unload_module(a).is_ok());
}

#[test]
fn unuse_misuse_is_ignored() {
    let (rt, a, b) = pair();
    rt.unuse_module(a, b);
    rt.use_module(a, b);
    rt.unuse_module(a, ModuleId::CORE);
    assert_eq!(rt.dependents(a), vec![b]);
}

#[test]
fn module_can_load_its_dependency_from_init() {
    let rt = runtime(vec![
        module("svc/base"),
        module_with("svc/child", loads_and_uses_base, releases_base),
    ]);
    let child = rt.load_module("svc/child").unwrap();
    let base = rt.find_module("svc/base").unwrap();
    // The nested load lands in front of the module that triggered it.
    assert_eq!(names(&rt), vec!["svc/base", "svc/child", "core"]);
    assert_eq!(rt.dependents(base), vec![child]);

    assert!(matches!(rt.unload_module(base), Err(UnloadError::InUse { .. })));
    rt.unload_module(child).unwrap();
    assert!(rt.dependents(base).is_empty());
    rt.unload_module(base).unwrap();
}

#[test]
fn stale_dependencies_are_scrubbed_on_unload() {
    let rt = runtime(vec![
        module("svc/base"),
        module_with("svc/child", loads_and_uses_base, forgets_base),
    ]);
    let child = rt.load_module("svc/child").unwrap();
    let base = rt.find_module("svc/base").unwrap();

    rt.unload_module(child).unwrap();
    assert!(rt.dependents(base).is_empty());
    assert!(rt.unload_module(base).is_ok());
}

#[test]
fn unload_all_goes_dependents_first() {
    let rt = runtime(vec![
        module("svc/base"),
        module("misc/other"),
        module_with("svc/child", loads_and_uses_base, releases_base),
    ]);
    rt.load_module("svc/base").unwrap();
    rt.load_module("svc/child").unwrap();
    rt.load_module("misc/other").unwrap();
    take_events();

    assert!(rt.unload_all().is_empty());
    assert_eq!(names(&rt), vec!["core"]);
    assert_eq!(
        take_events(),
        vec![
            "exit misc/other shutdown=true",
            "child exit shutdown=true",
            "exit svc/base shutdown=true",
        ]
    );
}

#[test]
fn unload_all_terminates_and_reports_stuck_modules() {
    let (rt, a, _) = pair();
    // Core never unloads, so anything it holds survives shutdown.
    rt.use_module(a, ModuleId::CORE);

    let stuck = rt.unload_all();
    assert_eq!(stuck, vec!["a".to_string()]);
    assert_eq!(names(&rt), vec!["a", "core"]);
    assert!(rt.is_shutting_down());
}
