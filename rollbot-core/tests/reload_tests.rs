// File: rollbot-core/tests/reload_tests.rs

use std::sync::Arc;

use rollbot_common::models::{Extension, ScopeId};
use rollbot_core::ActivationConfig;
use rollbot_core::extensions::{Registry, ReloadCoordinator, ScopeActivationController};

fn engine(exts: Vec<Extension>) -> (Arc<ScopeActivationController>, ReloadCoordinator) {
    let registry = Arc::new(Registry::new());
    registry.register_all(exts).unwrap();
    let controller = Arc::new(ScopeActivationController::new(
        registry,
        &ActivationConfig::default(),
    ));
    let coordinator = ReloadCoordinator::new(Arc::clone(&controller));
    (controller, coordinator)
}

#[test]
fn test_restore_batch_follows_snapshot_not_argument_order() {
    let (controller, _) = engine(vec![Extension::new("ext1"), Extension::new("ext2")]);
    let s = ScopeId::from("g");
    controller.activate(&s, "ext1").unwrap();
    controller.activate(&s, "ext2").unwrap();
    assert_eq!(controller.snapshot(&s), vec!["ext2", "ext1"]);
    let stored = controller.persisted(&s).unwrap();

    // Process restart: a fresh engine sees only the stored snapshot.
    let (controller, coordinator) = engine(vec![Extension::new("ext1"), Extension::new("ext2")]);
    let registry = controller.registry();
    let reversed = vec![registry.find("ext1").unwrap(), registry.find("ext2").unwrap()];
    let report = controller.hydrate(&s, stored, &reversed).unwrap();

    assert_eq!(controller.snapshot(&s), vec!["ext2", "ext1"]);
    assert_eq!(report.restored, vec!["ext2", "ext1"]);
    assert!(report.dropped.is_empty());

    let report = coordinator.restore_batch(&s, &reversed);
    assert_eq!(controller.snapshot(&s), vec!["ext2", "ext1"]);
    assert_eq!(report.restored, vec!["ext2", "ext1"]);
}

#[test]
fn test_restore_batch_is_idempotent() {
    let (controller, coordinator) = engine(vec![
        Extension::new("a"),
        Extension::new("b").active_with(["a"]),
        Extension::new("c"),
    ]);
    let s = ScopeId::from("g");
    controller.activate(&s, "c").unwrap();
    controller.activate(&s, "a").unwrap();
    let before = controller.snapshot(&s);

    let loaded = controller.registry().extensions();
    coordinator.restore_batch(&s, &loaded);
    coordinator.restore_batch(&s, &loaded);
    assert_eq!(controller.snapshot(&s), before);
}

#[test]
fn test_restore_batch_does_not_cascade_or_revive_overrides() {
    let (controller, coordinator) = engine(vec![
        Extension::new("main"),
        Extension::new("companion").active_with(["main"]).auto_activate(true),
    ]);
    let s = ScopeId::from("g");
    controller.activate(&s, "main").unwrap();
    controller.deactivate(&s, "companion").unwrap();

    let loaded = controller.registry().extensions();
    coordinator.restore_batch(&s, &loaded);
    assert_eq!(controller.snapshot(&s), vec!["main"]);
    assert!(controller.is_overridden(&s, "companion").unwrap());
}

#[test]
fn test_reload_one_extension_keeps_every_other_priority() {
    let (controller, coordinator) = engine(vec![
        Extension::new("a"),
        Extension::new("b"),
        Extension::new("c"),
    ]);
    let s = ScopeId::from("g");
    for name in ["a", "b", "c"] {
        controller.activate(&s, name).unwrap();
    }
    assert_eq!(controller.snapshot(&s), vec!["c", "b", "a"]);

    let reports = coordinator
        .reload_extension(Extension::new("b").with_version("2"))
        .unwrap();
    assert_eq!(reports[0].1.restored, vec!["b"]);
    assert_eq!(controller.snapshot(&s), vec!["c", "b", "a"]);
    assert_eq!(controller.query(&s)[1].version, "2");
}

#[test]
fn test_reload_of_new_auto_activate_extension_switches_it_on() {
    let (controller, coordinator) = engine(vec![Extension::new("a")]);
    let s = ScopeId::from("g");
    controller.activate(&s, "a").unwrap();

    let reports = coordinator
        .reload_extension(Extension::new("fresh").auto_activate(true))
        .unwrap();
    assert_eq!(reports[0].1.newly_activated, vec!["fresh"]);
    assert_eq!(controller.snapshot(&s), vec!["fresh", "a"]);
}

#[test]
fn test_reload_all_collision_keeps_previous_registry() {
    let (controller, coordinator) = engine(vec![Extension::new("a")]);
    let s = ScopeId::from("g");
    controller.activate(&s, "a").unwrap();
    let version = controller.registry().version();

    let result = coordinator.reload_all(vec![
        Extension::new("x").with_aliases(["dup"]),
        Extension::new("y").with_aliases(["DUP"]),
    ]);
    assert!(result.is_err());
    assert_eq!(controller.registry().version(), version);
    assert!(controller.registry().find("a").is_some());
    assert_eq!(controller.snapshot(&s), vec!["a"]);
}

#[test]
fn test_reload_under_alias_is_rejected() {
    let (controller, coordinator) = engine(vec![
        Extension::new("coc7").with_aliases(["coc"]),
        Extension::new("log"),
    ]);
    let s = ScopeId::from("g");
    controller.activate(&s, "coc7").unwrap();

    assert!(coordinator.reload_extension(Extension::new("coc")).is_err());
    assert_eq!(controller.registry().find("coc7").unwrap().name, "coc7");
    assert_eq!(controller.registry().len(), 2);
    assert_eq!(controller.snapshot(&s), vec!["coc7"]);
}

#[test]
fn test_reload_with_case_variant_name_keeps_one_entry() {
    let (controller, coordinator) = engine(vec![Extension::new("coc7").auto_activate(true)]);
    let s = ScopeId::from("g");
    controller.activate(&s, "coc7").unwrap();

    coordinator
        .reload_extension(Extension::new("COC7").auto_activate(true).with_version("2"))
        .unwrap();
    let live = controller.query(&s);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "coc7");
    assert_eq!(live[0].version, "2");
}

#[test]
fn test_removed_extension_is_gone_from_every_scope() {
    let (controller, coordinator) = engine(vec![Extension::new("fun"), Extension::new("dice")]);
    let g1 = ScopeId::from("g1");
    let g2 = ScopeId::from("g2");
    controller.activate(&g1, "fun").unwrap();
    controller.activate(&g1, "dice").unwrap();
    controller.activate(&g2, "fun").unwrap();

    let reports = coordinator.remove_extension("fun").unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(controller.snapshot(&g1), vec!["dice"]);
    assert!(controller.query(&g2).is_empty());
    assert!(controller.registry().find("fun").is_none());
    assert!(!controller.persisted(&g2).unwrap().overrides.contains("fun"));
}
