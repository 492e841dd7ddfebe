//! Reload-safety probe branches, observed through the counting mock.

mod common;

use std::path::Path;

use common::MockLoader;
use hotlib::run_probe;

#[test]
fn resident_branch_unloads_the_residency_and_nothing_else() {
    let loader = MockLoader::new();
    loader.set_resident(true);

    assert!(run_probe(&loader, Path::new("libplugin.so")));
    // The already-resident instance was dropped; no fresh load happened.
    assert_eq!(loader.loads(), 0);
    assert_eq!(loader.unloads(), 1);
    assert_eq!(loader.live_handles(), 0);
}

#[test]
fn fresh_branch_cycles_a_throwaway_instance() {
    let loader = MockLoader::new();

    assert!(run_probe(&loader, Path::new("libplugin.so")));
    assert_eq!(loader.loads(), 1);
    assert_eq!(loader.unloads(), 1);
    // Nothing left resident behind the caller's back.
    assert_eq!(loader.live_handles(), 0);
}

#[test]
fn load_failure_is_a_negative_verdict_not_an_error() {
    let loader = MockLoader::new();
    loader.set_fail_load(true);

    assert!(!run_probe(&loader, Path::new("libplugin.so")));
    assert_eq!(loader.unloads(), 0);
}

#[test]
fn unload_refusal_is_a_negative_verdict() {
    let loader = MockLoader::new();
    loader.set_fail_unload(true);

    assert!(!run_probe(&loader, Path::new("libplugin.so")));
    assert_eq!(loader.loads(), 1);
    assert_eq!(loader.unloads(), 1);
}

#[test]
fn resident_branch_respects_unload_refusal() {
    let loader = MockLoader::new();
    loader.set_resident(true);
    loader.set_fail_unload(true);

    assert!(!run_probe(&loader, Path::new("libplugin.so")));
    assert_eq!(loader.loads(), 0);
}
