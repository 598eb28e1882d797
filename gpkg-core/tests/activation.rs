// gpkg-core/tests/activation.rs
mod common;

use std::sync::Arc;

use common::{context_with, install_versions, link_target, point_link, RecordingHost};
use gpkg_common::{HostSelector, Options};
use gpkg_core::{activate, ActivationStatus};

#[test]
fn repeated_activation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    install_versions(dir.path(), "gateway", &["5.10.0", "5.11.2"]);
    let host = Arc::new(RecordingHost::new(dir.path()));
    let ctx = context_with(dir.path(), host.clone());
    let gateway = ctx.registry.require("gateway").unwrap();

    let first = activate(&ctx, &HostSelector::All, Some(gateway), &Options::default()).unwrap();
    assert!(first[0].changed());
    let after_first = host.mutations();
    assert!(after_first > 0);

    let second = activate(&ctx, &HostSelector::All, Some(gateway), &Options::default()).unwrap();
    assert_eq!(
        second[0].status,
        ActivationStatus::Unchanged {
            version: "5.11.2".into()
        }
    );
    assert_eq!(host.mutations(), after_first);
}

#[test]
fn existing_link_is_kept_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    install_versions(dir.path(), "gateway", &["5.10.0", "5.11.2"]);
    point_link(dir.path(), "gateway", "active_prod", "5.10.0");
    let host = Arc::new(RecordingHost::new(dir.path()));
    let ctx = context_with(dir.path(), host.clone());
    let gateway = ctx.registry.require("gateway").unwrap();

    let kept = activate(&ctx, &HostSelector::All, Some(gateway), &Options::default()).unwrap();
    assert_eq!(
        kept[0].status,
        ActivationStatus::Kept {
            current: "5.10.0".into(),
            available: "5.11.2".into()
        }
    );
    assert_eq!(host.mutations(), 0);
    assert_eq!(link_target(dir.path(), "gateway", "active_prod").as_deref(), Some("5.10.0"));

    let forced = activate(
        &ctx,
        &HostSelector::All,
        Some(gateway),
        &Options::default().with_force(true),
    )
    .unwrap();
    assert!(forced[0].changed());
    assert_eq!(link_target(dir.path(), "gateway", "active_prod").as_deref(), Some("5.11.2"));
}

#[test]
fn pinned_version_and_other_basenames() {
    let dir = tempfile::tempdir().unwrap();
    install_versions(dir.path(), "gateway", &["5.10.0", "5.11.2"]);
    let ctx = context_with(dir.path(), Arc::new(RecordingHost::new(dir.path())));
    let gateway = ctx.registry.require("gateway").unwrap();

    let opts = Options {
        basename: "active_dev".into(),
        ..Options::default().with_version("5.10")
    };
    activate(&ctx, &HostSelector::All, Some(gateway), &opts).unwrap();

    assert_eq!(link_target(dir.path(), "gateway", "active_dev").as_deref(), Some("5.10.0"));
    assert!(link_target(dir.path(), "gateway", "active_prod").is_none());
}

#[test]
fn unknown_host_is_not_exist() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with(dir.path(), Arc::new(RecordingHost::new(dir.path())));
    let err = activate(&ctx, &HostSelector::parse("nowhere"), None, &Options::default()).unwrap_err();
    assert!(err.is_not_exist());
}

#[test]
fn fan_out_over_an_empty_host_reports_every_component_missing() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(RecordingHost::new(dir.path()));
    let ctx = context_with(dir.path(), host.clone());

    let out = activate(&ctx, &HostSelector::All, None, &Options::default()).unwrap();
    assert_eq!(out.len(), ctx.registry.packaged().count());
    assert!(out
        .iter()
        .all(|o| matches!(o.status, ActivationStatus::Missing { .. })));
    assert_eq!(host.mutations(), 0);
}
