//! Tests for data directory preparation and identity parsing

use super::*;
use nix::unistd::Uid;
use std::os::unix::fs::MetadataExt;

#[test]
fn test_identity_spec_parses_name() {
    let spec: IdentitySpec = "app".parse().expect("name should parse");
    assert_eq!(spec, IdentitySpec::Name("app".to_string()));
}

#[test]
fn test_identity_spec_parses_uid() {
    let spec: IdentitySpec = "1000".parse().expect("uid should parse");
    assert_eq!(spec, IdentitySpec::Uid(1000));
}

#[test]
fn test_identity_spec_parses_uid_gid() {
    let spec: IdentitySpec = "1000:2000".parse().expect("uid:gid should parse");
    assert_eq!(spec, IdentitySpec::UidGid(1000, 2000));
    assert_eq!(spec.to_string(), "1000:2000");
}

#[test]
fn test_identity_spec_rejects_bad_gid() {
    assert!("1000:staff".parse::<IdentitySpec>().is_err());
    assert!("".parse::<IdentitySpec>().is_err());
}

#[test]
fn test_identity_spec_detects_root() {
    assert!(IdentitySpec::Name("root".to_string()).is_root());
    assert!(IdentitySpec::Uid(0).is_root());
    assert!(IdentitySpec::UidGid(0, 1000).is_root());
    assert!(!IdentitySpec::Uid(1000).is_root());
}

#[test]
fn test_resolve_uid_gid_pair_is_taken_verbatim() {
    let identity = IdentitySpec::UidGid(4242, 4343)
        .resolve()
        .expect("numeric pair resolves without the user database");
    assert_eq!(identity.uid.as_raw(), 4242);
    assert_eq!(identity.gid.as_raw(), 4343);
}

#[test]
fn test_resolve_rejects_root() {
    let result = IdentitySpec::UidGid(0, 0).resolve();
    assert!(matches!(result, Err(PermissionError::RootIdentity(_))));
}

#[test]
fn test_resolve_unknown_name() {
    let result = IdentitySpec::Name("vigil-no-such-user-xyz".to_string()).resolve();
    assert!(matches!(result, Err(PermissionError::UnknownUser(_))));
}

#[test]
fn test_prepare_creates_missing_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let data_dir = tmp.path().join("nested").join("data");

    let report = prepare(&data_dir, &Identity::current()).expect("prepare should succeed");

    assert!(data_dir.is_dir());
    assert!(report.created);
    assert_eq!(report.changed, 0, "tree is already owned by the caller");
}

#[test]
fn test_prepare_is_idempotent() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let data_dir = tmp.path().join("data");
    std::fs::create_dir_all(data_dir.join("sub")).expect("mkdir");
    std::fs::write(data_dir.join("sub").join("reminder.sqlite3"), b"db").expect("write");

    let identity = if Uid::effective().is_root() {
        // nobody/nogroup on most systems; any non-root pair works as root
        IdentitySpec::UidGid(65534, 65534)
            .resolve()
            .expect("numeric identity")
    } else {
        Identity::current()
    };

    let first = prepare(&data_dir, &identity).expect("first run");
    let second = prepare(&data_dir, &identity).expect("second run");

    assert!(!first.created);
    if Uid::effective().is_root() {
        assert_eq!(first.changed, 3, "data dir, sub dir and file re-owned");
    }
    assert!(second.is_noop(), "second run must not change anything");

    let metadata = std::fs::metadata(data_dir.join("sub").join("reminder.sqlite3")).expect("stat");
    assert_eq!(metadata.uid(), identity.uid.as_raw());
    assert_eq!(metadata.gid(), identity.gid.as_raw());
}

#[test]
fn test_prepare_fails_without_chown_rights() {
    if Uid::effective().is_root() {
        return;
    }
    let tmp = tempfile::tempdir().expect("tempdir");
    let identity = IdentitySpec::UidGid(Uid::current().as_raw() + 1, 65534)
        .resolve()
        .expect("numeric identity");

    let result = prepare(tmp.path(), &identity);

    assert!(
        matches!(result, Err(PermissionError::Chown { .. })),
        "unprivileged chown to another uid must fail fast, got {:?}",
        result
    );
}

#[test]
fn test_prepare_rejects_file_in_place_of_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let file = tmp.path().join("occupied");
    std::fs::write(&file, b"x").expect("write");

    let result = prepare(&file.join("data"), &Identity::current());

    assert!(matches!(result, Err(PermissionError::CreateDir { .. })));
}
