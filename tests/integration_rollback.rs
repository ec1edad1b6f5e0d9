//! Integration tests for the `updraft rollback` command.

mod common;

use common::{TestInstall, hash_tree};
use predicates::prelude::*;

#[test]
fn test_rollback_restores_newest_backup_exactly() {
    let install = TestInstall::new().unwrap();
    install.seed_install_tree("2.1.0").unwrap();
    install
        .seed_backup(
            1000,
            "1.9.0",
            &[("version.txt", b"1.9.0\n"), ("app.bin", b"ancient")],
        )
        .unwrap();
    let newest_tree = install
        .seed_backup(
            2000,
            "2.0.0",
            &[
                ("version.txt", b"2.0.0\n"),
                ("app.bin", b"previous-binary"),
                ("assets/logo.dat", b"logo"),
            ],
        )
        .unwrap();

    install
        .updraft_cmd()
        .args(["rollback", "--install-root"])
        .arg(install.install_root())
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored version 2.0.0"))
        .stdout(predicate::str::contains("1970-01-01 00:33:20 UTC"));

    // The live tree is byte-for-byte the newest snapshot; restore copies,
    // so the snapshot itself survives for a second rollback.
    assert_eq!(hash_tree(install.install_root()), hash_tree(&newest_tree));
    assert!(newest_tree.is_dir());
    assert_eq!(install.installed_version(), "2.0.0");
}

#[test]
fn test_rollback_without_backups_fails_and_leaves_tree_alone() {
    let install = TestInstall::new().unwrap();
    install.seed_install_tree("2.1.0").unwrap();

    install
        .updraft_cmd()
        .args(["rollback", "--install-root"])
        .arg(install.install_root())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No usable backup found"));

    assert_eq!(install.installed_version(), "2.1.0");
}

#[test]
fn test_rollback_skips_snapshot_with_missing_tree() {
    let install = TestInstall::new().unwrap();
    install.seed_install_tree("2.1.0").unwrap();
    install
        .seed_backup(1000, "1.9.0", &[("version.txt", b"1.9.0\n")])
        .unwrap();
    // Newest snapshot lost its tree; only metadata remains.
    let broken_tree = install
        .seed_backup(2000, "2.0.0", &[("version.txt", b"2.0.0\n")])
        .unwrap();
    std::fs::remove_dir_all(&broken_tree).unwrap();

    install
        .updraft_cmd()
        .args(["rollback", "--install-root"])
        .arg(install.install_root())
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored version 1.9.0"));

    assert_eq!(install.installed_version(), "1.9.0");
}
