//! Integration tests driving the bindelta binary end to end

use assert_cmd::Command;
use predicates::prelude::*;

fn bindelta() -> Command {
    Command::cargo_bin("bindelta").expect("binary builds")
}

#[test]
fn diff_then_patch_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let old_path = dir.path().join("old.bin");
    let new_path = dir.path().join("new.bin");
    let patch_path = dir.path().join("update.patch");
    let out_path = dir.path().join("rebuilt.bin");

    let old: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let mut new = old.clone();
    new[777] ^= 0x42;
    new.extend_from_slice(b"appended tail");
    std::fs::write(&old_path, &old).unwrap();
    std::fs::write(&new_path, &new).unwrap();

    bindelta()
        .args(["diff"])
        .arg(&old_path)
        .arg(&new_path)
        .arg(&patch_path)
        .assert()
        .success();

    bindelta()
        .args(["patch"])
        .arg(&old_path)
        .arg(&out_path)
        .arg(&patch_path)
        .assert()
        .success();

    assert_eq!(std::fs::read(&out_path).unwrap(), new);
}

#[test]
fn patch_rejects_corrupt_input() {
    let dir = tempfile::tempdir().unwrap();
    let old_path = dir.path().join("old.bin");
    let new_path = dir.path().join("new.bin");
    let patch_path = dir.path().join("update.patch");
    let out_path = dir.path().join("rebuilt.bin");

    std::fs::write(&old_path, b"some original bytes here").unwrap();
    std::fs::write(&new_path, b"some replacement bytes here").unwrap();

    bindelta()
        .args(["diff"])
        .arg(&old_path)
        .arg(&new_path)
        .arg(&patch_path)
        .assert()
        .success();

    let mut patch = std::fs::read(&patch_path).unwrap();
    patch[0] = b'X';
    std::fs::write(&patch_path, &patch).unwrap();

    bindelta()
        .args(["patch"])
        .arg(&old_path)
        .arg(&out_path)
        .arg(&patch_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt patch"));

    assert!(!out_path.exists(), "failed apply must not leave output");
}

#[test]
fn patch_rejects_wrong_old_file() {
    let dir = tempfile::tempdir().unwrap();
    let old_path = dir.path().join("old.bin");
    let new_path = dir.path().join("new.bin");
    let wrong_path = dir.path().join("wrong.bin");
    let patch_path = dir.path().join("update.patch");
    let out_path = dir.path().join("rebuilt.bin");

    std::fs::write(&old_path, b"the real original").unwrap();
    std::fs::write(&new_path, b"the updated version").unwrap();
    std::fs::write(&wrong_path, b"a different file of another length").unwrap();

    bindelta()
        .args(["diff"])
        .arg(&old_path)
        .arg(&new_path)
        .arg(&patch_path)
        .assert()
        .success();

    bindelta()
        .args(["patch"])
        .arg(&wrong_path)
        .arg(&out_path)
        .arg(&patch_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("made against"));
}

#[test]
fn diff_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();

    bindelta()
        .args(["diff"])
        .arg(dir.path().join("absent.bin"))
        .arg(dir.path().join("also-absent.bin"))
        .arg(dir.path().join("out.patch"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
