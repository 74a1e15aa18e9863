mod common;

use std::path::Path;

use vost::*;

fn seed_disk(root: &Path) {
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("top.txt"), "top").unwrap();
    std::fs::write(root.join("data.csv"), "1,2,3").unwrap();
    std::fs::write(root.join("sub/inner.txt"), "inner").unwrap();
}

#[test]
fn copy_in_imports_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (report, next) = snap.copy_in(&src, "", CopyOptions::default()).unwrap();
    assert_eq!(report.add.len(), 3);
    assert!(report.errors.is_empty());
    assert_eq!(next.read_text("top.txt").unwrap(), "top");
    assert_eq!(next.read_text("sub/inner.txt").unwrap(), "inner");

    // The report rides on the returned snapshot too.
    assert_eq!(next.changes().unwrap().add.len(), 3);
}

#[test]
fn copy_in_under_destination_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (_, next) = snap.copy_in(&src, "vendor/kit", CopyOptions::default()).unwrap();
    assert_eq!(next.read_text("vendor/kit/top.txt").unwrap(), "top");
    assert_eq!(next.read_text("vendor/kit/sub/inner.txt").unwrap(), "inner");
}

#[test]
fn copy_in_is_additive() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (_, next) = snap.copy_in(&src, "", CopyOptions::default()).unwrap();
    // Existing repository entries not on disk stay.
    assert_eq!(next.read_text("hello.txt").unwrap(), "hello");
    assert_eq!(next.read_text("dir/a.txt").unwrap(), "aaa");
}

#[test]
fn copy_in_checksum_skips_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (_, first) = snap.copy_in(&src, "", CopyOptions::default()).unwrap();
    let (report, second) = first.copy_in(&src, "", CopyOptions::default()).unwrap();

    assert!(report.in_sync());
    assert_eq!(second.commit_hash(), first.commit_hash());

    // Touch one file: only it moves.
    std::fs::write(src.join("top.txt"), "changed").unwrap();
    let (report, third) = second.copy_in(&src, "", CopyOptions::default()).unwrap();
    assert_eq!(report.total(), 1);
    assert_eq!(third.read_text("top.txt").unwrap(), "changed");
}

#[test]
fn copy_in_include_filter() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (report, next) = snap
        .copy_in(
            &src,
            "",
            CopyOptions {
                include: Some(vec!["*.txt".into()]),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(report.add.len(), 2);
    assert!(next.exists("top.txt").unwrap());
    assert!(next.exists("sub/inner.txt").unwrap());
    assert!(!next.exists("data.csv").unwrap());
}

#[test]
fn copy_in_exclude_filter_with_negation() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (_, next) = snap
        .copy_in(
            &src,
            "",
            CopyOptions {
                exclude: Some(vec!["*.txt".into(), "!inner.txt".into()]),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!next.exists("top.txt").unwrap());
    assert!(next.exists("sub/inner.txt").unwrap());
    assert!(next.exists("data.csv").unwrap());
}

#[test]
fn copy_in_dry_run_reports_without_committing() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    seed_disk(&src);

    let (report, same) = snap
        .copy_in(
            &src,
            "",
            CopyOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(report.add.len(), 3);
    assert_eq!(same.commit_hash(), snap.commit_hash());
    assert!(!store.branches().get("main").unwrap().exists("top.txt").unwrap());
}

#[cfg(unix)]
#[test]
fn copy_in_preserves_symlinks_and_exec_bits() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let src = dir.path().join("payload");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("plain.txt"), "plain").unwrap();
    std::fs::write(src.join("tool.sh"), "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(src.join("tool.sh"), std::fs::Permissions::from_mode(0o755)).unwrap();
    std::os::unix::fs::symlink("plain.txt", src.join("alias")).unwrap();

    let (_, next) = snap.copy_in(&src, "", CopyOptions::default()).unwrap();
    assert_eq!(next.file_type("plain.txt").unwrap(), FileType::Blob);
    assert_eq!(next.file_type("tool.sh").unwrap(), FileType::Executable);
    assert_eq!(next.file_type("alias").unwrap(), FileType::Link);
    assert_eq!(next.readlink("alias").unwrap(), "plain.txt");
}

#[test]
fn copy_out_materializes_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let out = dir.path().join("export");
    let report = snap.copy_out("dir", &out, CopyOutOptions::default()).unwrap();
    assert_eq!(report.add.len(), 3);
    assert_eq!(std::fs::read_to_string(out.join("a.txt")).unwrap(), "aaa");
    assert_eq!(
        std::fs::read_to_string(out.join("sub/c.txt")).unwrap(),
        "ccc"
    );
}

#[test]
fn copy_out_whole_tree_with_filter() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let out = dir.path().join("export");
    let report = snap
        .copy_out(
            "",
            &out,
            CopyOutOptions {
                include: Some(vec!["hello.txt".into()]),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(report.add.len(), 1);
    assert!(out.join("hello.txt").exists());
    assert!(!out.join("dir").exists());
}

#[test]
fn copy_out_of_file_path_is_not_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let err = snap
        .copy_out("hello.txt", &dir.path().join("x"), CopyOutOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));
}

#[cfg(unix)]
#[test]
fn copy_out_restores_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .write_symlink("ln", "hello.txt", WriteOptions::default())
        .unwrap();

    let out = dir.path().join("export");
    snap.copy_out("", &out, CopyOutOptions::default()).unwrap();
    let target = std::fs::read_link(out.join("ln")).unwrap();
    assert_eq!(target.to_str().unwrap(), "hello.txt");
}

#[test]
fn remove_from_disk_honors_filters() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let scratch = dir.path().join("scratch");
    seed_disk(&scratch);

    let report = snap
        .remove_from_disk(
            &scratch,
            DiskRemoveOptions {
                include: Some(vec!["*.txt".into()]),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(report.delete.len(), 2);
    assert!(!scratch.join("top.txt").exists());
    assert!(scratch.join("data.csv").exists());
}
