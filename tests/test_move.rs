mod common;

use vost::*;

#[test]
fn rename_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let next = snap
        .rename("hello.txt", "greeting.txt", WriteOptions::default())
        .unwrap();
    assert!(!next.exists("hello.txt").unwrap());
    assert_eq!(next.read_text("greeting.txt").unwrap(), "hello");
}

#[test]
fn rename_directory_in_one_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let mut batch = snap.batch(Default::default());
    batch.write("src/a.txt", b"a").unwrap();
    batch.write("src/b.txt", b"b").unwrap();
    let snap = batch.commit().unwrap();

    let next = snap.rename("src", "dst", WriteOptions::default()).unwrap();
    assert_eq!(next.read_text("dst/a.txt").unwrap(), "a");
    assert_eq!(next.read_text("dst/b.txt").unwrap(), "b");
    assert!(!next.exists("src").unwrap());

    // Exactly one commit recorded the move.
    assert_eq!(
        next.parent().unwrap().unwrap().commit_hash(),
        snap.commit_hash()
    );
}

#[test]
fn rename_preserves_blob_identity() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let before = snap.object_hash("dir/a.txt").unwrap();
    let next = snap.rename("dir", "moved", WriteOptions::default()).unwrap();
    assert_eq!(next.object_hash("moved/a.txt").unwrap(), before);
}

#[test]
fn rename_missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let err = snap
        .rename("ghost", "dst", WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn rename_root_endpoints_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    assert!(matches!(
        snap.rename("", "x", WriteOptions::default()).unwrap_err(),
        Error::InvalidPath(_)
    ));
    assert!(matches!(
        snap.rename("dir", "/", WriteOptions::default()).unwrap_err(),
        Error::InvalidPath(_)
    ));
}

#[test]
fn rename_default_message() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let next = snap
        .rename("hello.txt", "hi.txt", WriteOptions::default())
        .unwrap();
    assert_eq!(next.message().unwrap(), "rename: hello.txt -> hi.txt");
}

#[test]
fn move_single_source_renames() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let next = snap
        .move_paths(&["hello.txt"], "renamed.txt", MoveOptions::default())
        .unwrap();
    assert!(!next.exists("hello.txt").unwrap());
    assert_eq!(next.read_text("renamed.txt").unwrap(), "hello");
}

#[test]
fn move_into_existing_directory_uses_basename() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let next = snap
        .move_paths(&["hello.txt"], "dir", MoveOptions::default())
        .unwrap();
    assert_eq!(next.read_text("dir/hello.txt").unwrap(), "hello");
    assert!(!next.exists("hello.txt").unwrap());
}

#[test]
fn move_multiple_sources_requires_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let err = snap
        .move_paths(
            &["hello.txt", "dir/a.txt"],
            "not-a-dir.txt",
            MoveOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotADirectory(_)));

    let next = snap
        .move_paths(&["hello.txt", "dir/a.txt"], "dir/sub", MoveOptions::default())
        .unwrap();
    assert_eq!(next.read_text("dir/sub/hello.txt").unwrap(), "hello");
    assert_eq!(next.read_text("dir/sub/a.txt").unwrap(), "aaa");
}

#[test]
fn move_directory_requires_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let err = snap
        .move_paths(&["dir"], "elsewhere", MoveOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::IsADirectory(_)));

    let next = snap
        .move_paths(
            &["dir"],
            "elsewhere",
            MoveOptions {
                recursive: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(next.read_text("elsewhere/sub/c.txt").unwrap(), "ccc");
    assert!(!next.exists("dir").unwrap());
}

#[test]
fn move_dry_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());

    let preview = snap
        .move_paths(
            &["hello.txt"],
            "would-be.txt",
            MoveOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(preview.commit_hash(), snap.commit_hash());
    assert!(store
        .branches()
        .get("main")
        .unwrap()
        .exists("hello.txt")
        .unwrap());
}
