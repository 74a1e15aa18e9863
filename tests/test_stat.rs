mod common;

use vost::*;

#[test]
fn stat_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let st = snap.stat("hello.txt").unwrap();
    assert_eq!(st.mode, MODE_BLOB);
    assert_eq!(st.file_type, FileType::Blob);
    assert_eq!(st.size, 5);
    assert_eq!(st.nlink, 1);
    assert_eq!(st.id, snap.object_hash("hello.txt").unwrap());
    assert_eq!(st.mtime, snap.time().unwrap());
}

#[test]
fn stat_directory_counts_subdirs() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let st = snap.stat("dir").unwrap();
    assert_eq!(st.file_type, FileType::Tree);
    assert_eq!(st.mode, MODE_TREE);
    assert_eq!(st.size, 0);
    assert_eq!(st.nlink, 3); // 2 + one subdirectory (sub)
}

#[test]
fn stat_root() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let st = snap.stat("").unwrap();
    assert_eq!(st.file_type, FileType::Tree);
    assert_eq!(st.nlink, 3); // 2 + one subdirectory (dir)
    assert_eq!(st.id, snap.tree_hash().unwrap());
}

#[test]
fn stat_symlink() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .write_symlink("ln", "target/path", WriteOptions::default())
        .unwrap();

    let st = snap.stat("ln").unwrap();
    assert_eq!(st.file_type, FileType::Link);
    assert_eq!(st.mode, MODE_LINK);
    assert_eq!(st.size, "target/path".len() as u64);
    assert_eq!(st.nlink, 1);
}

#[test]
fn stat_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(snap.stat("nope").unwrap_err(), Error::NotFound(_)));
}

#[test]
fn stat_then_read_by_hash() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    // The getattr-then-read pattern for filesystem front-ends.
    let st = snap.stat("dir/a.txt").unwrap();
    assert_eq!(snap.read_by_hash(&st.id, 0, None).unwrap(), b"aaa");
}

#[test]
fn stat_mtime_tracks_commits() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());

    let older = snap.back(1).unwrap();
    let st_new = snap.stat("").unwrap();
    let st_old = older.stat("").unwrap();
    assert!(st_old.mtime <= st_new.mtime);
}
