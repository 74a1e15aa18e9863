mod common;

use vost::*;

/// main with a.txt written three times: v1, v2, v3.
fn three_versions(dir: &std::path::Path) -> (Store, Snapshot) {
    let store = common::create_store(dir, "main");
    let mut snap = store.branches().get("main").unwrap();
    for v in ["v1", "v2", "v3"] {
        snap = snap.write_text("a.txt", v, WriteOptions::default()).unwrap();
    }
    (store, snap)
}

#[test]
fn linear_three_commit_history() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    assert_eq!(snap.back(2).unwrap().read_text("a.txt").unwrap(), "v1");

    let log = snap.log(LogOptions::default()).unwrap();
    assert_eq!(log.len(), 4); // initial + three writes
    assert_eq!(log[0].message, "write: a.txt");
    assert_eq!(log[3].message, "Initialize main");
}

#[test]
fn parent_iterated_equals_back() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let mut by_parent = snap.clone();
    for _ in 0..3 {
        by_parent = by_parent.parent().unwrap().unwrap();
    }
    assert_eq!(by_parent.commit_hash(), snap.back(3).unwrap().commit_hash());
    assert!(by_parent.parent().unwrap().is_none()); // initial commit
}

#[test]
fn back_past_initial_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());
    assert!(matches!(snap.back(10).unwrap_err(), Error::NotFound(_)));
}

#[test]
fn back_preserves_ref_and_writability() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());
    let old = snap.back(1).unwrap();
    assert_eq!(old.ref_name(), Some("main"));
    assert!(old.writable());
}

#[test]
fn undo_moves_branch_back() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = three_versions(dir.path());

    let undone = snap.undo(1).unwrap();
    assert_eq!(undone.read_text("a.txt").unwrap(), "v2");
    assert_eq!(
        store.branches().get("main").unwrap().commit_hash(),
        undone.commit_hash()
    );
}

#[test]
fn undo_then_redo_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = three_versions(dir.path());

    let undone = snap.undo(1).unwrap();
    let redone = undone.redo(1).unwrap();
    assert_eq!(redone.commit_hash(), snap.commit_hash());
    assert_eq!(
        store.branches().get("main").unwrap().read_text("a.txt").unwrap(),
        "v3"
    );
}

#[test]
fn multi_step_undo_redo_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let undone = snap.undo(2).unwrap();
    assert_eq!(undone.read_text("a.txt").unwrap(), "v1");

    let redone = undone.redo(2).unwrap();
    assert_eq!(redone.commit_hash(), snap.commit_hash());
}

#[test]
fn repeated_single_undos_then_one_redo() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let u1 = snap.undo(1).unwrap();
    let u2 = u1.undo(1).unwrap();
    assert_eq!(u2.read_text("a.txt").unwrap(), "v1");

    let redone = u2.redo(2).unwrap();
    assert_eq!(redone.commit_hash(), snap.commit_hash());
}

#[test]
fn undo_without_history_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    assert!(matches!(snap.undo(1).unwrap_err(), Error::NotFound(_)));
}

#[test]
fn undo_on_tag_is_permission_denied() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = three_versions(dir.path());
    store.tags().set("pin", &snap).unwrap();
    let tag = store.tags().get("pin").unwrap();
    assert!(matches!(tag.undo(1).unwrap_err(), Error::PermissionDenied(_)));
}

#[test]
fn undo_on_stale_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = three_versions(dir.path());

    store
        .branches()
        .get("main")
        .unwrap()
        .write_text("other.txt", "x", WriteOptions::default())
        .unwrap();

    assert!(matches!(snap.undo(1).unwrap_err(), Error::StaleSnapshot(_)));
}

#[test]
fn redo_without_undo_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());
    assert!(matches!(snap.redo(1).unwrap_err(), Error::NotFound(_)));
}

#[test]
fn redo_ignores_plain_commit_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = three_versions(dir.path());

    // A normal write after the undo breaks the redo chain for the new tip.
    let undone = snap.undo(1).unwrap();
    let advanced = undone
        .write_text("b.txt", "fresh", WriteOptions::default())
        .unwrap();
    assert!(matches!(advanced.redo(1).unwrap_err(), Error::NotFound(_)));

    let _ = store; // branch still at the fresh write
}

#[test]
fn undo_reflog_messages_count_steps() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = three_versions(dir.path());

    snap.undo(2).unwrap();
    let entries = store.branches().reflog("main").unwrap();
    assert!(entries[0].message.starts_with("undo: 2 commit(s)"));
    assert!(entries[1].message.starts_with("undo: 2 commit(s)"));
}

#[test]
fn log_limit_and_skip() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let limited = snap
        .log(LogOptions {
            limit: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].message, "write: a.txt");

    let skipped = snap
        .log(LogOptions {
            skip: Some(3),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].message, "Initialize main");
}

#[test]
fn log_message_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let writes = snap
        .log(LogOptions {
            match_pattern: Some("write:*".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(writes.len(), 3);

    let init = snap
        .log(LogOptions {
            match_pattern: Some("Initialize*".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(init.len(), 1);
}

#[test]
fn log_path_filter_keeps_changing_commits_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();

    let snap = snap
        .write_text("a.txt", "1", WriteOptions::default())
        .unwrap();
    let snap = snap
        .write_text("b.txt", "1", WriteOptions::default())
        .unwrap();
    let snap = snap
        .write_text("a.txt", "2", WriteOptions::default())
        .unwrap();

    let for_a = snap
        .log(LogOptions {
            path: Some("a.txt".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(for_a.len(), 2);

    let for_b = snap
        .log(LogOptions {
            path: Some("b.txt".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(for_b.len(), 1);

    let untouched = snap
        .log(LogOptions {
            path: Some("ghost.txt".into()),
            ..Default::default()
        })
        .unwrap();
    assert!(untouched.is_empty());
}

#[test]
fn log_before_cutoff() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let all = snap.log(LogOptions::default()).unwrap();
    let newest = all[0].time;

    let capped = snap
        .log(LogOptions {
            before: Some(newest),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(capped.len(), 4);

    let none = snap
        .log(LogOptions {
            before: Some(0),
            ..Default::default()
        })
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn log_entries_carry_author_and_id() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = three_versions(dir.path());

    let log = snap.log(LogOptions::default()).unwrap();
    assert_eq!(log[0].id, snap.commit_hash().unwrap());
    assert_eq!(log[0].author_name, "vost");
    assert_eq!(log[0].author_email, "vost@localhost");
    assert!(log[0].time > 0);
}
