use std::path::Path;

use vost::*;

pub fn create_store(dir: &Path, branch: &str) -> Store {
    Store::open(
        dir.join("repo.git"),
        OpenOptions {
            create: true,
            branch: Some(branch.into()),
            ..Default::default()
        },
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn store_with_files(dir: &Path) -> (Store, Snapshot) {
    let store = create_store(dir, "main");
    let snap = store.branches().get("main").unwrap();
    let mut batch = snap.batch(Default::default());
    batch.write("hello.txt", b"hello").unwrap();
    batch.write("dir/a.txt", b"aaa").unwrap();
    batch.write("dir/b.txt", b"bbb").unwrap();
    batch.write("dir/sub/c.txt", b"ccc").unwrap();
    let snap = batch.commit().unwrap();
    (store, snap)
}
