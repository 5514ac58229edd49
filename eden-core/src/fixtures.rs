//! Manifest fixtures shared by the scenario tests under `tests/`. Builds a
//! small object graph directly through [MemoryObjectStore] and seeds a
//! [MemoryImporter] to resolve a commit to it — the same collaborators a
//! real mount would be handed, just in-memory ones.
use crate::blob::Blob;
use crate::hash::Hash;
use crate::path::PathComponent;
use crate::store::{NodeKind, Tree, TreeEntry};
use crate::testing::{MemoryImporter, MemoryObjectStore};
use bytes::Bytes;

fn name(s: &str) -> PathComponent {
    PathComponent::try_from(s).expect("fixture names are valid components")
}

fn hash_byte(b: u8) -> Hash {
    Hash::from_bytes([b; crate::hash::HASH_LEN])
}

async fn blob_at(store: &MemoryObjectStore, id: u8, contents: &'static [u8]) -> Hash {
    store.put_blob(Blob::new(hash_byte(id), Bytes::from_static(contents))).await
}

/// The directory graph `EdenMountTest.cpp`'s `resolveSymlink` test exercises:
/// a chain of relative symlinks that only resolves correctly because each
/// hop is interpreted relative to the directory it lives in (see
/// `crate::symlink`), an absolute-target symlink, a symlink that escapes
/// above the mount root, a two-hop symlink cycle, a self-referential
/// symlink, and a symlink to a directory.
pub async fn build_symlink_fixture(store: &MemoryObjectStore, importer: &MemoryImporter) -> Hash {
    let test_c_hash = blob_at(store, 1, b"testy tests").await;
    let src_c_hash = blob_at(store, 2, b"test.c").await;
    let src_loop2_hash = blob_at(store, 3, b"../loop1").await;
    let selfloop_hash = blob_at(store, 4, b"../src/selfloop").await;
    let link_to_dir_hash = blob_at(store, 5, b"../src").await;

    let src_tree = Tree::new(vec![
        TreeEntry { name: name("test.c"), hash: test_c_hash, kind: NodeKind::Regular, mode: 0o644 },
        TreeEntry { name: name("c"), hash: src_c_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("loop2"), hash: src_loop2_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("selfloop"), hash: selfloop_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("link_to_dir"), hash: link_to_dir_hash, kind: NodeKind::Symlink, mode: 0o777 },
    ]);
    let src_tree_hash = hash_byte(10);
    store.put_tree_at(src_tree_hash, src_tree);

    let foo_txt_hash = blob_at(store, 20, b"contents\n").await;
    let somelink_hash = blob_at(store, 21, b"../../foo.txt").await;
    let anotherlink_hash = blob_at(store, 22, b"../../../src/test.c").await;
    let d3_tree = Tree::new(vec![
        TreeEntry { name: name("somelink"), hash: somelink_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("anotherlink"), hash: anotherlink_hash, kind: NodeKind::Symlink, mode: 0o777 },
    ]);
    let d3_hash = hash_byte(11);
    store.put_tree_at(d3_hash, d3_tree);

    let d2_tree = Tree::new(vec![TreeEntry { name: name("d3"), hash: d3_hash, kind: NodeKind::Directory, mode: 0o755 }]);
    let d2_hash = hash_byte(12);
    store.put_tree_at(d2_hash, d2_tree);

    let d1_tree = Tree::new(vec![
        TreeEntry { name: name("d2"), hash: d2_hash, kind: NodeKind::Directory, mode: 0o755 },
        TreeEntry { name: name("foo.txt"), hash: foo_txt_hash, kind: NodeKind::Regular, mode: 0o644 },
    ]);
    let d1_hash = hash_byte(13);
    store.put_tree_at(d1_hash, d1_tree);

    let a_hash = blob_at(store, 30, b"b").await;
    let b_hash = blob_at(store, 31, b"src/c").await;
    let d_hash = blob_at(store, 32, b"/tmp").await;
    let badlink_hash = blob_at(store, 33, b"link/to/nowhere").await;
    let outside_hash = blob_at(store, 34, b"../outside_mount").await;
    let loop1_hash = blob_at(store, 35, b"src/loop2").await;

    let root_tree = Tree::new(vec![
        TreeEntry { name: name("src"), hash: src_tree_hash, kind: NodeKind::Directory, mode: 0o755 },
        TreeEntry { name: name("d1"), hash: d1_hash, kind: NodeKind::Directory, mode: 0o755 },
        TreeEntry { name: name("a"), hash: a_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("b"), hash: b_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("d"), hash: d_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("badlink"), hash: badlink_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("link_outside_mount"), hash: outside_hash, kind: NodeKind::Symlink, mode: 0o777 },
        TreeEntry { name: name("loop1"), hash: loop1_hash, kind: NodeKind::Symlink, mode: 0o777 },
    ]);
    let root_hash = hash_byte(40);
    store.put_tree_at(root_hash, root_tree);

    let commit = hash_byte(99);
    store.put_commit_at(commit, root_hash);
    // `import_manifest` resolves a revision straight to its root tree hash
    // (see `Importer`'s doc comment); `commit` is kept in the commits map
    // only so `get_commit_tree` has something realistic to answer with.
    importer.seed_revision("fixture-symlinks", root_hash);
    commit
}

/// Two manifests sharing a `src/main.c` that never changes, with
/// `src/test.c` rewritten and `src/extra.h` added only in the second
/// commit. Modeled on `EdenMountTest.cpp`'s `resetParents` fixture
/// (`builder2 = builder1.clone()` with one file overwritten and one file
/// added) — used to check that `reset_parent` updates the mount's parent
/// pointer and journal without touching the already-loaded working tree.
pub async fn build_reset_parent_fixture(store: &MemoryObjectStore, importer: &MemoryImporter) -> (Hash, Hash) {
    let main_c_hash = blob_at(store, 201, b"int main() { return 0; }\n").await;
    let test_c_v1_hash = blob_at(store, 202, b"old test contents\n").await;

    let src_tree_v1 = Tree::new(vec![
        TreeEntry { name: name("main.c"), hash: main_c_hash, kind: NodeKind::Regular, mode: 0o644 },
        TreeEntry { name: name("test.c"), hash: test_c_v1_hash, kind: NodeKind::Regular, mode: 0o644 },
    ]);
    let src_tree_v1_hash = hash_byte(210);
    store.put_tree_at(src_tree_v1_hash, src_tree_v1);

    let root_tree_v1 = Tree::new(vec![TreeEntry { name: name("src"), hash: src_tree_v1_hash, kind: NodeKind::Directory, mode: 0o755 }]);
    let root_v1_hash = hash_byte(211);
    store.put_tree_at(root_v1_hash, root_tree_v1);

    let commit1 = hash_byte(219);
    store.put_commit_at(commit1, root_v1_hash);
    importer.seed_revision("fixture-reset-1", root_v1_hash);

    let test_c_v2_hash = blob_at(store, 203, b"new test contents\n").await;
    let extra_h_hash = blob_at(store, 204, b"#pragma once\n").await;

    let src_tree_v2 = Tree::new(vec![
        TreeEntry { name: name("main.c"), hash: main_c_hash, kind: NodeKind::Regular, mode: 0o644 },
        TreeEntry { name: name("test.c"), hash: test_c_v2_hash, kind: NodeKind::Regular, mode: 0o644 },
        TreeEntry { name: name("extra.h"), hash: extra_h_hash, kind: NodeKind::Regular, mode: 0o644 },
    ]);
    let src_tree_v2_hash = hash_byte(212);
    store.put_tree_at(src_tree_v2_hash, src_tree_v2);

    let root_tree_v2 = Tree::new(vec![TreeEntry { name: name("src"), hash: src_tree_v2_hash, kind: NodeKind::Directory, mode: 0o755 }]);
    let root_v2_hash = hash_byte(213);
    store.put_tree_at(root_v2_hash, root_tree_v2);

    let commit2 = hash_byte(229);
    store.put_commit_at(commit2, root_v2_hash);
    importer.seed_revision("fixture-reset-2", root_v2_hash);

    (commit1, commit2)
}

/// A minimal two-file, one-directory manifest: `/greeting.txt`,
/// `/docs/readme.txt`. Used by tests that don't care about symlinks.
pub async fn build_simple_fixture(store: &MemoryObjectStore, importer: &MemoryImporter) -> Hash {
    let greeting_hash = blob_at(store, 101, b"hello").await;
    let readme_hash = blob_at(store, 102, b"read me").await;

    let docs_tree = Tree::new(vec![TreeEntry { name: name("readme.txt"), hash: readme_hash, kind: NodeKind::Regular, mode: 0o644 }]);
    let docs_hash = hash_byte(110);
    store.put_tree_at(docs_hash, docs_tree);

    let root_tree = Tree::new(vec![
        TreeEntry { name: name("greeting.txt"), hash: greeting_hash, kind: NodeKind::Regular, mode: 0o644 },
        TreeEntry { name: name("docs"), hash: docs_hash, kind: NodeKind::Directory, mode: 0o755 },
    ]);
    let root_hash = hash_byte(111);
    store.put_tree_at(root_hash, root_tree);

    let commit = hash_byte(199);
    store.put_commit_at(commit, root_hash);
    importer.seed_revision("fixture-simple", root_hash);
    commit
}
