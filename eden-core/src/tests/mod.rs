//! End-to-end scenarios driven entirely through [crate::mount::Mount]'s
//! public surface, with every external collaborator swapped for its
//! in-memory fixture from [crate::testing].
use crate::cache::BlobCache;
use crate::clock::{FakeClock, Timestamp};
use crate::config::MountConfig;
use crate::errors::Error;
use crate::fixtures::{build_reset_parent_fixture, build_simple_fixture, build_symlink_fixture};
use crate::inode::SetAttrRequest;
use crate::journal::JournalEntry;
use crate::mount::Mount;
use crate::path::AbsolutePath;
use crate::testing::{MemoryConfigStore, MemoryImporter, MemoryJournal, MemoryObjectStore, RecordingNotifier};
use std::sync::Arc;

struct Harness {
    mount: Arc<Mount>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<FakeClock>,
    config_store: Arc<MemoryConfigStore>,
}

async fn symlink_harness() -> Harness {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    build_symlink_fixture(&store, &importer).await;
    harness_with("fixture-symlinks", store, importer).await
}

async fn simple_harness() -> Harness {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    build_simple_fixture(&store, &importer).await;
    harness_with("fixture-simple", store, importer).await
}

async fn harness_with(revision: &str, store: Arc<MemoryObjectStore>, importer: Arc<MemoryImporter>) -> Harness {
    harness_with_clock(revision, store, importer, Arc::new(FakeClock::new(Timestamp::new(1_000_000, 0)))).await
}

async fn harness_with_clock(
    revision: &str,
    store: Arc<MemoryObjectStore>,
    importer: Arc<MemoryImporter>,
    clock: Arc<FakeClock>,
) -> Harness {
    let cache = BlobCache::new(1 << 20, 64);
    let notifier = Arc::new(RecordingNotifier::default());
    let config_store = Arc::new(MemoryConfigStore::default());
    let mount = Mount::initialize(
        revision,
        MountConfig::default(),
        store,
        importer,
        cache,
        Arc::new(MemoryJournal::default()),
        config_store.clone(),
        clock.clone(),
        notifier.clone(),
    )
    .await
    .expect("fixture manifest resolves");
    Harness { mount, notifier, clock, config_store }
}

fn abs(s: &str) -> AbsolutePath {
    AbsolutePath::parse(s).unwrap()
}

/// `Mount::initialize` produces a journal entry for the initial checkout,
/// same as any later `reset_parent`, so a fresh mount's history isn't empty.
/// Modeled on `EdenMountTest.cpp`'s construction of its initial commit entry.
#[tokio::test]
async fn initialize_appends_an_initial_journal_entry() {
    let h = simple_harness().await;
    let entry = h.mount.get_latest_journal_entry().unwrap();
    assert_eq!(entry.from_commit, entry.to_commit);
    assert!(entry.file_changes.is_empty());
}

#[tokio::test]
async fn initialize_with_unknown_revision_is_a_domain_error() {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    let result = Mount::initialize(
        "no-such-revision",
        MountConfig::default(),
        store,
        importer,
        BlobCache::new(1 << 20, 8),
        Arc::new(MemoryJournal::default()),
        Arc::new(MemoryConfigStore::default()),
        Arc::new(FakeClock::new(Timestamp::new(0, 0))),
        Arc::new(RecordingNotifier::default()),
    )
    .await;
    assert!(matches!(result, Err(Error::Domain(_))));
}

/// The chain `a` -> `b` -> `src/c` -> `test.c` only lands on `src/test.c`
/// because each hop resolves relative to the directory it lives in. This
/// is the scenario `EdenMountTest.cpp` flags `// BAD BAD BAD`.
#[tokio::test]
async fn symlink_chain_resolves_through_each_hops_own_directory() {
    let h = symlink_harness().await;
    let target = h.mount.get_inode(&abs("/src/test.c")).await.unwrap();
    let via_c = h.mount.get_inode(&abs("/src/c")).await.unwrap();
    let via_b = h.mount.get_inode(&abs("/b")).await.unwrap();
    let via_a = h.mount.get_inode(&abs("/a")).await.unwrap();
    assert_eq!(target.number(), via_c.number());
    assert_eq!(target.number(), via_b.number());
    assert_eq!(target.number(), via_a.number());
}

#[tokio::test]
async fn symlink_through_unrelated_directories_still_resolves() {
    let h = symlink_harness().await;
    let foo = h.mount.get_inode(&abs("/d1/foo.txt")).await.unwrap();
    let via_somelink = h.mount.get_inode(&abs("/d1/d2/d3/somelink")).await.unwrap();
    assert_eq!(foo.number(), via_somelink.number());

    let test_c = h.mount.get_inode(&abs("/src/test.c")).await.unwrap();
    let via_anotherlink = h.mount.get_inode(&abs("/d1/d2/d3/anotherlink")).await.unwrap();
    assert_eq!(test_c.number(), via_anotherlink.number());
}

#[tokio::test]
async fn symlink_to_directory_resolves_to_that_directory() {
    let h = symlink_harness().await;
    let src = h.mount.get_inode(&abs("/src")).await.unwrap();
    let via_link = h.mount.get_inode(&abs("/src/link_to_dir")).await.unwrap();
    assert_eq!(src.number(), via_link.number());
}

#[tokio::test]
async fn absolute_symlink_target_is_permission_denied() {
    let h = symlink_harness().await;
    let err = h.mount.get_inode(&abs("/d")).await.unwrap_err();
    assert_eq!(err.errno(), libc::EPERM);
}

#[tokio::test]
async fn symlink_escaping_the_mount_root_is_cross_device_link() {
    let h = symlink_harness().await;
    let err = h.mount.get_inode(&abs("/link_outside_mount")).await.unwrap_err();
    assert_eq!(err.errno(), libc::EXDEV);
}

#[tokio::test]
async fn symlink_to_a_nonexistent_target_is_not_found() {
    let h = symlink_harness().await;
    let err = h.mount.get_inode(&abs("/badlink")).await.unwrap_err();
    assert_eq!(err.errno(), libc::ENOENT);
}

#[tokio::test]
async fn two_hop_symlink_cycle_is_eloop() {
    let h = symlink_harness().await;
    let err = h.mount.get_inode(&abs("/loop1")).await.unwrap_err();
    assert_eq!(err.errno(), libc::ELOOP);
}

#[tokio::test]
async fn self_referential_symlink_is_eloop() {
    let h = symlink_harness().await;
    let err = h.mount.get_inode(&abs("/src/selfloop")).await.unwrap_err();
    assert_eq!(err.errno(), libc::ELOOP);
}

#[tokio::test]
async fn get_inode_no_follow_returns_the_symlink_itself() {
    let h = symlink_harness().await;
    let inode = h.mount.get_inode_no_follow(&abs("/a")).await.unwrap();
    assert!(inode.is_symlink());
}

#[tokio::test]
async fn ensure_directory_exists_creates_missing_components_idempotently() {
    let h = simple_harness().await;
    let dir = h.mount.ensure_directory_exists(&abs("/docs/archive/2020")).await.unwrap();
    assert_eq!(dir.list_children().len(), 0);

    // Calling it again with an overlapping prefix doesn't disturb what's
    // already there.
    let again = h.mount.ensure_directory_exists(&abs("/docs/archive/2020")).await.unwrap();
    assert_eq!(dir.number(), again.number());

    let docs = h.mount.get_inode(&abs("/docs")).await.unwrap();
    let docs = docs.as_tree().unwrap();
    assert_eq!(docs.list_children().len(), 2); // readme.txt (manifest) + archive (created)
}

#[tokio::test]
async fn write_materializes_content_and_read_reflects_it() {
    let h = simple_harness().await;
    let inode = h.mount.get_inode(&abs("/greeting.txt")).await.unwrap();
    let file = inode.as_file().unwrap().clone();

    let cache = BlobCache::new(1 << 20, 8);
    let importer = MemoryImporter::default();
    let store = MemoryObjectStore::default();
    let clock = crate::clock::SystemClock;

    let before = file.read(0, 5, &cache, &store, &importer, &clock).await.unwrap();
    assert_eq!(&before[..], b"hello");

    // Overwrite the backing content's tail locally.
    file.write(5, b", world", &cache, &store, &importer, &clock).await.unwrap();
    let after = file.read(0, 12, &cache, &store, &importer, &clock).await.unwrap();
    assert_eq!(&after[..], b"hello, world");
}

#[tokio::test]
async fn unload_then_lookup_by_number_preserves_identity() {
    let h = simple_harness().await;
    let inode = h.mount.get_inode(&abs("/docs/readme.txt")).await.unwrap();
    let number = inode.number();
    drop(inode);

    assert!(h.mount.inode_map().get_loaded(number).is_some());
    h.mount.unload_quiescent_inodes();
    assert!(h.mount.inode_map().get_loaded(number).is_none());
    assert!(h.mount.inode_map().get_unloaded(number).is_some());

    let reloaded = h.mount.get_inode_by_number(number).await.unwrap();
    assert_eq!(reloaded.number(), number);
    assert!(h.mount.inode_map().get_loaded(number).is_some());
}

/// `Mount::chown` is mount-wide: it changes the default owner for anything
/// loaded later and recurses over every currently loaded inode, notifying
/// the kernel only for inodes it still holds a live reference to. Modeled
/// on `EdenMountTest.cpp`'s `ChownTest` fixture and its three cases.
#[tokio::test]
async fn chown_is_mount_wide_and_notifies_only_referenced_inodes() {
    let h = simple_harness().await;

    // Loaded, zero FUSE refcount: attributes still update, no notification.
    let greeting = h.mount.get_inode(&abs("/greeting.txt")).await.unwrap();
    // Loaded, positive FUSE refcount: attributes update and the kernel is notified.
    let readme = h.mount.get_inode(&abs("/docs/readme.txt")).await.unwrap();
    readme.increment_fuse_refcount();
    // Unloaded (never loaded at all): no notification is possible, and
    // there's nothing to touch until the next load picks up the new default.
    let docs = h.mount.get_inode(&abs("/docs")).await.unwrap();

    h.mount.chown(7, 7);

    assert_eq!(greeting.get_attr().uid, 7);
    assert_eq!(greeting.get_attr().gid, 7);
    assert_eq!(readme.get_attr().uid, 7);
    assert_eq!(docs.get_attr().uid, 7);

    let mut invalidated = h.notifier.invalidated();
    invalidated.sort();
    assert_eq!(invalidated, vec![readme.number()]);
}

/// An unloaded inode is, by construction, never referenced by the kernel
/// (unloading only happens once the FUSE refcount has dropped to zero — see
/// `TreeInode::unload_children_now`). So a `chown` issued after unloading a
/// quiescent file still updates the mount's defaults, and loading that file
/// again afterwards picks up the new owner without any notification ever
/// having been needed for it.
#[tokio::test]
async fn chown_updates_defaults_picked_up_by_inodes_loaded_afterwards() {
    let h = simple_harness().await;
    let inode = h.mount.get_inode(&abs("/greeting.txt")).await.unwrap();
    let number = inode.number();
    drop(inode);
    h.mount.unload_quiescent_inodes();
    assert!(h.mount.inode_map().get_unloaded(number).is_some());

    h.mount.chown(13, 13);
    assert!(h.notifier.invalidated().is_empty());

    let reloaded = h.mount.get_inode_by_number(number).await.unwrap();
    assert_eq!(reloaded.get_attr().uid, 13);
    assert_eq!(reloaded.get_attr().gid, 13);
}

/// `set_attr` touches exactly the one inode named by `path`, unlike
/// `chown`'s mount-wide sweep.
#[tokio::test]
async fn set_attr_changes_permission_bits_on_a_single_file() {
    let h = simple_harness().await;
    let attr = h
        .mount
        .set_attr(&abs("/greeting.txt"), SetAttrRequest { mode: Some(0o600), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(attr.permission_bits(), 0o600);

    let docs = h.mount.get_inode(&abs("/docs")).await.unwrap();
    assert_ne!(docs.get_attr().permission_bits(), 0o600);
}

/// `reset_parent` preserves the already-materialized working tree: it only
/// records the new parent pointer, persists it, and journals the change —
/// replaying the checkout against the new manifest is the embedder's job,
/// not this crate's. Modeled on `EdenMountTest.cpp`'s `resetParents`.
#[tokio::test]
async fn reset_parent_persists_and_journals_without_touching_the_working_tree() {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    let (commit1, commit2) = build_reset_parent_fixture(&store, &importer).await;
    let h = harness_with("fixture-reset-1", store, importer).await;
    assert_eq!(h.mount.current_parents(), vec![commit1]);

    // Touch the working copy before resetting, so we can tell afterwards
    // that the reset didn't disturb it.
    let test_c = h.mount.get_inode(&abs("/src/test.c")).await.unwrap();
    let file = test_c.as_file().unwrap().clone();
    let cache = BlobCache::new(1 << 20, 8);
    let scratch_importer = MemoryImporter::default();
    let scratch_store = MemoryObjectStore::default();
    let clock = crate::clock::SystemClock;
    file.write(0, b"locally edited\n", &cache, &scratch_store, &scratch_importer, &clock).await.unwrap();

    h.mount.reset_parent(commit2, vec!["src/test.c".to_string(), "src/extra.h".to_string()]);

    assert_eq!(h.mount.current_parents(), vec![commit2]);
    assert_eq!(h.config_store.last_persisted_parent(), Some(commit2));
    let entry = h.mount.get_latest_journal_entry().unwrap();
    assert_eq!(
        entry,
        JournalEntry {
            from_commit: commit1,
            to_commit: commit2,
            file_changes: vec!["src/test.c".to_string(), "src/extra.h".to_string()],
        }
    );

    // The working copy's locally-edited content survives untouched; a new
    // file added only in commit2 (`src/extra.h`) isn't materialized by the
    // reset itself.
    let after = file.read(0, u64::MAX, &cache, &scratch_store, &scratch_importer, &clock).await.unwrap();
    assert_eq!(&after[..], b"locally edited\n");
    let extra = h.mount.get_inode(&abs("/src/extra.h")).await;
    assert!(matches!(extra, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn fake_clock_drives_mount_timestamps() {
    let h = simple_harness().await;
    let before = h.mount.last_checkout_time();
    h.mount.reset_parent(crate::hash::Hash::zero(), vec![]);
    assert_eq!(h.mount.last_checkout_time(), before);
}

/// Every inode materialized from the checked-out manifest — files and
/// directories alike — is stamped with the mount's checkout time, even when
/// the lazy load that actually constructs it happens later, after the clock
/// has moved on. Modeled on `EdenMountTest.cpp`'s `testLastCheckoutTime`.
#[tokio::test]
async fn newly_loaded_inodes_are_stamped_with_the_clock_at_load_time() {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    build_simple_fixture(&store, &importer).await;
    let t = Timestamp::new(50_000, 10_000);
    let clock = Arc::new(FakeClock::new(t));
    let h = harness_with_clock("fixture-simple", store, importer, clock).await;

    // Advance the clock well past checkout before anything is actually
    // loaded, so a load that (incorrectly) stamped from "now" would diverge
    // from `t`.
    h.clock.advance_seconds(600);

    let file = h.mount.get_inode(&abs("/greeting.txt")).await.unwrap();
    let dir = h.mount.get_inode(&abs("/docs")).await.unwrap();
    assert_eq!(file.get_attr().mtime, t);
    assert_eq!(file.get_attr().ctime, t);
    assert_eq!(dir.get_attr().mtime, t);
    assert_eq!(dir.get_attr().ctime, t);
    assert_eq!(h.mount.last_checkout_time(), t);
}

/// A directory created through `ensure_directory_exists` (which always asks
/// for `0o755`) has the mount's configured umask intersected into its actual
/// permission bits, same as `mkdir(2)`.
#[tokio::test]
async fn directory_creation_applies_the_configured_creation_mask() {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    build_simple_fixture(&store, &importer).await;
    let config = MountConfig {
        umask: 0o077,
        ..MountConfig::default()
    };
    let mount = Mount::initialize(
        "fixture-simple",
        config,
        store,
        importer,
        BlobCache::new(1 << 20, 8),
        Arc::new(MemoryJournal::default()),
        Arc::new(MemoryConfigStore::default()),
        Arc::new(FakeClock::new(Timestamp::new(1_000_000, 0))),
        Arc::new(RecordingNotifier::default()),
    )
    .await
    .unwrap();

    let created = mount.ensure_directory_exists(&abs("/docs/archive")).await.unwrap();
    assert_eq!(created.get_attr().permission_bits(), 0o700);
}

/// A directory created after the clock has moved on is stamped with the new
/// "now", not the time the mount was initialized. Modeled on
/// `EdenMountTest.cpp`'s `testCreatingFileSetsTimestampsToNow`.
#[tokio::test]
async fn directory_created_after_a_clock_advance_is_stamped_with_the_new_time() {
    let store = Arc::new(MemoryObjectStore::default());
    let importer = Arc::new(MemoryImporter::default());
    build_simple_fixture(&store, &importer).await;
    let clock = Arc::new(FakeClock::new(Timestamp::new(50_000, 10_000)));
    let h = harness_with_clock("fixture-simple", store, importer, clock).await;

    h.clock.advance_seconds(600);
    let created = h.mount.ensure_directory_exists(&abs("/docs/archive")).await.unwrap();
    let expected = Timestamp::new(50_600, 10_000);
    assert_eq!(created.get_attr().mtime, expected);
    assert_eq!(created.get_attr().ctime, expected);
}

/// Ten concurrent callers racing to create the same deep, previously
/// unmaterialized directory chain all succeed and converge on one chain of
/// directories, not ten duplicates. Modeled on `EdenMountTest.cpp`'s
/// `concurrentDeepEnsureDirectoryExists`.
#[tokio::test]
async fn concurrent_ensure_directory_exists_converges_on_one_chain() {
    let h = simple_harness().await;
    let barrier = Arc::new(tokio::sync::Barrier::new(10));
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let mount = h.mount.clone();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            mount.ensure_directory_exists(&abs("/docs/archive/2020/q1")).await
        }));
    }

    let mut numbers = Vec::new();
    for task in tasks {
        numbers.push(task.await.unwrap().unwrap().number());
    }
    assert!(numbers.iter().all(|n| *n == numbers[0]));

    let docs = h.mount.get_inode(&abs("/docs")).await.unwrap();
    let docs = docs.as_tree().unwrap();
    assert_eq!(docs.list_children().len(), 2); // readme.txt (manifest) + archive (created)

    let archive = h.mount.get_inode(&abs("/docs/archive")).await.unwrap();
    assert_eq!(archive.as_tree().unwrap().list_children().len(), 1); // 2020
}
