//! Integration tests for the deduplication engine
//!
//! Each test builds a small tree with `TestEnvironment`, runs files through a
//! `LinkStore` and checks the resulting disk state and counters.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use hashlink_config::testing::TestEnvironment;
use hashlink_store::{
    CappedLinkStrategy, ContentHasher, FileOutcome, JournalEntry, LinkStore, OperationMonitor,
    OperationStats, StoreOptions, VerifyMode,
};

fn open(env: &TestEnvironment, dry_run: bool) -> LinkStore {
    LinkStore::open(
        &env.store_root,
        StoreOptions {
            dry_run,
            ..Default::default()
        },
    )
    .unwrap()
}

fn open_capped(env: &TestEnvironment, max_links: u64) -> LinkStore {
    let monitor = OperationMonitor::new(false, Box::new(CappedLinkStrategy::new(max_links)));
    LinkStore::with_monitor(&env.store_root, VerifyMode::Size, monitor).unwrap()
}

fn run(store: &mut LinkStore, paths: &[PathBuf]) -> Vec<Option<FileOutcome>> {
    paths.iter().map(|p| store.process(p, 1)).collect()
}

fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

fn set_readonly(path: &Path) {
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms).unwrap();
}

fn is_readonly(path: &Path) -> bool {
    fs::metadata(path).unwrap().permissions().readonly()
}

#[cfg(unix)]
fn inode(path: &Path) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).unwrap();
    (meta.dev(), meta.ino())
}

/// Identical content: one leader, the rest link to it
#[test]
fn test_duplicates_share_one_block() {
    let env = TestEnvironment::new().unwrap();
    let paths: Vec<PathBuf> = (0..5)
        .map(|i| env.create_file(&format!("dir{i}/copy.txt"), b"duplicate payload").unwrap())
        .collect();

    let mut store = open(&env, false);
    let outcomes = run(&mut store, &paths);

    assert_eq!(outcomes[0], Some(FileOutcome::LeaderInstalled));
    assert!(outcomes[1..].iter().all(|o| *o == Some(FileOutcome::Linked)));

    let slot = store
        .layout()
        .slot_path(&ContentHasher::fingerprint_bytes(b"duplicate payload"));
    #[cfg(unix)]
    {
        let blocks: HashSet<_> = paths.iter().map(|p| inode(p)).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks.contains(&inode(&slot)));
        assert_eq!(hashlink_store::link_strategy::link_count(&slot).unwrap(), 6);
    }
    for p in &paths {
        assert_eq!(fs::read(p).unwrap(), b"duplicate payload");
    }

    let stats = store.finish();
    assert_eq!(stats.processed_files, 5);
    assert_eq!(stats.hashed_files, 5);
    assert_eq!(stats.moved_files, 1);
    assert_eq!(stats.deleted_files, 4);
    assert_eq!(stats.linked_files, 5);
    assert_eq!(stats.collisions, 0);
    assert_eq!(stats.errors, 0);
}

/// Distinct content lands in distinct slots
#[test]
fn test_distinct_files_get_own_slots() {
    let env = TestEnvironment::new().unwrap();
    let a = env.create_file("a", b"alpha").unwrap();
    let b = env.create_file("b", b"beta").unwrap();

    let mut store = open(&env, false);
    assert_eq!(
        run(&mut store, &[a.clone(), b.clone()]),
        vec![
            Some(FileOutcome::LeaderInstalled),
            Some(FileOutcome::LeaderInstalled)
        ]
    );
    assert_eq!(fs::read(&a).unwrap(), b"alpha");
    assert_eq!(fs::read(&b).unwrap(), b"beta");
    assert_eq!(store.stats().moved_files, 2);
    assert_eq!(store.stats().deleted_files, 0);
}

/// Same slot, different size: collision reported, file untouched
#[test]
fn test_size_mismatch_is_collision() {
    let env = TestEnvironment::new().unwrap();
    let a = env.create_file("a", b"original").unwrap();
    let b = env.create_file("b", b"impostor with another size").unwrap();

    let mut store = open(&env, false);
    store.process(&a, 0).unwrap();

    // Forge a slot hit: put b's fingerprint slot on a's data.
    let b_slot = store
        .layout()
        .slot_path(&ContentHasher::fingerprint_bytes(b"impostor with another size"));
    fs::create_dir_all(b_slot.parent().unwrap()).unwrap();
    fs::write(&b_slot, b"short").unwrap();

    assert_eq!(store.process(&b, 0), Some(FileOutcome::CollisionSkipped));
    assert_eq!(fs::read(&b).unwrap(), b"impostor with another size");
    assert_eq!(fs::read(&b_slot).unwrap(), b"short");

    let stats = store.finish();
    assert_eq!(stats.collisions, 1);
    assert_eq!(stats.deleted_files, 0);
    assert!(stats.has_failures());
}

/// Content verification catches a forged slot of equal size
#[test]
fn test_content_verify_catches_equal_size_forgery() {
    let env = TestEnvironment::new().unwrap();
    let a = env.create_file("a", b"12345").unwrap();

    let mut store = LinkStore::open(
        &env.store_root,
        StoreOptions {
            verify: VerifyMode::Content,
            ..Default::default()
        },
    )
    .unwrap();
    let slot = store
        .layout()
        .slot_path(&ContentHasher::fingerprint_bytes(b"12345"));
    fs::create_dir_all(slot.parent().unwrap()).unwrap();
    fs::write(&slot, b"54321").unwrap();

    assert_eq!(store.process(&a, 0), Some(FileOutcome::CollisionSkipped));
    assert_eq!(fs::read(&a).unwrap(), b"12345");
}

/// Ceiling L=2 over a, b, c: {a, b} share a block, c leads a new cluster
#[cfg(unix)]
#[test]
fn test_fission_at_link_ceiling() {
    let env = TestEnvironment::new().unwrap();
    let paths: Vec<PathBuf> = ["a", "b", "c"]
        .iter()
        .map(|n| env.create_file(n, b"ten bytes!").unwrap())
        .collect();

    let mut store = open_capped(&env, 2);
    let outcomes = run(&mut store, &paths);
    assert_eq!(
        outcomes,
        vec![
            Some(FileOutcome::LeaderInstalled),
            Some(FileOutcome::Fissioned),
            Some(FileOutcome::LeaderInstalled),
        ]
    );

    let slot = store
        .layout()
        .slot_path(&ContentHasher::fingerprint_bytes(b"ten bytes!"));
    assert_eq!(inode(&paths[0]), inode(&paths[1]));
    assert_ne!(inode(&paths[1]), inode(&paths[2]));
    assert_eq!(inode(&paths[2]), inode(&slot));

    let blocks: HashSet<_> = paths.iter().map(|p| inode(p)).collect();
    assert_eq!(blocks.len(), 2);
    for p in &paths {
        assert_eq!(fs::read(p).unwrap(), b"ten bytes!");
        assert!(hashlink_store::link_strategy::link_count(p).unwrap() <= 2);
    }

    let stats = store.finish();
    assert_eq!(stats.moved_files, 3);
    assert_eq!(stats.linked_files, 2);
    assert_eq!(stats.deleted_files, 1);
    assert_eq!(stats.errors, 0);
}

/// N files over ceiling C produce ceil(N / C) blocks of at most C entries
#[cfg(unix)]
#[test]
fn test_fission_block_count() {
    let env = TestEnvironment::new().unwrap();
    let paths: Vec<PathBuf> = (0..10)
        .map(|i| env.create_file(&format!("f{i}"), b"clustered").unwrap())
        .collect();

    let mut store = open_capped(&env, 3);
    run(&mut store, &paths);

    let slot = store
        .layout()
        .slot_path(&ContentHasher::fingerprint_bytes(b"clustered"));
    let mut blocks: Vec<(u64, u64)> = paths.iter().map(|p| inode(p)).collect();
    if slot.exists() {
        blocks.push(inode(&slot));
    }
    let mut sizes = std::collections::HashMap::new();
    for b in &blocks {
        *sizes.entry(*b).or_insert(0u64) += 1;
    }
    assert_eq!(sizes.len(), 10_usize.div_ceil(3));
    assert!(sizes.values().all(|n| *n <= 3));
    assert_eq!(store.stats().errors, 0);
}

/// Dry-run mutates nothing and counts what a real run does
#[test]
fn test_dry_run_matches_real_run() {
    fn build(env: &TestEnvironment) -> Vec<PathBuf> {
        vec![
            env.create_file_with_mtime("x/one", b"shared", 1_500_000_000).unwrap(),
            env.create_file_with_mtime("y/two", b"shared", 1_500_000_000).unwrap(),
            env.create_file_with_mtime("z/three", b"shared", 1_500_000_000).unwrap(),
            env.create_file("unique", b"only once").unwrap(),
            env.create_file("empty-1", b"").unwrap(),
            env.create_file("empty-2", b"").unwrap(),
        ]
    }

    let dry_env = TestEnvironment::new().unwrap();
    let dry_paths = build(&dry_env);
    let before = dry_env.snapshot().unwrap();

    let mut dry = open(&dry_env, true);
    let dry_outcomes = run(&mut dry, &dry_paths);
    let dry_stats: OperationStats = dry.finish();
    assert_eq!(before, dry_env.snapshot().unwrap());

    let real_env = TestEnvironment::new().unwrap();
    let real_paths = build(&real_env);
    let mut real = open(&real_env, false);
    let real_outcomes = run(&mut real, &real_paths);
    let real_stats = real.finish();

    assert_eq!(dry_outcomes, real_outcomes);
    assert_eq!(dry_stats, real_stats);
    assert_eq!(real_stats.moved_files, 3);
    assert_eq!(real_stats.deleted_files, 3);
}

/// Every path keeps its mtime and read-only flag whichever branch it took
#[test]
fn test_metadata_preserved() {
    let env = TestEnvironment::new().unwrap();
    let leader = env.create_file_with_mtime("leader", b"dup", 1_400_000_000).unwrap();
    let follower = env.create_file_with_mtime("follower", b"dup", 1_400_000_000).unwrap();
    let lone = env.create_file_with_mtime("lone", b"unique", 1_300_000_000).unwrap();
    let ro = env.create_file_with_mtime("ro", b"read only", 1_200_000_000).unwrap();
    set_readonly(&ro);

    let before = env.snapshot().unwrap();
    let mut store = open(&env, false);
    run(&mut store, &[leader, follower, lone, ro]);
    assert_eq!(store.stats().errors, 0);

    let after = env.snapshot().unwrap();
    for (rel, snap) in &before {
        assert_eq!(after.get(rel), Some(snap), "{}", rel.display());
    }
}

/// A read-only duplicate keeps its mtime and flag on the link branch
#[test]
fn test_metadata_preserved_on_readonly_link() {
    let env = TestEnvironment::new().unwrap();
    let leader = env.create_file_with_mtime("leader", b"shared", 1_100_000_000).unwrap();
    let dup = env.create_file_with_mtime("dup", b"shared", 1_200_000_000).unwrap();
    set_readonly(&dup);

    let mut store = open(&env, false);
    assert_eq!(
        run(&mut store, &[leader.clone(), dup.clone()]),
        vec![Some(FileOutcome::LeaderInstalled), Some(FileOutcome::Linked)]
    );

    assert_eq!(mtime(&dup), 1_200_000_000);
    assert!(is_readonly(&dup));
    assert_eq!(fs::read(&dup).unwrap(), b"shared");
    assert_eq!(fs::read(&leader).unwrap(), b"shared");
    assert_eq!(store.stats().errors, 0);
}

/// The fissioned path gets back its own mtime and flag
#[cfg(unix)]
#[test]
fn test_metadata_preserved_on_fission() {
    let env = TestEnvironment::new().unwrap();
    let a = env.create_file_with_mtime("a", b"capped", 1_100_000_000).unwrap();
    let b = env.create_file_with_mtime("b", b"capped", 1_200_000_000).unwrap();
    set_readonly(&b);

    let mut store = open_capped(&env, 2);
    assert_eq!(
        run(&mut store, &[a.clone(), b.clone()]),
        vec![Some(FileOutcome::LeaderInstalled), Some(FileOutcome::Fissioned)]
    );

    assert_eq!(mtime(&b), 1_200_000_000);
    assert!(is_readonly(&b));
    assert_eq!(fs::read(&b).unwrap(), b"capped");
    // a and b are one inode now; the last restore wins.
    assert_eq!(inode(&a), inode(&b));
    assert_eq!(mtime(&a), 1_200_000_000);
    assert_eq!(store.stats().errors, 0);
}

/// A leader that cannot be linked back at all is moved home intact
#[cfg(unix)]
#[test]
fn test_metadata_preserved_on_leader_fission() {
    let env = TestEnvironment::new().unwrap();
    let lone = env.create_file_with_mtime("lone", b"solo", 1_300_000_000).unwrap();
    set_readonly(&lone);

    let mut store = open_capped(&env, 1);
    assert_eq!(store.process(&lone, 0), Some(FileOutcome::Fissioned));

    let slot = store
        .layout()
        .slot_path(&ContentHasher::fingerprint_bytes(b"solo"));
    assert!(!slot.exists());
    assert_eq!(fs::read(&lone).unwrap(), b"solo");
    assert_eq!(mtime(&lone), 1_300_000_000);
    assert!(is_readonly(&lone));

    let stats = store.finish();
    assert_eq!(stats.moved_files, 2);
    assert_eq!(stats.linked_files, 0);
    assert_eq!(stats.errors, 0);
}

/// A second pass over a deduplicated tree changes nothing
#[cfg(unix)]
#[test]
fn test_rerun_is_idempotent() {
    let env = TestEnvironment::new().unwrap();
    let paths = vec![
        env.create_file("a", b"again").unwrap(),
        env.create_file("b", b"again").unwrap(),
    ];

    let mut first = open(&env, false);
    run(&mut first, &paths);
    first.finish();
    let before = env.snapshot().unwrap();

    let mut second = open(&env, false);
    let outcomes = run(&mut second, &paths);
    assert_eq!(
        outcomes,
        vec![Some(FileOutcome::AlreadyLinked), Some(FileOutcome::AlreadyLinked)]
    );
    let stats = second.finish();
    assert_eq!(stats.skipped_files, 2);
    assert_eq!(stats.linked_files + stats.moved_files + stats.deleted_files, 0);
    assert_eq!(before, env.snapshot().unwrap());
}

/// A vanished file is an error for that file only
#[test]
fn test_errors_do_not_stop_the_pass() {
    let env = TestEnvironment::new().unwrap();
    let good = env.create_file("good", b"fine").unwrap();
    let gone = env.tree_root.join("gone");

    let mut store = open(&env, false);
    assert_eq!(store.process(&gone, 0), None);
    assert_eq!(store.process(&good, 0), Some(FileOutcome::LeaderInstalled));

    let stats = store.finish();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.processed_files, 2);
    assert!(stats.has_failures());
}

/// Opening a store replays an interrupted leader install
#[test]
fn test_open_recovers_interrupted_transition() {
    let env = TestEnvironment::new().unwrap();
    let source = env.create_file_with_mtime("victim", b"half done", 1_450_000_000).unwrap();

    // Simulate a crash right after the move into the slot.
    let slot = hashlink_store::StoreLayout::new(&env.store_root)
        .slot_path(&ContentHasher::fingerprint_bytes(b"half done"));
    fs::create_dir_all(slot.parent().unwrap()).unwrap();
    fs::rename(&source, &slot).unwrap();
    let entry = JournalEntry {
        source: source.clone(),
        slot: slot.clone(),
    };
    let journal = env.store_root.join(hashlink_store::layout::JOURNAL_FILE);
    fs::write(&journal, serde_json::to_vec(&entry).unwrap()).unwrap();

    let store = open(&env, false);
    assert_eq!(fs::read(&source).unwrap(), b"half done");
    assert!(slot.exists());
    assert!(!journal.exists());
    assert_eq!(store.stats().linked_files, 1);

    assert_eq!(mtime(&source), 1_450_000_000);
}

/// Dry-run leaves a pending journal alone
#[test]
fn test_dry_run_does_not_recover() {
    let env = TestEnvironment::new().unwrap();
    fs::create_dir_all(&env.store_root).unwrap();
    let entry = JournalEntry {
        source: env.tree_root.join("missing"),
        slot: env.store_root.join("blake3/00/00/missing"),
    };
    let journal = env.store_root.join(hashlink_store::layout::JOURNAL_FILE);
    fs::write(&journal, serde_json::to_vec(&entry).unwrap()).unwrap();

    let mut store = open(&env, true);
    assert!(journal.exists());
    assert_eq!(store.recover().unwrap(), Some(entry));
    assert!(journal.exists());
}
