use archscope::utils::cache::{self, IncrementalCache, CACHE_FILE_NAME, CACHE_FORMAT_VERSION};
use std::fs;
use std::path::{Path, PathBuf};

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    fs::write(path, content).unwrap();
}

fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("proj");
    let cache_dir = root.join(".archscope");
    write_file(&root.join("pkg/a.py"), "def a(): pass\n");
    write_file(&root.join("pkg/b.py"), "def b(): pass\n");
    (tmp, root, cache_dir)
}

#[test]
fn get_after_update_save_and_cold_reload_returns_payload() {
    let (_tmp, root, cache_dir) = setup();
    let file = root.join("pkg/a.py");

    let mut c: IncrementalCache<Vec<String>> = IncrementalCache::open(&root, &cache_dir, "fp1");
    assert!(c.get(&file).is_none());
    c.update(&file, vec!["pkg.a.a".to_string()]);
    c.save().unwrap();
    assert!(cache_dir.join(CACHE_FILE_NAME).exists());

    let reloaded: IncrementalCache<Vec<String>> = IncrementalCache::open(&root, &cache_dir, "fp1");
    assert_eq!(reloaded.get(&file), Some(vec!["pkg.a.a".to_string()]));
}

#[test]
fn content_change_misses_then_new_payload_survives_reload() {
    let (_tmp, root, cache_dir) = setup();
    let file = root.join("pkg/a.py");

    let mut c: IncrementalCache<String> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.update(&file, "v1".to_string());
    c.save().unwrap();

    // One byte changed
    write_file(&file, "def a(): pasS\n");
    let mut c: IncrementalCache<String> = IncrementalCache::open(&root, &cache_dir, "fp");
    assert!(c.get(&file).is_none());
    c.update(&file, "v2".to_string());
    c.save().unwrap();

    let fresh: IncrementalCache<String> = IncrementalCache::open(&root, &cache_dir, "fp");
    assert_eq!(fresh.get(&file).as_deref(), Some("v2"));
}

#[test]
fn fingerprint_mismatch_discards_everything() {
    let (_tmp, root, cache_dir) = setup();
    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "old");
    c.update(&root.join("pkg/a.py"), 1);
    c.update(&root.join("pkg/b.py"), 2);
    c.save().unwrap();

    let c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "new");
    assert!(c.is_empty());
    assert!(c.get(&root.join("pkg/a.py")).is_none());
}

#[test]
fn format_version_mismatch_discards_everything() {
    let (_tmp, root, cache_dir) = setup();
    let hash = cache::hash_file(&root.join("pkg/a.py")).unwrap();
    let doc = serde_json::json!({
        "format_version": "0.0.1",
        "fingerprint": "fp",
        "entries": { "pkg/a.py": { "hash": hash, "payload": 7 } }
    });
    write_file(&cache_dir.join(CACHE_FILE_NAME), &doc.to_string());

    let c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    assert!(c.is_empty());
    assert_ne!(CACHE_FORMAT_VERSION, "0.0.1");
}

#[test]
fn corrupt_cache_file_is_treated_as_absent() {
    let (_tmp, root, cache_dir) = setup();
    write_file(&cache_dir.join(CACHE_FILE_NAME), "{ not json at all");

    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    assert!(c.is_empty());
    // Still usable afterwards
    c.update(&root.join("pkg/a.py"), 3);
    c.save().unwrap();
    let c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    assert_eq!(c.get(&root.join("pkg/a.py")), Some(3));
}

#[test]
fn prune_removes_unknown_entries_and_marks_dirty() {
    let (_tmp, root, cache_dir) = setup();
    let a = root.join("pkg/a.py");
    let b = root.join("pkg/b.py");
    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.update(&a, 1);
    c.update(&b, 2);
    c.save().unwrap();
    assert!(!c.is_dirty());

    c.prune(&[a.clone()]);
    assert!(c.is_dirty());
    assert_eq!(c.len(), 1);
    c.save().unwrap();

    let c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    assert_eq!(c.get(&a), Some(1));
    assert!(c.get(&b).is_none());
}

#[test]
fn prune_with_same_set_keeps_cache_clean() {
    let (_tmp, root, cache_dir) = setup();
    let a = root.join("pkg/a.py");
    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.update(&a, 1);
    c.save().unwrap();
    c.prune(&[a]);
    assert!(!c.is_dirty());
}

#[test]
fn save_is_noop_when_clean_and_leaves_no_temp_file() {
    let (_tmp, root, cache_dir) = setup();
    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.save().unwrap();
    assert!(!cache_dir.join(CACHE_FILE_NAME).exists());

    c.update(&root.join("pkg/a.py"), 1);
    c.save().unwrap();
    let names: Vec<String> = fs::read_dir(&cache_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![CACHE_FILE_NAME.to_string()]);
}

#[test]
fn keys_are_relative_forward_slash_and_reject_outside_paths() {
    let (tmp, root, _cache_dir) = setup();
    let key = cache::cache_key(&root, &root.join("pkg").join("a.py")).unwrap();
    assert_eq!(key, "pkg/a.py");

    let outside = tmp.path().join("elsewhere.py");
    write_file(&outside, "x = 1\n");
    let err = cache::cache_key(&root, &outside).unwrap_err();
    assert!(matches!(err, archscope::errors::AnalysisError::PathResolution { .. }));
}

#[test]
fn outside_paths_are_skipped_not_fatal() {
    let (tmp, root, cache_dir) = setup();
    let outside = tmp.path().join("elsewhere.py");
    write_file(&outside, "x = 1\n");

    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.update(&outside, 9);
    assert!(c.is_empty());
    assert!(c.get(&outside).is_none());
}

#[test]
fn cache_file_is_portable_across_root_locations() {
    let (tmp, root, cache_dir) = setup();
    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.update(&root.join("pkg/a.py"), 5);
    c.save().unwrap();

    // Move the whole project, cache included
    let moved = tmp.path().join("moved");
    fs::rename(&root, &moved).unwrap();
    let c: IncrementalCache<u32> = IncrementalCache::open(&moved, &moved.join(".archscope"), "fp");
    assert_eq!(c.get(&moved.join("pkg/a.py")), Some(5));
}

#[test]
fn clear_cache_reports_whether_a_file_was_removed() {
    let (_tmp, root, cache_dir) = setup();
    assert!(!cache::clear_cache(&cache_dir).unwrap());
    let mut c: IncrementalCache<u32> = IncrementalCache::open(&root, &cache_dir, "fp");
    c.update(&root.join("pkg/a.py"), 1);
    c.save().unwrap();
    assert!(cache::clear_cache(&cache_dir).unwrap());
    assert!(!cache_dir.join(CACHE_FILE_NAME).exists());
}
