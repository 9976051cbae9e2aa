//! Property tests for the local staging directory.
//!
//! Whatever mix of files a crashed run leaves behind, purging removes every
//! temp file and nothing else, and pruning keeps exactly the newest
//! canonical snapshots.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use snapvault::staging::LocalStaging;
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn staging(dir: &TempDir) -> LocalStaging {
    LocalStaging::new(dir.path(), ".backup", ".tmp", "backup")
}

fn canonical_names(staging: &LocalStaging, offsets: &HashSet<u32>) -> Vec<String> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    offsets
        .iter()
        .map(|secs| staging.canonical_name(base + Duration::seconds(i64::from(*secs))))
        .collect()
}

fn names_in(dir: &TempDir) -> HashSet<String> {
    fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn touch_all<'a>(dir: &TempDir, names: impl IntoIterator<Item = &'a String>) {
    for name in names {
        fs::write(dir.path().join(name), b"x").unwrap();
    }
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn purge_removes_only_temp_files(
        temp_ids in prop::collection::hash_set("[a-z0-9]{1,12}", 0..8),
        offsets in prop::collection::hash_set(0u32..50_000_000, 0..6),
        other_ids in prop::collection::hash_set("[a-z0-9]{1,12}", 0..4),
    ) {
        let dir = TempDir::new().unwrap();
        let staging = staging(&dir);

        let temps: Vec<String> = temp_ids.iter().map(|id| format!(".backup{}.tmp", id)).collect();
        let mut keep: HashSet<String> = canonical_names(&staging, &offsets).into_iter().collect();
        keep.extend(other_ids.iter().map(|id| format!("notes-{}.txt", id)));
        // Prefix and suffix with nothing between them is not a temp name.
        keep.insert(".backup.tmp".to_string());

        touch_all(&dir, &temps);
        touch_all(&dir, &keep);

        prop_assert_eq!(staging.purge_stale_temp_files(), temps.len());
        prop_assert_eq!(names_in(&dir), keep.clone());

        prop_assert_eq!(staging.purge_stale_temp_files(), 0);
        prop_assert_eq!(names_in(&dir), keep);
    }

    #[test]
    fn prune_keeps_newest_canonical(
        offsets in prop::collection::hash_set(0u32..50_000_000, 0..8),
        keep in 0usize..4,
    ) {
        let dir = TempDir::new().unwrap();
        let staging = staging(&dir);

        let mut names = canonical_names(&staging, &offsets);
        touch_all(&dir, &names);
        fs::write(dir.path().join("unrelated.txt"), b"x").unwrap();

        let pruned = staging.prune_canonical(keep);
        prop_assert_eq!(pruned, names.len().saturating_sub(keep));

        // Zero-padded timestamps sort chronologically as strings.
        names.sort();
        let expected: HashSet<String> = names.iter().rev().take(keep).cloned().collect();
        let remaining: HashSet<String> = staging
            .list_canonical()
            .unwrap()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        prop_assert_eq!(remaining, expected);
        prop_assert!(dir.path().join("unrelated.txt").exists());
    }
}

#[test]
fn cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let staging = staging(&dir);

    let temp = staging.create_temp_file().unwrap();
    assert!(temp.path.exists());
    assert!(staging.is_temp_name(&temp.name));

    staging.cleanup(&temp);
    staging.cleanup(&temp);
    assert!(!temp.path.exists());
    assert!(names_in(&dir).is_empty());
}
