//! End-to-end behavior of the storage engine: partitioning, overwrite,
//! range reads, range deletes, pagination, eviction and flush durability.

use sandb_core::cache::{CacheConfig, MaintenanceTrigger};
use sandb_core::partition::PartitionAddress;
use sandb_core::segment::read_segment;
use sandb_core::storage::{StorageConfig, StorageEngine};
use sandb_core::{Pagination, Record, SanError, TimeRange};
use serde_json::json;
use tempfile::TempDir;

const HOUR: i64 = 3_600_000;
// 2024-03-01T00:00:00Z
const MARCH_1_2024: i64 = 1_709_251_200_000;

fn open(temp_dir: &TempDir, cache: CacheConfig) -> StorageEngine {
    let engine = StorageEngine::new(StorageConfig {
        data_dir: temp_dir.path().to_path_buf(),
        cache,
    })
    .unwrap();
    engine.create_collection("c").unwrap();
    engine
}

fn manual_cache() -> CacheConfig {
    CacheConfig {
        trigger: MaintenanceTrigger::Interval(std::time::Duration::from_secs(3600)),
        ..Default::default()
    }
}

fn times(records: &[Record]) -> Vec<i64> {
    records.iter().map(|r| r.time).collect()
}

// Through 2033
fn all() -> TimeRange {
    TimeRange::new(1, 2_000_000_000_000)
}

#[test]
fn test_window_boundaries_pick_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let w = |ts| PartitionAddress::locate(root, "c", ts).unwrap().window();
    assert_eq!(w(MARCH_1_2024 + 6 * HOUR - 1), 1);
    assert_eq!(w(MARCH_1_2024 + 6 * HOUR), 2);
    assert_eq!(w(MARCH_1_2024 + 24 * HOUR - 1), 4);
}

#[test]
fn test_overwrite_semantics() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());

    engine.ingest("c", &[Record::new(1000, json!("a"))]).unwrap();
    engine.ingest("c", &[Record::new(1000, json!("b"))]).unwrap();

    let rows = engine.query("c", all(), Pagination::default()).unwrap();
    assert_eq!(rows, vec![Record::new(1000, json!("b"))]);
}

#[test]
fn test_round_trip_single_record() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());

    for (i, payload) in [json!(null), json!(42), json!([1, 2]), json!({"nested": {"k": "v"}})]
        .into_iter()
        .enumerate()
    {
        let record = Record::new(MARCH_1_2024 + i as i64 * 7 * HOUR, payload);
        engine.ingest("c", &[record.clone()]).unwrap();
        let rows = engine
            .query("c", TimeRange::new(record.time, record.time), Pagination::default())
            .unwrap();
        assert_eq!(rows, vec![record]);
    }
}

#[test]
fn test_range_delete_precision() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());

    let records: Vec<Record> = [100, 200, 300].iter().map(|t| Record::new(*t, json!(t))).collect();
    engine.ingest("c", &records).unwrap();

    engine.delete_range("c", TimeRange::new(150, 250)).unwrap();

    let rows = engine
        .query("c", TimeRange::new(1, 1000), Pagination::default())
        .unwrap();
    assert_eq!(times(&rows), vec![100, 300]);
}

#[test]
fn test_pagination() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());

    let records: Vec<Record> = (1..=5).map(|t| Record::new(t, json!(t))).collect();
    engine.ingest("c", &records).unwrap();

    let page = Pagination::from_params(Some(2), Some(1)).unwrap();
    let rows = engine.query("c", TimeRange::new(1, 5), page).unwrap();
    assert_eq!(times(&rows), vec![2, 3]);

    let past_end = Pagination::from_params(None, Some(5)).unwrap();
    assert!(engine.query("c", TimeRange::new(1, 5), past_end).unwrap().is_empty());
}

#[test]
fn test_results_sorted_across_days_and_years() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());

    // 2023-12-31T20:00Z, then 2024 dates, ingested out of order
    let new_year_eve = MARCH_1_2024 - 60 * 24 * HOUR - 4 * HOUR;
    let records = vec![
        Record::new(MARCH_1_2024 + 19 * HOUR, json!("d")),
        Record::new(new_year_eve, json!("a")),
        Record::new(MARCH_1_2024 + HOUR, json!("c")),
        Record::new(new_year_eve + 5 * HOUR, json!("b")),
    ];
    engine.ingest("c", &records).unwrap();

    let rows = engine.query("c", all(), Pagination::default()).unwrap();
    let data: Vec<_> = rows.iter().map(|r| r.data.as_json().unwrap().clone()).collect();
    assert_eq!(data, vec![json!("a"), json!("b"), json!("c"), json!("d")]);

    // Interval starting mid-window on the first day
    let rows = engine
        .query(
            "c",
            TimeRange::new(new_year_eve + 1, MARCH_1_2024 + 2 * HOUR),
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(times(&rows), vec![new_year_eve + 5 * HOUR, MARCH_1_2024 + HOUR]);
}

#[test]
fn test_eviction_under_count_cap() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(
        &temp_dir,
        CacheConfig {
            max_entries: 1,
            ..manual_cache()
        },
    );

    engine.ingest("c", &[Record::new(HOUR, json!(1))]).unwrap();
    engine.ingest("c", &[Record::new(7 * HOUR, json!(2))]).unwrap();
    assert_eq!(engine.cache().len(), 2);

    let report = engine.maintain();
    assert_eq!(report.by_count, 1);

    let latest = PartitionAddress::locate(temp_dir.path(), "c", 7 * HOUR).unwrap();
    assert_eq!(engine.cache().cached_paths(), vec![latest.path]);
}

#[test]
fn test_eviction_under_size_cap() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(
        &temp_dir,
        CacheConfig {
            max_bytes: 16,
            ..manual_cache()
        },
    );

    // "xxxxxxxxxx" encodes to 12 bytes of JSON
    for i in 0..3 {
        engine
            .ingest("c", &[Record::new((i * 6 + 1) * HOUR, json!("xxxxxxxxxx"))])
            .unwrap();
    }
    let report = engine.maintain();
    assert_eq!(report.by_size, 2);
    assert_eq!(engine.cache().stats().bytes, 12);

    // Everything is still on disk
    assert_eq!(engine.query("c", all(), Pagination::default()).unwrap().len(), 3);
}

#[test]
fn test_flush_guarantee() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());
    engine.create_collection("d").unwrap();

    for i in 0..8 {
        engine
            .ingest("c", &[Record::new(MARCH_1_2024 + i * 5 * HOUR, json!(i))])
            .unwrap();
        engine
            .ingest("d", &[Record::new(MARCH_1_2024 + i * 3 * HOUR, json!(-i))])
            .unwrap();

        for path in engine.cache().cached_paths() {
            let on_disk = read_segment(&path).unwrap().unwrap();
            let cached = engine.cache().get_or_load(&path).unwrap();
            assert_eq!(&on_disk, cached.as_ref(), "{:?} diverged", path);
        }
    }
}

#[test]
fn test_inverted_interval_rejected_without_side_effects() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());
    engine.ingest("c", &[Record::new(7, json!(7))]).unwrap();
    let before = engine.cache().stats();

    let err = engine.query("c", TimeRange::new(10, 5), Pagination::default()).unwrap_err();
    assert!(matches!(err, SanError::InvalidInput(_)));
    let err = engine.delete_range("c", TimeRange::new(10, 5)).unwrap_err();
    assert!(matches!(err, SanError::InvalidInput(_)));

    let after = engine.cache().stats();
    assert_eq!((before.entries, before.bytes), (after.entries, after.bytes));
    assert_eq!(engine.query("c", all(), Pagination::default()).unwrap().len(), 1);
}

#[test]
fn test_rejects_non_positive_timestamps() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());

    let err = engine
        .ingest("c", &[Record::new(5, json!(1)), Record::new(-1, json!(2))])
        .unwrap_err();
    assert!(matches!(err, SanError::InvalidInput(_)));
    assert!(engine.cache().is_empty());
    assert!(engine.query("c", all(), Pagination::default()).unwrap().is_empty());
}

#[test]
fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open(&temp_dir, manual_cache());
        engine
            .ingest("c", &[Record::new(MARCH_1_2024, json!({"v": 1}))])
            .unwrap();
    }

    let engine = StorageEngine::new(StorageConfig {
        data_dir: temp_dir.path().to_path_buf(),
        cache: manual_cache(),
    })
    .unwrap();
    let rows = engine.query("c", all(), Pagination::default()).unwrap();
    assert_eq!(rows, vec![Record::new(MARCH_1_2024, json!({"v": 1}))]);
    assert!(temp_dir.path().join("c/2024/61/1.san").exists());
}

#[test]
fn test_corrupt_segment_left_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir, manual_cache());
    let path = temp_dir.path().join("c/1970/1/1.san");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"broken").unwrap();

    let err = engine.query("c", all(), Pagination::default()).unwrap_err();
    assert!(err.is_corruption());
    let err = engine.delete_range("c", all()).unwrap_err();
    assert!(err.is_corruption());
    let err = engine.ingest("c", &[Record::new(10, json!(1))]).unwrap_err();
    assert!(err.is_corruption());

    assert_eq!(std::fs::read(&path).unwrap(), b"broken");
}
