use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use reshelve_core::analysis::{compare, count_files, verify_library};
use reshelve_core::media::ExtensionSets;
use reshelve_core::{AppConfig, CapacityManager, Layout, RebalanceStats, SilentReporter};

fn fill_day(folder: &Path, count: usize) {
    fs::create_dir_all(folder).unwrap();
    for i in 0..count {
        fs::write(folder.join(format!("2025-05-31_{:03}.jpg", i)), format!("{}", i)).unwrap();
    }
}

fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_splits_120_files_into_three_folders() {
    let tmp = tempdir().unwrap();
    let month = tmp.path().join("2020+/2025/2025-05");
    let day = month.join("2025-05-31");
    fill_day(&day, 120);

    let stats = CapacityManager::new(50).rebalance(&day).unwrap();

    assert_eq!(stats, RebalanceStats { splits_created: 3, files_moved: 120 });
    assert!(!day.exists(), "emptied folder is removed");
    assert_eq!(sorted_names(&month), vec!["2025-05-31_01", "2025-05-31_02", "2025-05-31_03"]);

    let first = sorted_names(&month.join("2025-05-31_01"));
    let second = sorted_names(&month.join("2025-05-31_02"));
    let third = sorted_names(&month.join("2025-05-31_03"));
    assert_eq!((first.len(), second.len(), third.len()), (50, 50, 20));
    assert_eq!(first.first().unwrap(), "2025-05-31_000.jpg");
    assert_eq!(first.last().unwrap(), "2025-05-31_049.jpg");
    assert_eq!(second.first().unwrap(), "2025-05-31_050.jpg");
    assert_eq!(third.last().unwrap(), "2025-05-31_119.jpg");
}

#[test]
fn test_rebalancing_twice_changes_nothing() {
    let tmp = tempdir().unwrap();
    fill_day(&tmp.path().join("2020+/2025/2025-05/2025-05-31"), 120);
    fill_day(&tmp.path().join("2020+/2025/2025-05/2025-05-30"), 10);

    let manager = CapacityManager::new(50);
    let first = manager.rebalance_tree(tmp.path(), &SilentReporter).unwrap();
    assert!(first.is_success());
    assert_eq!(first.totals.splits_created, 3);

    let snapshot = tempdir().unwrap();
    let before = compare(tmp.path(), snapshot.path()).unwrap();

    let second = manager.rebalance_tree(tmp.path(), &SilentReporter).unwrap();
    assert_eq!(second.totals, RebalanceStats::default());
    assert!(second.rebalanced.is_empty());

    let after = compare(tmp.path(), snapshot.path()).unwrap();
    assert_eq!(before.files, after.files);
    assert_eq!(before.directories, after.directories);
}

#[test]
fn test_rebalanced_tree_verifies_clean() {
    let tmp = tempdir().unwrap();
    fill_day(&tmp.path().join("2020+/2025/2025-05/2025-05-31"), 75);
    let sets = ExtensionSets::from_config(&AppConfig::default());

    let before = verify_library(tmp.path(), Layout::Full, &sets, 50).unwrap();
    assert_eq!(before.oversized.len(), 1);

    CapacityManager::new(50)
        .with_sidecars(&sets)
        .rebalance_tree(tmp.path(), &SilentReporter)
        .unwrap();

    let after = verify_library(tmp.path(), Layout::Full, &sets, 50).unwrap();
    assert!(after.is_clean(), "{:?}", after);
    assert_eq!(after.media_files, 75);
    assert_eq!(count_files(tmp.path()).unwrap(), 75);
}

#[test]
fn test_sidecar_units_never_split() {
    let tmp = tempdir().unwrap();
    let day = tmp.path().join("2021-01-01");
    fs::create_dir_all(&day).unwrap();
    for i in 0..4 {
        fs::write(day.join(format!("2021-01-01_{}.jpg", i)), "j").unwrap();
        fs::write(day.join(format!("2021-01-01_{}.jpg.xmp", i)), "x").unwrap();
    }
    let sets = ExtensionSets::from_config(&AppConfig::default());

    // 8 files, 3 per folder: each pair must stay together, so 2 + 2 + 2 + 2
    let stats = CapacityManager::new(3)
        .with_sidecars(&sets)
        .rebalance(&day)
        .unwrap();
    assert_eq!(stats.splits_created, 4);
    for i in 1..=4 {
        let chunk: PathBuf = tmp.path().join(format!("2021-01-01_{:02}", i));
        let names = sorted_names(&chunk);
        assert_eq!(names.len(), 2);
        assert_eq!(format!("{}.xmp", names[0]), names[1]);
    }
}
