//! `TestHistoryIndex` persistence and rebuild-from-disk (§4.6, §8 property 8).

use crate::error::ArchiverError;
use crate::models::{TestHistoryEntry, TestHistoryIndex};
use std::path::Path;

pub fn load(history_path: &Path) -> Result<TestHistoryIndex, ArchiverError> {
    if !history_path.exists() {
        return Ok(TestHistoryIndex::default());
    }
    let contents = std::fs::read_to_string(history_path).map_err(|e| ArchiverError::HistoryIo(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| ArchiverError::HistoryIo(e.to_string()))
}

/// Write-temp-then-rename, matching the snapshot/verdict atomicity
/// protocol used elsewhere (§5).
pub fn save(history_path: &Path, index: &TestHistoryIndex) -> Result<(), ArchiverError> {
    let tmp = history_path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(index).map_err(|e| ArchiverError::HistoryIo(e.to_string()))?;
    std::fs::write(&tmp, json).map_err(|e| ArchiverError::HistoryIo(e.to_string()))?;
    std::fs::rename(&tmp, history_path).map_err(|e| ArchiverError::HistoryIo(e.to_string()))?;
    Ok(())
}

/// Rescans `archives_root` for `test_summary.json` files and rebuilds the
/// index from scratch, used after `--cleanup` deletes directories.
pub fn rebuild_from_disk(archives_root: &Path) -> Result<TestHistoryIndex, ArchiverError> {
    let mut entries = Vec::new();
    if archives_root.exists() {
        let mut dirs: Vec<_> = std::fs::read_dir(archives_root)
            .map_err(|e| ArchiverError::HistoryIo(e.to_string()))?
            .flatten()
            .filter(|e| e.path().is_dir())
            .collect();
        dirs.sort_by_key(|e| e.file_name());

        for dir in dirs {
            let summary_path = dir.path().join("test_summary.json");
            if !summary_path.exists() {
                continue;
            }
            let contents = std::fs::read_to_string(&summary_path).map_err(|e| ArchiverError::HistoryIo(e.to_string()))?;
            let summary: super::TestSummary = serde_json::from_str(&contents).map_err(|e| ArchiverError::HistoryIo(e.to_string()))?;
            entries.push(TestHistoryEntry {
                run_id: summary.run_id,
                mode: summary.mode,
                max_qps: summary.max_successful_qps,
                status: summary.status,
                archived_at: summary.end_time,
            });
        }
    }

    let total_tests = entries.len() as u64;
    let latest_run = entries.last().map(|e| e.run_id.clone());
    Ok(TestHistoryIndex { total_tests, latest_run, tests: entries })
}
