//! Default item persistence: one JSON document per item.
//!
//! Layout is `<source dir>/<timestamp_ns>-<frame_id>.json`, each file holding
//! a [`RecordedItem`]. Loading sorts by timestamp, so file names only have to
//! be unique, not ordered.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use contracts::{ContractError, DataItem, ItemRecorder, Payload, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EXTENSION: &str = "json";

/// On-disk form of a `DataItem`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedItem {
    pub timestamp_ns: u64,
    pub duration_ns: u64,
    pub payload: Payload,
}

impl From<&DataItem> for RecordedItem {
    fn from(item: &DataItem) -> Self {
        Self {
            timestamp_ns: item.timestamp_ns(),
            duration_ns: item.duration_ns(),
            payload: item.payload().clone(),
        }
    }
}

impl From<RecordedItem> for DataItem {
    fn from(recorded: RecordedItem) -> Self {
        DataItem::new(recorded.timestamp_ns, recorded.duration_ns, recorded.payload)
    }
}

/// JSON-per-item recorder used by devices without their own format
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRecorder;

impl JsonRecorder {
    pub fn file_name_for(item: &DataItem) -> String {
        format!("{}-{}.{EXTENSION}", item.timestamp_ns(), item.frame_id())
    }
}

impl ItemRecorder for JsonRecorder {
    fn save(&self, item: &DataItem, dir: &Path) -> Result<String> {
        let file_name = Self::file_name_for(item);
        let path = dir.join(&file_name);

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &RecordedItem::from(item)).map_err(|e| {
            ContractError::persist_failure(path.display().to_string(), e.to_string())
        })?;
        writer.flush()?;

        Ok(file_name)
    }

    fn load(&self, dir: &Path) -> Result<Vec<DataItem>> {
        let entries = fs::read_dir(dir)
            .map_err(|e| ContractError::corrupt(dir.display().to_string(), e.to_string()))?;

        let mut recorded = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }

            let reader = BufReader::new(File::open(&path)?);
            let item: RecordedItem = serde_json::from_reader(reader)
                .map_err(|e| ContractError::corrupt(path.display().to_string(), e.to_string()))?;
            if item.timestamp_ns == 0 {
                return Err(ContractError::corrupt(
                    path.display().to_string(),
                    "recorded item has no timestamp",
                ));
            }
            recorded.push(item);
        }

        recorded.sort_by_key(|item| item.timestamp_ns);
        debug!(dir = %dir.display(), items = recorded.len(), "loaded recorded items");

        Ok(recorded.into_iter().map(DataItem::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TrackingData;

    #[test]
    fn test_save_then_load_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonRecorder;

        for ts in [3_000u64, 1_000, 2_000] {
            let item = DataItem::new(
                ts,
                500,
                Payload::Tracking(TrackingData::identity(&["pointer"])),
            );
            let name = recorder.save(&item, dir.path()).unwrap();
            assert!(name.starts_with(&ts.to_string()));
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = recorder.load(dir.path()).unwrap();
        let timestamps: Vec<u64> = loaded.iter().map(|i| i.timestamp_ns()).collect();
        assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);
        assert_eq!(loaded[0].duration_ns(), 500);
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1-0.json"), "{ not json").unwrap();

        let err = JsonRecorder.load(dir.path()).unwrap_err();
        assert!(matches!(err, ContractError::Corrupt { .. }));
    }

    #[test]
    fn test_load_missing_dir_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonRecorder.load(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ContractError::Corrupt { .. }));
    }
}
