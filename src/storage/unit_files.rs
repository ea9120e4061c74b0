use crate::record::Record;
use crate::storage::atomic::{read_json, write_json_atomic, TMP_SUFFIX};
use crate::storage::layout::{TargetLayout, PARTIAL_SUFFIX, PROGRESS_FILE};
use crate::storage::StorageResult;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Per-unit record files under `temp/`
#[derive(Debug, Clone)]
pub struct UnitFileStore {
    layout: TargetLayout,
}

impl UnitFileStore {
    pub fn new(layout: TargetLayout) -> Self {
        Self { layout }
    }

    /// Writes the records of one finished unit
    pub fn write(&self, unit_id: &str, records: &[Record]) -> StorageResult<PathBuf> {
        self.layout.ensure_dirs()?;
        let path = self.layout.unit_file(unit_id);
        write_json_atomic(&path, records)?;
        Ok(path)
    }

    pub fn exists(&self, unit_id: &str) -> bool {
        self.layout.unit_file(unit_id).is_file()
    }

    /// All unit files, oldest modification time first, then by file name
    ///
    /// Bookkeeping files and in-flight temp files are excluded.
    pub fn list(&self) -> StorageResult<Vec<PathBuf>> {
        let dir = self.layout.temp_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !is_unit_file(&path) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            files.push((modified, path));
        }

        files.sort_by(|(ta, pa), (tb, pb)| ta.cmp(tb).then_with(|| pa.cmp(pb)));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    pub fn read(&self, path: &Path) -> StorageResult<Vec<Record>> {
        read_json(path)
    }
}

fn is_unit_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.ends_with(TMP_SUFFIX) || name == PROGRESS_FILE {
        return false;
    }
    match name.strip_suffix(".json") {
        Some(stem) => !stem.ends_with(PARTIAL_SUFFIX),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(name: &str) -> Record {
        Record::new().with("name", json!(name))
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let store = UnitFileStore::new(TargetLayout::new(dir.path(), "players", "players"));

        let path = store.write("team-1", &[record("A"), record("B")]).unwrap();
        assert!(store.exists("team-1"));

        let records = store.read(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get_str("name"), Some("B"));
    }

    #[test]
    fn test_empty_unit_file() {
        let dir = TempDir::new().unwrap();
        let store = UnitFileStore::new(TargetLayout::new(dir.path(), "players", "players"));

        let path = store.write("empty-team", &[]).unwrap();
        assert!(store.read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_list_excludes_bookkeeping_and_orders_by_mtime() {
        let dir = TempDir::new().unwrap();
        let layout = TargetLayout::new(dir.path(), "players", "players");
        let store = UnitFileStore::new(layout.clone());

        store.write("b", &[record("B")]).unwrap();
        store.write("a", &[record("A")]).unwrap();

        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(layout.unit_file("b"))
            .unwrap()
            .set_modified(old)
            .unwrap();

        std::fs::write(layout.progress_file(), "{}").unwrap();
        std::fs::write(layout.partial_file(), "[]").unwrap();
        std::fs::write(layout.temp_dir().join("c.json.tmp"), "[").unwrap();
        std::fs::write(layout.temp_dir().join("notes.txt"), "x").unwrap();

        let files = store.list().unwrap();
        assert_eq!(files, vec![layout.unit_file("b"), layout.unit_file("a")]);
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = UnitFileStore::new(TargetLayout::new(dir.path().join("nope"), "p", "p"));
        assert!(store.list().unwrap().is_empty());
    }
}
