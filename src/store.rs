use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::loader::{FileFormat, load_dataset};
use crate::record::{Column, IncidentRecord};
use crate::saving::save_dataset;

/// File-backed incident table shared by every request.
///
/// Reads are served from a cached snapshot. Writes are serialized by a
/// single-writer lock: the change is applied to a copy, the copy is written
/// to disk, and only then does the cache move forward. Another process
/// writing the same file is not coordinated with; the last write wins.
pub struct Store {
    path: PathBuf,
    snapshot: RwLock<Option<Arc<Dataset>>>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl Store {
    /// Creates a store for `path` without touching the file yet.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        FileFormat::from_path(&path)?;
        Ok(Store {
            path,
            snapshot: RwLock::new(None),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// Creates a store and writes `dataset` as the initial file contents.
    pub fn create(path: impl Into<PathBuf>, dataset: Dataset) -> Result<Self> {
        let store = Store::new(path)?;
        save_dataset(&dataset, &store.path)?;
        store.replace_snapshot(Arc::new(dataset));
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of successful writes made through this store.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns the cached dataset, reading the file on first use.
    pub fn load(&self) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            log::debug!("Serving cached dataset ({} rows)", dataset.len());
            return Ok(Arc::clone(dataset));
        }
        self.reload()
    }

    /// Drops the cache and reads the file again.
    ///
    /// A read that overlaps a write through this store is returned but not
    /// cached, so the newer snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<Dataset>> {
        let generation = self.generation();
        let dataset = Arc::new(load_dataset(&self.path)?);
        Ok(self.install_if_current(generation, dataset))
    }

    /// Forgets the cached snapshot so the next `load` goes to disk.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Appends one record, persists, and returns its row index together with
    /// the refreshed dataset.
    pub fn append(&self, record: IncidentRecord) -> Result<(usize, Arc<Dataset>)> {
        self.mutate(|data| data.append(record))
    }

    /// Row indices matching both keys; see [`Dataset::find`].
    pub fn find(&self, kgid: &str, case_number: &str) -> Result<Vec<usize>> {
        Ok(self.load()?.find(kgid, case_number))
    }

    /// Sets `column` on the listed rows and persists. An empty row list fails
    /// with `NotFound` before anything is written.
    pub fn update_field(&self, rows: &[usize], column: Column, value: &str) -> Result<Arc<Dataset>> {
        let ((), dataset) = self.mutate(|data| data.update_field(rows, column, value))?;
        Ok(dataset)
    }

    /// Stamps `Reported` on every row matching both keys.
    ///
    /// The lookup and the write happen under the same writer lock. Returns the
    /// stamped row indices; when nothing matches, nothing is written.
    pub fn mark_reported(&self, kgid: &str, case_number: &str, reported: &str) -> Result<Vec<usize>> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.load()?;
        let rows = current.find(kgid, case_number);
        if rows.is_empty() {
            return Ok(rows);
        }

        let mut working = (*current).clone();
        working.update_field(&rows, Column::Reported, reported)?;
        self.commit(working)?;
        Ok(rows)
    }

    /// Writes `dataset` as the full file contents and makes it the cached
    /// snapshot.
    pub fn persist(&self, dataset: &Dataset) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.commit(dataset.clone())?;
        Ok(())
    }

    fn mutate<T>(&self, change: impl FnOnce(&mut Dataset) -> Result<T>) -> Result<(T, Arc<Dataset>)> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut working = (*self.load()?).clone();
        let value = change(&mut working)?;
        let dataset = self.commit(working)?;
        Ok((value, dataset))
    }

    /// Caller must hold the writer lock.
    fn commit(&self, dataset: Dataset) -> Result<Arc<Dataset>> {
        save_dataset(&dataset, &self.path)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Dataset generation is now {generation}");

        let dataset = Arc::new(dataset);
        self.replace_snapshot(Arc::clone(&dataset));
        Ok(dataset)
    }

    fn install_if_current(&self, generation: u64, dataset: Arc<Dataset>) -> Arc<Dataset> {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation() == generation {
            *snapshot = Some(Arc::clone(&dataset));
            return dataset;
        }
        log::debug!("Discarding a read that overlapped a write");
        match snapshot.as_ref() {
            Some(newer) => Arc::clone(newer),
            None => dataset,
        }
    }

    fn replace_snapshot(&self, dataset: Arc<Dataset>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(dataset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;

    fn record(kgid: &str, case_number: &str) -> IncidentRecord {
        IncidentRecord {
            city: "Pune".to_string(),
            response_time_rating: 7,
            cases: 5,
            security_type: "Patrol".to_string(),
            station_dashboard_score: 3,
            case_number: case_number.to_string(),
            kgid: kgid.to_string(),
            report_time: "2024-01-02 10:00:00".to_string(),
            reported: String::new(),
        }
    }

    fn store_with(records: Vec<IncidentRecord>) -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(dir.path().join("dataset.csv"), Dataset::new(records)).unwrap();
        (dir, store)
    }

    #[test]
    fn append_persists_and_refreshes_the_cache() {
        let (_dir, store) = store_with(vec![record("K1", "C1")]);
        let before = store.generation();

        let (index, data) = store.append(record("K2", "C2")).unwrap();
        assert_eq!(index, 1);
        assert_eq!(data.len(), 2);
        assert_eq!(store.generation(), before + 1);

        let fresh = Store::new(store.path()).unwrap();
        assert_eq!(fresh.load().unwrap().len(), 2);
    }

    #[test]
    fn update_with_no_rows_never_writes() {
        let (_dir, store) = store_with(vec![record("K1", "C1")]);
        let before = store.generation();
        let contents = std::fs::read(store.path()).unwrap();

        let err = store
            .update_field(&[], Column::Reported, "2024-01-05 10:00:00")
            .unwrap_err();

        assert!(matches!(err, DashboardError::NotFound(_)));
        assert_eq!(store.generation(), before);
        assert_eq!(std::fs::read(store.path()).unwrap(), contents);
    }

    #[test]
    fn failed_write_leaves_cached_dataset_untouched() {
        let (dir, store) = store_with(vec![record("K1", "C1")]);
        store.load().unwrap();
        dir.close().unwrap();

        assert!(store.append(record("K2", "C2")).is_err());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn reload_sees_external_changes() {
        let (_dir, store) = store_with(vec![record("K1", "C1")]);
        assert_eq!(store.load().unwrap().len(), 1);

        save_dataset(
            &Dataset::new(vec![record("K1", "C1"), record("K3", "C3")]),
            store.path(),
        )
        .unwrap();

        assert_eq!(store.load().unwrap().len(), 1, "cached snapshot");
        assert_eq!(store.find("K3", "C3").unwrap(), Vec::<usize>::new());
        store.invalidate();
        assert_eq!(store.find("K3", "C3").unwrap(), vec![1]);
        assert_eq!(store.reload().unwrap().len(), 2);
    }

    #[test]
    fn persist_rewrites_file_and_replaces_the_snapshot() {
        let (_dir, store) = store_with(vec![record("K1", "C1")]);
        store.load().unwrap();
        let before = store.generation();

        let replacement = Dataset::new(vec![record("K5", "C5"), record("K6", "C6")]);
        store.persist(&replacement).unwrap();

        assert_eq!(store.generation(), before + 1);
        assert_eq!(*store.load().unwrap(), replacement);
        assert_eq!(load_dataset(store.path()).unwrap(), replacement);
    }

    #[test]
    fn stale_read_does_not_replace_a_newer_snapshot() {
        let (_dir, store) = store_with(vec![record("K1", "C1")]);
        let generation = store.generation();
        let stale = Arc::new(load_dataset(store.path()).unwrap());

        store.append(record("K2", "C2")).unwrap();
        let kept = store.install_if_current(generation, stale);

        assert_eq!(kept.len(), 2);
        assert_eq!(store.load().unwrap().len(), 2);

        // Writes after the stale read keep building on the newer rows
        store.append(record("K3", "C3")).unwrap();
        assert_eq!(load_dataset(store.path()).unwrap().len(), 3);
    }

    #[test]
    fn mark_reported_stamps_matches_only() {
        let (_dir, store) = store_with(vec![
            record("K1", "C1"),
            record("K1", "C2"),
            record("K1", "C1"),
        ]);

        let rows = store
            .mark_reported("K1", "C1", "2024-01-05 10:00:00")
            .unwrap();

        assert_eq!(rows, vec![0, 2]);
        let on_disk = load_dataset(store.path()).unwrap();
        let stamped: Vec<&str> = on_disk.records().iter().map(|r| r.reported.as_str()).collect();
        assert_eq!(stamped, vec!["2024-01-05 10:00:00", "", "2024-01-05 10:00:00"]);
    }

    #[test]
    fn mark_reported_without_match_never_writes() {
        let (_dir, store) = store_with(vec![record("K1", "C1")]);
        let before = store.generation();

        let rows = store
            .mark_reported("K1", "C9", "2024-01-05 10:00:00")
            .unwrap();

        assert!(rows.is_empty());
        assert_eq!(store.generation(), before);
    }

    #[test]
    fn unsupported_path_is_rejected() {
        assert!(Store::new("dataset.txt").is_err());
    }
}
