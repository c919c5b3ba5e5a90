use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};

/// Durable set of issue numbers the worker has already handled.
pub trait SeenStore: Send + Sync {
    fn load(&self) -> Result<HashSet<u64>>;
    fn save(&self, seen: &HashSet<u64>) -> Result<()>;
}

/// Stores the set as a JSON array of integers.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }
}

impl SeenStore for JsonFileStore {
    fn load(&self) -> Result<HashSet<u64>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };
        let numbers: Vec<u64> = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(numbers.into_iter().collect())
    }

    fn save(&self, seen: &HashSet<u64>) -> Result<()> {
        let mut numbers = seen.iter().copied().collect::<Vec<_>>();
        numbers.sort_unstable();
        let data = serde_json::to_vec(&numbers)?;
        // Write then rename, so a crash never leaves a truncated file behind
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Non-persistent store, for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    seen: Mutex<HashSet<u64>>,
}

impl MemoryStore {
    pub fn new(seen: impl IntoIterator<Item = u64>) -> Self {
        Self { seen: Mutex::new(seen.into_iter().collect()) }
    }

    pub fn snapshot(&self) -> HashSet<u64> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl SeenStore for MemoryStore {
    fn load(&self) -> Result<HashSet<u64>> { Ok(self.snapshot()) }

    fn save(&self, seen: &HashSet<u64>) -> Result<()> {
        let mut guard = self.seen.lock().map_err(|_| anyhow::anyhow!("Seen store poisoned"))?;
        *guard = seen.clone();
        Ok(())
    }
}

impl<T: SeenStore + ?Sized> SeenStore for Arc<T> {
    fn load(&self) -> Result<HashSet<u64>> { (**self).load() }

    fn save(&self, seen: &HashSet<u64>) -> Result<()> { (**self).save(seen) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("processed.json"));
        assert!(store.load().unwrap().is_empty());

        store.save(&HashSet::from([42, 7, 19])).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[7,19,42]");
        assert_eq!(store.load().unwrap(), HashSet::from([7, 19, 42]));
    }

    #[test]
    fn test_json_file_accepts_unordered_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        fs::write(&path, "[3, 1, 2, 3]").unwrap();
        assert_eq!(JsonFileStore::new(&path).load().unwrap(), HashSet::from([1, 2, 3]));
    }

    #[test]
    fn test_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        fs::write(&path, "{\"not\": \"a list\"}").unwrap();
        assert!(JsonFileStore::new(&path).load().is_err());
    }
}
