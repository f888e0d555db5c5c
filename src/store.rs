//! Durable safe-volume mapping with change-suppressed whole-file saves.
//!
//! The store is a flat JSON object of executable name to fractional volume.
//! Ticks run sub-second, so `save` compares against the last snapshot that
//! reached disk and skips the write when nothing changed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Learned safe volume per application, keyed by executable name.
pub type SafeVolumes = BTreeMap<String, f32>;

/// Owns durability for the safe-volume record. Policy decisions (what goes
/// into the record) stay with the enforcement engine.
#[derive(Debug)]
pub struct SafeVolumeStore {
    path: PathBuf,
    volumes: SafeVolumes,
    last_saved: Option<SafeVolumes>,
}

impl SafeVolumeStore {
    /// Load the record from `path`. A missing, unreadable, or corrupt file is
    /// "no prior knowledge" and yields an empty record, never an error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let volumes = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SafeVolumes>(&raw) {
                Ok(volumes) => {
                    info!(
                        "loaded {} safe volume(s) from {}",
                        volumes.len(),
                        path.display()
                    );
                    volumes
                }
                Err(err) => {
                    warn!(
                        "ignoring unreadable safe-volume file {}: {err}",
                        path.display()
                    );
                    SafeVolumes::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("no safe-volume file at {}; starting fresh", path.display());
                SafeVolumes::new()
            }
            Err(err) => {
                warn!("cannot read safe-volume file {}: {err}", path.display());
                SafeVolumes::new()
            }
        };
        let last_saved = Some(volumes.clone());
        Self {
            path,
            volumes,
            last_saved,
        }
    }

    pub fn get(&self, app: &str) -> Option<f32> {
        self.volumes.get(app).copied()
    }

    pub fn set(&mut self, app: &str, volume: f32) {
        self.volumes.insert(app.to_string(), volume);
    }

    pub fn volumes(&self) -> &SafeVolumes {
        &self.volumes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the record wholesale. Without `force`, the write is skipped
    /// when the record equals the last snapshot that reached disk.
    ///
    /// Returns whether a physical write happened. The snapshot is updated
    /// only after the replacement file is in place, so a failed save is
    /// retried on the next dirty tick.
    pub fn save(&mut self, force: bool) -> io::Result<bool> {
        if !force && self.last_saved.as_ref() == Some(&self.volumes) {
            return Ok(false);
        }

        let json = serde_json::to_string(&self.volumes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Whole-file replace via a sibling temp file, so a crash mid-write
        // cannot leave a truncated record behind.
        let staged = self.path.with_extension("tmp");
        fs::write(&staged, json)?;
        fs::rename(&staged, &self.path)?;

        self.last_saved = Some(self.volumes.clone());
        info!(
            "saved {} safe volume(s) to {}",
            self.volumes.len(),
            self.path.display()
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("volguard-store-{label}-{nanos}.json"))
    }

    #[test]
    fn missing_file_starts_fresh() {
        let store = SafeVolumeStore::load(temp_path("missing"));
        assert!(store.volumes().is_empty());
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json at all").expect("write");
        let store = SafeVolumeStore::load(&path);
        assert!(store.volumes().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn saved_record_round_trips() {
        let path = temp_path("roundtrip");
        {
            let mut store = SafeVolumeStore::load(&path);
            store.set("game.exe", 0.03);
            store.set("player.exe", 0.55);
            assert!(store.save(false).expect("save"));
        }

        let reloaded = SafeVolumeStore::load(&path);
        assert_eq!(reloaded.get("game.exe"), Some(0.03));
        assert_eq!(reloaded.get("player.exe"), Some(0.55));
        assert_eq!(reloaded.volumes().len(), 2);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unchanged_record_skips_the_second_write() {
        let path = temp_path("suppress");
        let mut store = SafeVolumeStore::load(&path);
        store.set("game.exe", 0.03);
        assert!(store.save(false).expect("first save"));
        assert!(!store.save(false).expect("second save"));

        // Deleting the file proves no further write happens behind our back.
        fs::remove_file(&path).expect("remove");
        assert!(!store.save(false).expect("third save"));
        assert!(!path.exists());
    }

    #[test]
    fn force_save_writes_even_when_unchanged() {
        let path = temp_path("force");
        let mut store = SafeVolumeStore::load(&path);
        store.set("game.exe", 0.03);
        assert!(store.save(false).expect("save"));
        assert!(store.save(true).expect("forced save"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn fresh_load_without_mutation_saves_nothing() {
        let path = temp_path("fresh-noop");
        {
            let mut store = SafeVolumeStore::load(&path);
            store.set("game.exe", 0.03);
            store.save(false).expect("save");
        }
        let mut reloaded = SafeVolumeStore::load(&path);
        assert!(!reloaded.save(false).expect("save after plain reload"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_leaves_no_temp_residue() {
        let path = temp_path("residue");
        let mut store = SafeVolumeStore::load(&path);
        store.set("game.exe", 0.02);
        store.save(false).expect("save");
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("volguard-store-nested-{nanos}"));
        let path = dir.join("state").join("safe_volumes.json");
        let mut store = SafeVolumeStore::load(&path);
        store.set("game.exe", 0.01);
        store.save(false).expect("save into nested dir");
        assert!(path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
