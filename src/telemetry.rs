//! Logging bootstrap: one plain line per notable event, appended to a file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing::Level;

/// Initialize the global subscriber. Events append to `path` when given and
/// openable; otherwise they go to stderr so nothing is silently dropped.
pub fn init_logging(path: Option<&Path>, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    if let Some(path) = path {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .try_init()
                    .map_err(|err| anyhow!("logging init failed: {err}"))?;
                return Ok(());
            }
            Err(err) => {
                eprintln!(
                    "volguard: cannot open log file {}: {err}; logging to stderr",
                    path.display()
                );
            }
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| anyhow!("logging init failed: {err}"))?;
    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("volguard-telemetry-{label}-{nanos}"))
    }

    #[test]
    fn log_file_opens_in_append_mode() {
        let dir = temp_dir("append");
        let path = dir.join("volguard.log");
        {
            let mut file = open_log_file(&path).expect("first open");
            writeln!(file, "first line").expect("write");
        }
        {
            let mut file = open_log_file(&path).expect("second open");
            writeln!(file, "second line").expect("write");
        }

        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("first line"));
        assert!(contents.contains("second line"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn log_file_parent_directories_are_created() {
        let dir = temp_dir("nested");
        let path = dir.join("logs").join("volguard.log");
        let _ = open_log_file(&path).expect("open with missing parents");
        assert!(path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
