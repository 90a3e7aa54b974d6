// src/ingest/checkpoint.rs
//! File-backed and in-memory checkpoint stores, plus the run lock that keeps
//! two invocations from interleaving their load/save cycles.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::ingest::error::ConfigurationFailure;
use crate::ingest::types::{Checkpoint, CheckpointStore};

pub const DEFAULT_CHECKPOINT_PATH: &str = "pagination_state.json";
pub const DEFAULT_LOCK_STALE: Duration = Duration::from_secs(6 * 3600);

/// JSON file at a fixed path, replaced atomically (write tmp, then rename).
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    lock_stale_after: Duration,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_stale_after: DEFAULT_LOCK_STALE,
        }
    }

    pub fn with_lock_stale_after(mut self, d: Duration) -> Self {
        self.lock_stale_after = d;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn io_err(&self, source: io::Error) -> ConfigurationFailure {
        ConfigurationFailure::CheckpointIo {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Checkpoint, ConfigurationFailure> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Checkpoint::default()),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&raw).map_err(|source| ConfigurationFailure::CorruptCheckpoint {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), ConfigurationFailure> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string(checkpoint).map_err(|source| {
            ConfigurationFailure::CorruptCheckpoint {
                path: self.path.clone(),
                source,
            }
        })?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let write = || -> io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.io_err(e)
        })
    }

    fn lock(&self) -> Result<RunLock, ConfigurationFailure> {
        RunLock::acquire(self.lock_path(), self.lock_stale_after)
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    // (current checkpoint, number of saves)
    state: Mutex<(Checkpoint, usize)>,
}

impl InMemoryCheckpointStore {
    pub fn new(initial: Checkpoint) -> Self {
        Self {
            state: Mutex::new((initial, 0)),
        }
    }

    pub fn current(&self) -> Checkpoint {
        self.state.lock().expect("checkpoint mutex poisoned").0.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().expect("checkpoint mutex poisoned").1
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Result<Checkpoint, ConfigurationFailure> {
        Ok(self.current())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), ConfigurationFailure> {
        let mut state = self.state.lock().expect("checkpoint mutex poisoned");
        state.0 = checkpoint.clone();
        state.1 += 1;
        Ok(())
    }
}

/// Lock file created exclusively and stamped with a per-guard token.
///
/// On drop the file is removed only while it still carries this guard's
/// token, so a guard whose lock was taken over as stale leaves the new
/// holder's file alone.
#[derive(Debug)]
pub struct RunLock {
    held: Option<(PathBuf, String)>,
}

impl RunLock {
    /// A guard that holds nothing (stores without cross-process state).
    pub fn noop() -> Self {
        Self { held: None }
    }

    pub fn acquire(path: PathBuf, stale_after: Duration) -> Result<Self, ConfigurationFailure> {
        let token = lock_token();
        match create_lock_file(&path, &token) {
            Ok(()) => return Ok(Self::holding(path, token)),
            Err(e) if e.kind() != io::ErrorKind::AlreadyExists => {
                return Err(ConfigurationFailure::CheckpointIo { path, source: e })
            }
            Err(_) => {}
        }

        let seen = match fs::read_to_string(&path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(ConfigurationFailure::CheckpointIo { path, source: e }),
        };
        if let Some(seen) = seen {
            if !lock_is_stale(&path, &seen, stale_after) {
                return Err(ConfigurationFailure::Locked(path));
            }
            warn!(
                target: "ingest",
                path = %path.display(),
                holder = seen.trim(),
                "replacing stale run lock"
            );
            if let Err(e) = remove_if_unchanged(&path, &seen) {
                return Err(ConfigurationFailure::CheckpointIo { path, source: e });
            }
        }

        match create_lock_file(&path, &token) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ConfigurationFailure::Locked(path))
            }
            Err(e) => return Err(ConfigurationFailure::CheckpointIo { path, source: e }),
        }
        // A concurrent takeover may have swapped the file between create and now.
        if !file_holds(&path, &token) {
            return Err(ConfigurationFailure::Locked(path));
        }
        Ok(Self::holding(path, token))
    }

    fn holding(path: PathBuf, token: String) -> Self {
        Self {
            held: Some((path, token)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.held.as_ref().map(|(p, _)| p.as_path())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some((path, token)) = self.held.take() {
            if let Err(e) = remove_if_unchanged(&path, &token) {
                warn!(target: "ingest", path = %path.display(), error = %e, "run lock not released");
            }
        }
    }
}

static LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

// "<pid> <unix secs> <nonce>\n"; the second field is what the stale check reads.
fn lock_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let seq = LOCK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{} {} {:08x}{:04x}\n",
        std::process::id(),
        now_unix(),
        nanos,
        seq & 0xffff
    )
}

fn create_lock_file(path: &Path, token: &str) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    f.write_all(token.as_bytes())
}

fn file_holds(path: &Path, contents: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|s| s == contents)
}

// Removes `path` only if it still reads back as `expected`. A missing file is fine.
fn remove_if_unchanged(path: &Path, expected: &str) -> io::Result<()> {
    if !file_holds(path, expected) {
        return Ok(());
    }
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// The lock records its creation time; fall back to mtime for hand-made files.
fn lock_is_stale(path: &Path, contents: &str, stale_after: Duration) -> bool {
    let created = contents
        .split_whitespace()
        .nth(1)
        .and_then(|ts| ts.parse::<u64>().ok())
        .or_else(|| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
        });
    match created {
        Some(ts) => now_unix().saturating_sub(ts) > stale_after.as_secs(),
        None => false,
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
