use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use fd_lock::{RwLock, RwLockWriteGuard};
use once_cell::sync::Lazy;
use std::env;
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CancelInner {
    flag: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

/// Shared cancellation flag set by the signal handler and observed by the
/// session lifecycle at every suspension point.
///
/// [`CancellationToken::wait`] blocks on a channel rather than sleeping, so a
/// `cancel()` from another thread interrupts the wait immediately.
#[derive(Clone)]
pub struct CancellationToken(Arc<CancelInner>);

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self(Arc::new(CancelInner {
            flag: AtomicBool::new(false),
            wake_tx,
            wake_rx,
        }))
    }

    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        // A full channel already holds a pending wake-up.
        let _ = self.0.wake_tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    /// Waits up to `duration`. Returns `true` if cancellation was requested
    /// before or during the wait. A duration too long to represent as a
    /// deadline waits for cancellation only.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return true;
            }
            let woken = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    self.0.wake_rx.recv_timeout(remaining)
                }
                None => self
                    .0
                    .wake_rx
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match woken {
                // Re-check the flag; a stale wake-up must not end the wait early.
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => return self.is_cancelled(),
                Err(RecvTimeoutError::Disconnected) => return self.is_cancelled(),
            }
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// Stores the write guard to keep the lock held for the process lifetime.
static INSTANCE_LOCK: Lazy<Mutex<Option<RwLockWriteGuard<'static, File>>>> =
    Lazy::new(|| Mutex::new(None));

/// Ensures that only one instance of the application is running, so two
/// processes never race on the same session marker.
/// Returns an error if another instance is already active.
pub fn ensure_single_instance(data_dir: &Path) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(data_dir)?;
    let lock_path = data_dir.join("kykwifi.lock");

    let file = File::create(&lock_path)?;
    // Leak the RwLock to get a 'static reference so the guard can outlive this function.
    let lock_ref: &'static mut RwLock<File> = Box::leak(Box::new(RwLock::new(file)));

    match lock_ref.try_write() {
        Ok(guard) => {
            let mut slot = INSTANCE_LOCK
                .lock()
                .map_err(|_| "instance lock state poisoned")?;
            *slot = Some(guard);
            Ok(())
        }
        Err(_) => Err("Another instance of kykwifi is already running.".into()),
    }
}

/// Platform-relative path from the home directory to the kykwifi data directory.
#[cfg(target_os = "linux")]
const DATA_SUBPATH: &str = ".local/share/kykwifi";

#[cfg(target_os = "macos")]
const DATA_SUBPATH: &str = "Library/Application Support/kykwifi";

#[cfg(target_os = "windows")]
const DATA_SUBPATH: &str = "AppData/Roaming/kykwifi";

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DATA_SUBPATH: &str = ".kykwifi";

/// Returns a platform-appropriate data directory for the session marker,
/// stored credentials and the log file.
///
/// - **Linux:** `~/.local/share/kykwifi`
/// - **macOS:** `~/Library/Application Support/kykwifi`
/// - **Windows:** `%USERPROFILE%\AppData\Roaming\kykwifi`
///
/// Creates the directory if it does not already exist.
pub fn get_data_dir() -> Result<PathBuf, Box<dyn Error>> {
    let home_dir = env::var("HOME").or_else(|_| env::var("USERPROFILE"))?;
    let data_dir = PathBuf::from(&home_dir).join(DATA_SUBPATH);

    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        log::info!("Data directory created at: {:?}", data_dir);
    }

    Ok(data_dir)
}

/// Writes `data` to a sibling temp file, syncs it and renames it over `path`,
/// so readers see either the old content or the new one, never a torn write.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)
}

/// Last `n` characters of an opaque token, for debug logs.
pub fn tail(value: &str, n: usize) -> &str {
    let start = value
        .char_indices()
        .rev()
        .nth(n.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    &value[start..]
}
