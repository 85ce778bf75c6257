use std::io;
use std::path::{Path, PathBuf};

pub const MARKER_FILE_NAME: &str = "session_info.txt";

/// On-disk copy of the portal `JSESSIONID`, kept so a logout can still be
/// attempted when the live HTTP session is gone.
///
/// The file holds exactly the session id, nothing else.
#[derive(Debug, Clone)]
pub struct SessionMarker {
    path: PathBuf,
}

impl SessionMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(MARKER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, session_id: &str) -> io::Result<()> {
        crate::utils::atomic_write(&self.path, session_id.as_bytes())
    }

    /// Returns the stored id, or `None` when the file is missing or blank.
    pub fn read(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes the marker. Removing a marker that does not exist succeeds.
    pub fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Best-effort variants used by the session lifecycle: failures are
    /// logged, never propagated.
    pub(crate) fn store_logged(&self, session_id: &str) {
        match self.write(session_id) {
            Ok(()) => log::info!("Session id saved to {}.", self.path.display()),
            Err(e) => log::error!(
                "Could not save session id to {}: {}",
                self.path.display(),
                e
            ),
        }
    }

    pub(crate) fn load_logged(&self) -> Option<String> {
        self.read().unwrap_or_else(|e| {
            log::warn!("Could not read {}: {}", self.path.display(), e);
            None
        })
    }

    pub(crate) fn clear_logged(&self) {
        match self.remove() {
            Ok(()) => log::debug!("Session marker {} removed.", self.path.display()),
            Err(e) => log::warn!(
                "Could not remove session marker {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
