use anyhow::{bail, Context};
use std::fmt;
use std::path::{Path, PathBuf};

pub const USERNAME_VAR: &str = "KYK_USERNAME";
pub const PASSWORD_VAR: &str = "KYK_PASSWORD";

/// Portal login: the username is the national id number.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> anyhow::Result<Self> {
        let username = username.into().trim().to_string();
        let password = password.into().trim().to_string();
        if username.is_empty() {
            bail!("username must not be empty");
        }
        if password.is_empty() {
            bail!("password must not be empty");
        }
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Durable home of the operator's credentials.
///
/// `load` returning `Ok(None)` means nothing usable is stored and the caller
/// should ask interactively.
pub trait CredentialStore {
    fn load(&self) -> anyhow::Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> anyhow::Result<()>;
}

/// `.env`-style file holding `KYK_USERNAME` / `KYK_PASSWORD`.
///
/// Process environment variables of the same names win over the file.
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
    use_process_env: bool,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_process_env: true,
        }
    }

    /// Ignore `KYK_USERNAME` / `KYK_PASSWORD` in the process environment.
    pub fn file_only(mut self) -> Self {
        self.use_process_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> anyhow::Result<(Option<String>, Option<String>)> {
        if !self.path.exists() {
            return Ok((None, None));
        }
        let mut username = None;
        let mut password = None;
        let iter = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        for item in iter {
            let (key, value) =
                item.with_context(|| format!("malformed line in {}", self.path.display()))?;
            match key.as_str() {
                USERNAME_VAR => username = Some(value),
                PASSWORD_VAR => password = Some(value),
                _ => {}
            }
        }
        Ok((username, password))
    }
}

impl CredentialStore for EnvFileStore {
    fn load(&self) -> anyhow::Result<Option<Credentials>> {
        let (mut username, mut password) = self.read_file()?;
        if self.use_process_env {
            if let Ok(value) = std::env::var(USERNAME_VAR) {
                username = Some(value);
            }
            if let Ok(value) = std::env::var(PASSWORD_VAR) {
                password = Some(value);
            }
        }

        match (username, password) {
            (Some(u), Some(p)) => match Credentials::new(u, p) {
                Ok(creds) => {
                    log::info!("Credentials loaded from {}.", self.path.display());
                    Ok(Some(creds))
                }
                Err(e) => {
                    log::warn!("Stored credentials ignored: {}", e);
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }

    fn save(&self, credentials: &Credentials) -> anyhow::Result<()> {
        let content = format!(
            "{}={}\n{}={}\n",
            USERNAME_VAR,
            quote(credentials.username()),
            PASSWORD_VAR,
            quote(credentials.password())
        );
        crate::utils::atomic_write(&self.path, content.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        log::info!("Credentials saved to {}.", self.path.display());
        Ok(())
    }
}

/// Quotes a value so characters like `#`, `$` or spaces survive a reload.
fn quote(value: &str) -> String {
    if value.contains('\'') {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{}\"", escaped)
    } else {
        format!("'{}'", value)
    }
}
