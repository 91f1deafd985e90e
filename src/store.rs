use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token::{TokenPair, UserIdentity};

/// Errors that can occur reading or writing the credential store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Error that occurs when the session file cannot be read or written.
    #[error("unable to access session storage: `{0}`")]
    Io(String),
    /// Error that occurs when the persisted session cannot be decoded.
    #[error("corrupt session storage: `{0}`")]
    Corrupt(String),
    /// Error that occurs when the in-memory store lock is poisoned.
    #[error("acquiring session store lock")]
    Poisoned,
}

/// A persisted session: the credential pair plus the identity it belongs to.
///
/// The two halves always travel together. There is no constructor that takes
/// one without the other, which keeps partial sessions unrepresentable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredSession {
    #[serde(flatten)]
    tokens: TokenPair,
    user: UserIdentity,
    saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(tokens: TokenPair, user: UserIdentity) -> Self {
        Self {
            tokens,
            user,
            saved_at: Utc::now(),
        }
    }

    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenPair {
        &mut self.tokens
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }
}

/// Durable holder for the current session.
///
/// The store is a dumb holder: it never inspects token expiry. Whether a
/// credential is still good is decided by the server through 401 responses.
pub trait CredentialStore {
    fn get(&self) -> Result<Option<StoredSession>, StoreError>;
    fn set(&self, session: &StoredSession) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// A credential store backed by a single JSON file.
///
/// The file holds the `access_token`, `refresh_token` and `user` entries in
/// one document so they are always written and cleared together. A missing
/// file simply means no session.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<StoredSession>, StoreError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };

        let session =
            serde_json::from_str(&data).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(session))
    }

    fn set(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))?;
        }

        let data = serde_json::to_string_pretty(session)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        let mut open_options = fs::OpenOptions::new();
        open_options.create(true).truncate(true).write(true);

        // The file holds live credentials.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open_options.mode(0o600);
        }

        use std::io::Write;
        let mut file = open_options
            .open(&self.path)
            .map_err(|err| StoreError::Io(err.to_string()))?;
        file.write_all(data.as_bytes())
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err.to_string())),
        }
    }
}

/// A non-persistent credential store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    session: Mutex<Option<StoredSession>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self) -> Result<Option<StoredSession>, StoreError> {
        let session = self.session.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(session.clone())
    }

    fn set(&self, session: &StoredSession) -> Result<(), StoreError> {
        let mut slot = self.session.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut slot = self.session.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}
