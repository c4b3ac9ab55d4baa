//! Pluggable persistence for refresh tokens.
//!
//! A [`TokenManager`] is consulted by the authorizer around every refresh:
//! `pre_refresh` may supply the stored token, `post_refresh` persists a new
//! one when the server issues it. At most one manager can be bound per
//! session.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use rusqlite::Connection;

use crate::errors::RedditError;

use super::Authorizer;

/// Load/store hooks invoked by the authorizer around token refreshes.
pub trait TokenManager: Send + Sync {
    /// Called before new tokens are requested. May populate the authorizer's
    /// refresh token from storage.
    fn pre_refresh(&self, authorizer: &mut Authorizer) -> Result<(), RedditError>;

    /// Called after a successful refresh. May persist the (possibly new)
    /// refresh token.
    fn post_refresh(&self, authorizer: &Authorizer) -> Result<(), RedditError>;
}

/// Keeps the refresh token in a single file, one token per line.
pub struct FileTokenManager {
    path: PathBuf,
}

impl FileTokenManager {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn read_token(&self) -> Result<String, RedditError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            RedditError::Client(format!(
                "Failed to read token file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(contents.trim_end_matches('\n').to_string())
    }

    // Write to a sibling temp file, then rename over the original so a crash
    // mid-write never leaves a truncated token.
    fn write_token(&self, token: &str) -> Result<(), RedditError> {
        let tmp_path = self.path.with_extension("tmp");
        let mut file = File::create(&tmp_path).map_err(|e| {
            RedditError::Client(format!(
                "Failed to create token file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        file.write_all(token.as_bytes()).map_err(|e| {
            RedditError::Client(format!("Failed to write token file: {}", e))
        })?;
        file.sync_all().ok();
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            RedditError::Client(format!(
                "Failed to replace token file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!("Saved refresh token to {}", self.path.display());
        Ok(())
    }
}

impl TokenManager for FileTokenManager {
    fn pre_refresh(&self, authorizer: &mut Authorizer) -> Result<(), RedditError> {
        if authorizer.refresh_token().is_none() {
            let token = self.read_token()?;
            authorizer.set_refresh_token(Some(token));
        }
        Ok(())
    }

    fn post_refresh(&self, authorizer: &Authorizer) -> Result<(), RedditError> {
        match authorizer.refresh_token() {
            Some(token) => self.write_token(token),
            None => Ok(()),
        }
    }
}

/// Keeps refresh tokens in an SQLite database keyed by a caller-supplied
/// string, so several sessions can share one database.
pub struct SqliteTokenManager {
    connection: Mutex<Connection>,
    key: String,
}

impl SqliteTokenManager {
    pub fn new<P: AsRef<Path>>(database: P, key: &str) -> Result<Self, RedditError> {
        let connection = Connection::open(database.as_ref())
            .map_err(|e| RedditError::Client(format!("Failed to open token database: {}", e)))?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS tokens (key TEXT PRIMARY KEY, refresh_token TEXT NOT NULL)",
                [],
            )
            .map_err(|e| RedditError::Client(format!("Failed to initialise token table: {}", e)))?;
        Ok(Self {
            connection: Mutex::new(connection),
            key: key.to_string(),
        })
    }

    /// Insert the initial token for this manager's key. Fails if the key is
    /// already taken.
    pub fn register(&self, refresh_token: &str) -> Result<(), RedditError> {
        let connection = self.connection.lock().unwrap();
        let inserted = connection
            .execute(
                "INSERT OR IGNORE INTO tokens (key, refresh_token) VALUES (?1, ?2)",
                [self.key.as_str(), refresh_token],
            )
            .map_err(|e| RedditError::Client(format!("Failed to register token: {}", e)))?;
        if inserted == 0 {
            return Err(RedditError::Client(format!(
                "Token key '{}' is already registered",
                self.key
            )));
        }
        Ok(())
    }

    /// The current token for this manager's key, if any.
    pub fn get(&self) -> Result<Option<String>, RedditError> {
        let connection = self.connection.lock().unwrap();
        let mut statement = connection
            .prepare("SELECT refresh_token FROM tokens WHERE key = ?1")
            .map_err(|e| RedditError::Client(format!("Failed to query token: {}", e)))?;
        let mut rows = statement
            .query([self.key.as_str()])
            .map_err(|e| RedditError::Client(format!("Failed to query token: {}", e)))?;
        match rows
            .next()
            .map_err(|e| RedditError::Client(format!("Failed to read token row: {}", e)))?
        {
            Some(row) => {
                let token: String = row
                    .get(0)
                    .map_err(|e| RedditError::Client(format!("Failed to read token: {}", e)))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    fn put(&self, refresh_token: &str) -> Result<(), RedditError> {
        let connection = self.connection.lock().unwrap();
        connection
            .execute(
                "INSERT INTO tokens (key, refresh_token) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET refresh_token = excluded.refresh_token",
                [self.key.as_str(), refresh_token],
            )
            .map_err(|e| RedditError::Client(format!("Failed to store token: {}", e)))?;
        Ok(())
    }
}

impl TokenManager for SqliteTokenManager {
    fn pre_refresh(&self, authorizer: &mut Authorizer) -> Result<(), RedditError> {
        if authorizer.refresh_token().is_none() {
            match self.get()? {
                Some(token) => authorizer.set_refresh_token(Some(token)),
                None => {
                    return Err(RedditError::Client(format!(
                        "No token registered under key '{}'",
                        self.key
                    )))
                }
            }
        }
        Ok(())
    }

    fn post_refresh(&self, authorizer: &Authorizer) -> Result<(), RedditError> {
        match authorizer.refresh_token() {
            Some(token) => self.put(token),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_manager_round_trips_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.txt");
        fs::write(&path, "initial-token\n").unwrap();

        let manager = FileTokenManager::new(&path);
        assert_eq!(manager.read_token().unwrap(), "initial-token");

        manager.write_token("replacement-token").unwrap();
        assert_eq!(manager.read_token().unwrap(), "replacement-token");
        // The temp file must not linger after the rename.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn sqlite_manager_register_conflicts_on_taken_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tokens.db");

        let manager = SqliteTokenManager::new(&db, "bot1").unwrap();
        manager.register("first").unwrap();
        assert!(manager.register("second").is_err());
        assert_eq!(manager.get().unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn sqlite_managers_share_a_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tokens.db");

        let first = SqliteTokenManager::new(&db, "bot1").unwrap();
        let second = SqliteTokenManager::new(&db, "bot2").unwrap();
        first.register("token-one").unwrap();
        second.register("token-two").unwrap();

        assert_eq!(first.get().unwrap().as_deref(), Some("token-one"));
        assert_eq!(second.get().unwrap().as_deref(), Some("token-two"));

        first.put("token-one-rotated").unwrap();
        assert_eq!(first.get().unwrap().as_deref(), Some("token-one-rotated"));
        assert_eq!(second.get().unwrap().as_deref(), Some("token-two"));
    }
}
