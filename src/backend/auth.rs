use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuthGateway, Session};
use crate::error::AuthError;
use crate::state::forms::{is_valid_email, MIN_PASSWORD_LEN};

/// Auth gateway backed by a local SQLite `users` table.
/// Passwords are stored as argon2 PHC strings, never in clear.
pub struct LocalAuthGateway {
    conn: Arc<Mutex<Connection>>,
    session: watch::Sender<Option<Session>>,
}

impl LocalAuthGateway {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                uid             TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            )",
            [],
        )?;

        let (session, _) = watch::channel(None);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            session,
        })
    }

    fn publish(&self, session: Option<Session>) {
        // send_replace stores the value even when nobody is listening yet
        self.session.send_replace(session);
    }
}

#[async_trait]
impl AuthGateway for LocalAuthGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let conn = Arc::clone(&self.conn);
        let password = password.to_string();
        let session = tokio::task::spawn_blocking(move || {
            let row: Option<(String, String)> = {
                let conn = lock(&conn)?;
                conn.query_row(
                    "SELECT uid, password_hash FROM users WHERE email = ?1",
                    [&email],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| AuthError::Backend(e.to_string()))?
            };

            match row {
                Some((uid, hash)) if verify_password(&password, &hash) => {
                    Ok(Session { uid, email })
                }
                _ => Err(AuthError::WrongCredentials),
            }
        })
        .await
        .map_err(|e| AuthError::Backend(format!("Task join error: {}", e)))??;

        info!("Signed in as {}", session.email);
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let conn = Arc::clone(&self.conn);
        let password = password.to_string();
        let session = tokio::task::spawn_blocking(move || {
            // Hashing is CPU-bound, keep it off the async workers
            let hash = hash_password(&password)?;
            let uid = Uuid::new_v4().to_string();

            let conn = lock(&conn)?;
            let result = conn.execute(
                "INSERT INTO users (uid, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![&uid, &email, &hash, Utc::now().timestamp()],
            );

            match result {
                Ok(_) => Ok(Session { uid, email }),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(AuthError::EmailInUse)
                }
                Err(e) => Err(AuthError::Backend(e.to_string())),
            }
        })
        .await
        .map_err(|e| AuthError::Backend(format!("Task join error: {}", e)))??;

        info!("Registered with: {}", session.email);
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.current_session() {
            info!("Signed out {}", session.email);
        }
        self.publish(None);
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, AuthError> {
    conn.lock()
        .map_err(|_| AuthError::Backend("user database lock poisoned".to_string()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    // 16 random bytes from a v4 UUID
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AuthError::Backend(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Backend(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_up_creates_session() {
        let auth = LocalAuthGateway::open_in_memory().unwrap();

        let session = auth.sign_up("user@test.com", "secret1").await.unwrap();

        assert_eq!(session.email, "user@test.com");
        assert!(!session.uid.is_empty());
        assert_eq!(auth.current_session(), Some(session));
    }

    #[tokio::test]
    async fn test_short_password_is_rejected() {
        let auth = LocalAuthGateway::open_in_memory().unwrap();

        let result = auth.sign_up("user@test.com", "abc").await;

        assert_eq!(result, Err(AuthError::WeakPassword));
        assert!(auth.current_session().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let auth = LocalAuthGateway::open_in_memory().unwrap();
        auth.sign_up("user@test.com", "secret1").await.unwrap();

        let result = auth.sign_up("USER@test.com ", "secret2").await;

        assert_eq!(result, Err(AuthError::EmailInUse));
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let auth = LocalAuthGateway::open_in_memory().unwrap();
        let created = auth.sign_up("user@test.com", "secret1").await.unwrap();
        auth.sign_out().await.unwrap();

        assert_eq!(
            auth.sign_in("user@test.com", "wrong-pass").await,
            Err(AuthError::WrongCredentials)
        );
        assert_eq!(
            auth.sign_in("nobody@test.com", "secret1").await,
            Err(AuthError::WrongCredentials)
        );
        assert_eq!(
            auth.sign_in("not-an-email", "secret1").await,
            Err(AuthError::InvalidEmail)
        );

        let session = auth.sign_in("user@test.com", "secret1").await.unwrap();
        assert_eq!(session.uid, created.uid);
    }

    #[tokio::test]
    async fn test_session_changes_are_observable() {
        let auth = LocalAuthGateway::open_in_memory().unwrap();
        let mut changes = auth.on_session_change();
        assert!(changes.borrow().is_none());

        auth.sign_up("user@test.com", "secret1").await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(
            changes.borrow().as_ref().map(|s| s.email.clone()),
            Some("user@test.com".to_string())
        );

        auth.sign_out().await.unwrap();
        changes.changed().await.unwrap();
        assert!(changes.borrow().is_none());
        assert!(auth.current_session().is_none());
    }
}
