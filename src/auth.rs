//! Controller sign-in and the single-controller lease.
//!
//! Only one controller session is live at a time. Signing in again, from
//! anywhere, supersedes the previous token, so two consoles can never both
//! drive the timer. Sessions also lapse after the configured TTL.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{BoardError, BoardResult},
    settings::AdminAccount,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub token: String,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    accounts: Vec<AdminAccount>,
    ttl: Duration,
    active: Mutex<Option<AdminSession>>,
}

impl AuthService {
    pub fn new(accounts: Vec<AdminAccount>, ttl: Duration) -> Self {
        Self {
            accounts,
            ttl,
            active: Mutex::new(None),
        }
    }

    pub fn sign_in(&self, email: &str, password: &str) -> BoardResult<AdminSession> {
        let email = email.trim();
        let known = self
            .accounts
            .iter()
            .any(|account| account.email.eq_ignore_ascii_case(email) && account.password == password);
        if !known {
            warn!("Rejected sign-in for {email}");
            return Err(BoardError::Auth("invalid email or password".into()));
        }

        let issued_at = Utc::now();
        let session = AdminSession {
            token: Uuid::new_v4().to_string(),
            email: email.to_string(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        let mut active = self.active();
        if let Some(previous) = active.as_ref() {
            info!("Session for {} superseded by {}", previous.email, session.email);
        }
        *active = Some(session.clone());
        info!("Logged in as: {}", session.email);
        Ok(session)
    }

    /// Checks that `token` holds the lease right now.
    pub fn authorize(&self, token: &str) -> BoardResult<AdminSession> {
        let mut active = self.active();
        match active.as_ref() {
            Some(session) if session.token == token => {
                if Utc::now() < session.expires_at {
                    Ok(session.clone())
                } else {
                    info!("Session for {} expired", session.email);
                    *active = None;
                    Err(BoardError::Unauthorized)
                }
            }
            _ => Err(BoardError::Unauthorized),
        }
    }

    pub fn sign_out(&self, token: &str) -> bool {
        let mut active = self.active();
        if active.as_ref().is_some_and(|session| session.token == token) {
            *active = None;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<AdminSession> {
        self.active().clone()
    }

    fn active(&self) -> MutexGuard<'_, Option<AdminSession>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
