//! Local account registry.
//!
//! Accounts live in the same substrate as user records: a JSON array under
//! [`USERS_KEY`], the signed-in account under [`SESSION_KEY`] and pending
//! password resets under [`RESET_TOKENS_KEY`]. This is a convenience for
//! choosing whose data to load on a shared machine, not an access-control
//! mechanism; anyone with the substrate can read everything.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::new_entry_id;
use crate::substrate::KeyValueStore;

/// Key holding the array of registered accounts.
pub const USERS_KEY: &str = "users";

/// Key holding the signed-in account.
pub const SESSION_KEY: &str = "user_data";

/// Key holding the array of outstanding password reset tokens.
pub const RESET_TOKENS_KEY: &str = "reset_tokens";

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// How long a reset token stays valid.
const RESET_TOKEN_TTL_MINUTES: i64 = 30;

const PASSWORD_CONTEXT: &str = "dashvault 2025-06 local account password";

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account id; also the user id for data records.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email, stored lowercase.
    pub email: String,
    /// Hex digest of the password.
    pub password_hash: String,
    /// When the account was registered.
    pub created_at: DateTime<Utc>,
    /// Last successful sign-in.
    pub last_login_at: DateTime<Utc>,
    /// When the password was last reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_password_change: Option<DateTime<Utc>>,
}

/// A password reset token issued for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetToken {
    /// Email of the account the token resets.
    pub email: String,
    /// The token itself.
    pub token: String,
    /// The token is rejected from this instant on.
    pub expires_at: DateTime<Utc>,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
}

impl ResetToken {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Registry of accounts over a substrate.
#[derive(Debug, Clone)]
pub struct Accounts {
    substrate: Arc<dyn KeyValueStore>,
}

impl Accounts {
    /// Create a registry over `substrate`.
    #[must_use]
    pub fn new(substrate: Arc<dyn KeyValueStore>) -> Self {
        Self { substrate }
    }

    /// Every registered account.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or is corrupt.
    pub fn list(&self) -> Result<Vec<Account>> {
        match self.substrate.read(USERS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::invalid_record(format!("account registry is corrupt: {e}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Register a new account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountExists`] if the email is taken, an invalid
    /// record error for blank fields, [`Error::PasswordTooShort`], or a
    /// storage error.
    pub fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Account> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(Error::invalid_record(
                "name, email and password are all required",
            ));
        }
        check_password(password)?;

        let mut accounts = self.list()?;
        if accounts.iter().any(|a| a.email == email) {
            return Err(Error::AccountExists { email });
        }

        let now = Utc::now();
        let mut id = now.timestamp_millis();
        while accounts.iter().any(|a| a.id == id.to_string()) {
            id += 1;
        }

        let account = Account {
            id: id.to_string(),
            name: name.to_string(),
            password_hash: hash_password(&email, password),
            email,
            created_at: now,
            last_login_at: now,
            last_password_change: None,
        };
        accounts.push(account.clone());

        self.save_registry(&accounts)?;
        self.save_session(&account)?;
        info!(user_id = %account.id, "Registered account");
        Ok(account)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredentials`] when no account matches, or a
    /// storage error.
    pub fn login(&self, email: &str, password: &str) -> Result<Account> {
        let email = normalize_email(email);
        let hash = hash_password(&email, password);

        let mut accounts = self.list()?;
        let account = accounts
            .iter_mut()
            .find(|a| a.email == email && a.password_hash == hash)
            .ok_or(Error::InvalidCredentials)?;
        account.last_login_at = Utc::now();
        let account = account.clone();

        self.save_registry(&accounts)?;
        self.save_session(&account)?;
        info!(user_id = %account.id, "Signed in");
        Ok(account)
    }

    /// Sign out. Signing out while signed out is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be removed.
    pub fn logout(&self) -> Result<()> {
        self.substrate.delete(SESSION_KEY)
    }

    /// The signed-in account, if any.
    ///
    /// A session that cannot be parsed is removed and treated as signed out.
    #[must_use]
    pub fn current_user(&self) -> Option<Account> {
        let raw = match self.substrate.read(SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read session");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(error = %e, "Discarding corrupt session");
                if let Err(e) = self.substrate.delete(SESSION_KEY) {
                    warn!(error = %e, "Failed to remove corrupt session");
                }
                None
            }
        }
    }

    /// Issue a reset token for the account registered under `email`.
    ///
    /// The token is valid for 30 minutes. Expired tokens are dropped from
    /// the store while it is rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no account uses this email, or a
    /// storage error.
    pub fn request_password_reset(&self, email: &str) -> Result<ResetToken> {
        self.issue_reset_token(email, Utc::now())
    }

    /// Set a new password using a token from
    /// [`request_password_reset`](Self::request_password_reset).
    ///
    /// The token is consumed. The session is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordTooShort`], [`Error::InvalidResetToken`] for
    /// an unknown, used or expired token, [`Error::EntryNotFound`] if the
    /// account has since disappeared, or a storage error.
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<Account> {
        self.reset_password_at(token, new_password, Utc::now())
    }

    fn issue_reset_token(&self, email: &str, now: DateTime<Utc>) -> Result<ResetToken> {
        let email = normalize_email(email);
        if !self.list()?.iter().any(|a| a.email == email) {
            return Err(Error::not_found("account", email));
        }

        let issued = ResetToken {
            email,
            token: new_entry_id(),
            expires_at: now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
            created_at: now,
        };

        let mut tokens = self.reset_tokens();
        tokens.retain(|t| t.is_live(now));
        tokens.push(issued.clone());
        self.save_reset_tokens(&tokens)?;

        info!(email = %issued.email, "Issued password reset token");
        Ok(issued)
    }

    fn reset_password_at(
        &self,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        check_password(new_password)?;

        let mut tokens = self.reset_tokens();
        let email = tokens
            .iter()
            .find(|t| t.token == token && t.is_live(now))
            .map(|t| t.email.clone())
            .ok_or(Error::InvalidResetToken)?;

        let mut accounts = self.list()?;
        let account = accounts
            .iter_mut()
            .find(|a| a.email == email)
            .ok_or_else(|| Error::not_found("account", email.as_str()))?;
        account.password_hash = hash_password(&email, new_password);
        account.last_password_change = Some(now);
        let account = account.clone();
        self.save_registry(&accounts)?;

        tokens.retain(|t| t.token != token && t.is_live(now));
        self.save_reset_tokens(&tokens)?;

        info!(user_id = %account.id, "Password reset");
        Ok(account)
    }

    /// Outstanding reset tokens. An unreadable store counts as empty.
    fn reset_tokens(&self) -> Vec<ResetToken> {
        let raw = match self.substrate.read(RESET_TOKENS_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read reset tokens");
                None
            }
        };
        raw.and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|e| warn!(error = %e, "Discarding corrupt reset tokens"))
                .ok()
        })
        .unwrap_or_default()
    }

    fn save_reset_tokens(&self, tokens: &[ResetToken]) -> Result<()> {
        self.substrate
            .write(RESET_TOKENS_KEY, &serde_json::to_string(tokens)?)
    }

    fn save_registry(&self, accounts: &[Account]) -> Result<()> {
        self.substrate
            .write(USERS_KEY, &serde_json::to_string(accounts)?)
    }

    fn save_session(&self, account: &Account) -> Result<()> {
        self.substrate
            .write(SESSION_KEY, &serde_json::to_string(account)?)
    }
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(email: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(PASSWORD_CONTEXT);
    hasher.update(email.as_bytes());
    hasher.update(&[0]);
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}
