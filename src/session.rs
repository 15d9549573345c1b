//! Session flows: register, login, refresh, logout and self.
//!
//! Handlers in `api::auth` do the HTTP shaping (status codes and cookies);
//! everything that touches credentials, tokens or refresh records happens
//! here.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::RefreshSession;
use crate::db::{Database, NewUser, RefreshTokenRecord, User, UserProfile, UserRole};
use crate::error::AuthError;
use crate::jwt::{AccessTokenInput, AccessTokenResult, RefreshTokenResult, TokenIssuer};
use crate::password;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 100;

/// Account fields supplied at registration or by an admin.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl NewAccount {
    /// Trim and check every field. The first problem found is reported.
    pub fn validate(self) -> Result<Self, AuthError> {
        let email = validate_email(&self.email)?;
        let first_name = validate_name(&self.first_name, "First name is required")?;
        let last_name = validate_name(&self.last_name, "Last name is required")?;
        if self.password.is_empty() {
            return Err(AuthError::invalid_input("Password is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::invalid_input(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(Self {
            first_name,
            last_name,
            email,
            password: self.password,
        })
    }
}

pub fn validate_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::invalid_input("Email is required"));
    }
    let valid = email.len() <= MAX_EMAIL_LENGTH
        && !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if !valid {
        return Err(AuthError::invalid_input("Please provide a valid email"));
    }
    Ok(email.to_string())
}

fn validate_name(name: &str, missing: &str) -> Result<String, AuthError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::invalid_input(missing));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::invalid_input(format!(
            "Names must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

/// Tokens handed to a client after register, login or refresh.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: i64,
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
}

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    issuer: Arc<TokenIssuer>,
}

impl SessionService {
    pub fn new(db: Database, issuer: Arc<TokenIssuer>) -> Self {
        Self { db, issuer }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Self-registration: always a customer without a tenant.
    pub async fn register(&self, account: NewAccount) -> Result<IssuedSession, AuthError> {
        let user_id = self.create_user(account, UserRole::Customer, None).await?;
        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Registered user disappeared".into()))?;

        let session = self.start_session(&user).await?;
        info!(user_id, "User registered");
        Ok(session)
    }

    /// Create a user with an explicit role and tenant. Issues no tokens.
    pub async fn create_user(
        &self,
        account: NewAccount,
        role: UserRole,
        tenant_id: Option<i64>,
    ) -> Result<i64, AuthError> {
        let account = account.validate()?;

        if self.db.users().is_email_taken(&account.email).await? {
            return Err(AuthError::invalid_input("Email is already registered"));
        }
        if let Some(tenant_id) = tenant_id {
            if self.db.tenants().get(tenant_id).await?.is_none() {
                return Err(AuthError::invalid_input("Tenant does not exist"));
            }
        }

        let password_hash = password::hash_password_blocking(account.password).await?;

        let new_user = NewUser {
            first_name: account.first_name,
            last_name: account.last_name,
            email: account.email,
            password_hash,
            role,
            tenant_id,
        };
        match self.db.users().create(&new_user).await {
            Ok(id) => Ok(id),
            // Lost a race with a concurrent registration for the same email.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AuthError::invalid_input("Email is already registered"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::invalid_input("Password is required"));
        }

        let Some(user) = self.db.users().get_by_email(&email).await? else {
            password::verify_dummy_blocking(password.to_string()).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let matches =
            password::verify_password_blocking(password.to_string(), user.password_hash.clone())
                .await?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.start_session(&user).await?;
        info!(user_id = user.id, "User logged in");
        Ok(session)
    }

    /// Rotate a refresh token.
    ///
    /// The new record is created and the tokens are minted before the old
    /// record is deleted. If the old record turns out to be gone already, the
    /// same refresh token was used concurrently: all of the user's records
    /// are revoked and the request fails. A store error while deleting the
    /// old record leaves it for the expiry cleanup.
    pub async fn refresh(&self, session: &RefreshSession) -> Result<IssuedSession, AuthError> {
        let store = self.db.refresh_tokens();

        let record = store
            .get(session.record_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if record.user_id != session.user_id {
            warn!(
                record_id = record.id,
                token_user = session.user_id,
                "Refresh record belongs to another user"
            );
            return Err(AuthError::Unauthenticated);
        }

        self.rotate(&record).await
    }

    /// Replace `record` with a fresh one for the same user.
    async fn rotate(&self, record: &RefreshTokenRecord) -> Result<IssuedSession, AuthError> {
        let store = self.db.refresh_tokens();

        // Reload so role and tenant changes take effect.
        let user = self
            .db
            .users()
            .get_by_id(record.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let issued = self.start_session(&user).await?;

        match store.revoke(record.id).await {
            Ok(true) => {}
            Ok(false) => {
                // Two requests raced on one refresh token.
                warn!(record_id = record.id, user_id = user.id, "Refresh token reused during rotation");
                if let Err(e) = store.delete_all_for_user(user.id).await {
                    error!(error = %e, user_id = user.id, "Failed to revoke sessions after refresh token reuse");
                }
                return Err(AuthError::Unauthenticated);
            }
            Err(e) => {
                warn!(error = %e, record_id = record.id, "Failed to delete old refresh record, leaving it for cleanup");
            }
        }

        Ok(issued)
    }

    /// Revoke the referenced record. Succeeds even if it is already gone.
    pub async fn logout(&self, session: &RefreshSession) -> Result<(), AuthError> {
        let removed = self.db.refresh_tokens().revoke(session.record_id).await?;
        info!(
            user_id = session.user_id,
            record_removed = removed,
            "User logged out"
        );
        Ok(())
    }

    /// The caller's profile. A deleted account is treated as unauthenticated.
    pub async fn profile(&self, user_id: i64) -> Result<UserProfile, AuthError> {
        self.db
            .users()
            .get_by_id(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::Unauthenticated)
    }

    /// Persist a refresh record and mint both tokens for it. The record is
    /// removed again if minting fails.
    async fn start_session(&self, user: &User) -> Result<IssuedSession, AuthError> {
        let store = self.db.refresh_tokens();
        let record = store.persist(user.id).await?;

        match self.issue(user, record.id) {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(revoke_err) = store.revoke(record.id).await {
                    error!(error = %revoke_err, record_id = record.id, "Failed to drop unused refresh record");
                }
                Err(e)
            }
        }
    }

    fn issue(&self, user: &User, record_id: i64) -> Result<IssuedSession, AuthError> {
        let input = AccessTokenInput {
            user_id: user.id,
            role: user.role,
            tenant_id: user.tenant_id,
        };
        let access = self.issuer.issue_access_token(&input)?;
        let refresh = self.issuer.issue_refresh_token(&input.into(), record_id)?;
        Ok(IssuedSession {
            user_id: user.id,
            access,
            refresh,
        })
    }
}
