//! Credential Store
//!
//! Owns user records and their Argon2id password hashes. Verification is a
//! pure primitive; session and token issuance build on [`CredentialStore::authenticate`].

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use shared::Role;
use shared::error::{AppError, AppResult, ErrorCode};

use crate::db::repository::{RepoError, UserAccount, UserRepository};
use crate::utils::SharedClock;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB (`m_cost`)
    pub memory_kib: u32,
    /// Iterations (`t_cost`)
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
        }
    }
}

impl HashCost {
    /// `PASSWORD_HASH_COST` / `PASSWORD_HASH_ITERATIONS`, falling back to defaults
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            memory_kib: std::env::var("PASSWORD_HASH_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.memory_kib),
            iterations: std::env::var("PASSWORD_HASH_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.iterations),
        }
    }

    /// Cheapest parameters Argon2 accepts; for tests only
    pub const fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
        }
    }
}

/// Hash a password with a fresh random salt
pub fn hash_password(plaintext: &str, cost: HashCost) -> AppResult<String> {
    let params = Params::new(cost.memory_kib, cost.iterations, 1, None)
        .map_err(|e| AppError::hashing(format!("Invalid hash parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::hashing(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash string
///
/// Never fails: a malformed hash or a mismatch both yield `false`. The
/// parameters are read from the hash itself.
pub fn verify_password(hash: &str, plaintext: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Why an authentication attempt was rejected
///
/// Kept apart from [`AppError`] so the audit trail can record the reason
/// while callers only ever see "invalid username or password".
#[derive(Debug)]
pub enum LoginFailure {
    UnknownUser,
    WrongPassword(UserAccount),
    Disabled(UserAccount),
    Storage(AppError),
}

impl LoginFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            LoginFailure::UnknownUser => "user_not_found",
            LoginFailure::WrongPassword(_) => "invalid_password",
            LoginFailure::Disabled(_) => "account_disabled",
            LoginFailure::Storage(_) => "storage_error",
        }
    }
}

impl From<LoginFailure> for AppError {
    fn from(failure: LoginFailure) -> Self {
        match failure {
            LoginFailure::UnknownUser | LoginFailure::WrongPassword(_) => {
                AppError::invalid_credentials()
            }
            LoginFailure::Disabled(_) => AppError::account_disabled(),
            LoginFailure::Storage(err) => err,
        }
    }
}

/// Input for [`CredentialStore::create_user`]
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Clone, Debug)]
pub struct CredentialStore {
    users: UserRepository,
    cost: HashCost,
    clock: SharedClock,
}

impl CredentialStore {
    pub fn new(users: UserRepository, cost: HashCost, clock: SharedClock) -> Self {
        Self { users, cost, clock }
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn hash_password(&self, plaintext: &str) -> AppResult<String> {
        hash_password(plaintext, self.cost)
    }

    pub fn verify_password(&self, hash: &str, plaintext: &str) -> bool {
        verify_password(hash, plaintext)
    }

    /// Create a user; a taken username is `UserAlreadyExists`
    pub async fn create_user(&self, new_user: NewUser) -> AppResult<UserAccount> {
        let username = new_user.username.trim();
        validate_username(username)?;
        if new_user.password.is_empty() {
            return Err(AppError::with_message(
                ErrorCode::RequiredField,
                "Password must not be empty",
            ));
        }

        let password_hash = self.hash_password(&new_user.password)?;
        let now = self.clock.now_millis();

        match self
            .users
            .create(username, &password_hash, new_user.role, now)
            .await
        {
            Ok(user) => Ok(user),
            Err(RepoError::Duplicate(_)) => Err(duplicate_user(username)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<UserAccount>> {
        Ok(self.users.find_by_username(username.trim()).await?)
    }

    /// Look up the user by name, or fail with `UserNotFound`
    pub async fn require_user(&self, username: &str) -> AppResult<UserAccount> {
        self.find_by_username(username).await?.ok_or_else(|| {
            AppError::with_message(
                ErrorCode::UserNotFound,
                format!("User '{}' not found", username.trim()),
            )
            .with_detail("username", username.trim())
        })
    }

    pub async fn update_last_login(&self, user_id: i64, timestamp: i64) -> AppResult<()> {
        Ok(self.users.update_last_login(user_id, timestamp).await?)
    }

    /// Verify a username/password pair
    ///
    /// The password is checked before the active flag, so a disabled account
    /// is only reported to someone who knows its password.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserAccount, LoginFailure> {
        let user = self
            .users
            .find_by_username(username.trim())
            .await
            .map_err(|e| LoginFailure::Storage(e.into()))?
            .ok_or(LoginFailure::UnknownUser)?;

        if !verify_password(&user.password_hash, password) {
            return Err(LoginFailure::WrongPassword(user));
        }
        if !user.is_active {
            return Err(LoginFailure::Disabled(user));
        }
        Ok(user)
    }
}

fn validate_username(username: &str) -> AppResult<()> {
    if username.is_empty() {
        return Err(AppError::with_message(
            ErrorCode::RequiredField,
            "Username must not be empty",
        ));
    }
    if username.len() > 64 || username.chars().any(char::is_whitespace) {
        return Err(AppError::validation(
            "Username must be at most 64 characters without whitespace",
        )
        .with_detail("username", username));
    }
    Ok(())
}

fn duplicate_user(username: &str) -> AppError {
    AppError::with_message(
        ErrorCode::UserAlreadyExists,
        format!("User '{username}' already exists"),
    )
    .with_detail("username", username)
}
