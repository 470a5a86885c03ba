use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
#[cfg(feature = "web")]
use std::sync::{PoisonError, RwLock};

use crate::error::{DashboardError, Result};

/// The three kinds of dashboard user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Constable,
    Commissioner,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Constable, Role::Commissioner];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Constable => "constable",
            Role::Commissioner => "commissioner",
        })
    }
}

/// Dataset operations a role may be granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Dashboard metrics, distributions and the full data preview
    ReadAggregates,
    /// Commissioner data entry
    AppendRecord,
    /// Marking an incident as reported
    UpdateReported,
    /// Looking up the rows of a single KGID
    ViewByKgid,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::ReadAggregates,
        Operation::AppendRecord,
        Operation::UpdateReported,
        Operation::ViewByKgid,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::ReadAggregates => "read aggregates",
            Operation::AppendRecord => "append records",
            Operation::UpdateReported => "update the reported field",
            Operation::ViewByKgid => "view records by KGID",
        })
    }
}

/// Decide whether a role may perform an operation
///
/// The role table is fixed for the lifetime of the process:
///
/// | role         | read aggregates | append | update reported | view by KGID |
/// |--------------|-----------------|--------|-----------------|--------------|
/// | admin        | yes             | no     | no              | no           |
/// | commissioner | yes             | yes    | no              | no           |
/// | constable    | no              | no     | yes             | yes          |
///
/// # Examples
/// ```
/// use station_dashboard::login::{Operation, Role, authorize};
///
/// assert!(authorize(Role::Commissioner, Operation::AppendRecord));
/// assert!(!authorize(Role::Admin, Operation::AppendRecord));
/// ```
pub fn authorize(role: Role, operation: Operation) -> bool {
    use Operation::*;
    match role {
        Role::Admin => matches!(operation, ReadAggregates),
        Role::Commissioner => matches!(operation, ReadAggregates | AppendRecord),
        Role::Constable => matches!(operation, UpdateReported | ViewByKgid),
    }
}

/// Stored login for one user
///
/// Only the Argon2 hash of the password is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Role granted on successful login
    pub role: Role,
}

/// Credential data for login
///
/// Used to receive login form data from the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Username for login
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// Username to credential table consulted at login.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, Credential>,
}

impl CredentialStore {
    /// The three built-in station accounts.
    ///
    /// Passwords are hashed when the store is built; nothing is kept in
    /// plaintext after this returns.
    ///
    /// # Errors
    /// * Returns an error if hashing fails
    pub fn with_defaults() -> Result<Self> {
        let mut store = CredentialStore::default();
        store.add_user("admin", "admin123", Role::Admin)?;
        store.add_user("constable", "constable123", Role::Constable)?;
        store.add_user("commissioner", "commish123", Role::Commissioner)?;
        Ok(store)
    }

    /// Load credentials from a JSON users file
    ///
    /// The file maps each username to its password hash and role:
    ///
    /// ```json
    /// { "admin": { "password_hash": "$argon2id$...", "role": "admin" } }
    /// ```
    ///
    /// # Arguments
    /// * `path` - Path to the users file
    ///
    /// # Returns
    /// * `Result<CredentialStore>` - The loaded table
    ///
    /// # Errors
    /// * `DataUnavailable` if the file cannot be read or parsed, or if any
    ///   entry holds something other than an Argon2 hash
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            DashboardError::DataUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let users: HashMap<String, Credential> = serde_json::from_str(&contents)
            .map_err(|e| DashboardError::DataUnavailable(format!("invalid users file: {e}")))?;

        if let Some((name, _)) = users
            .iter()
            .find(|(_, c)| PasswordHash::new(&c.password_hash).is_err())
        {
            return Err(DashboardError::DataUnavailable(format!(
                "user {name} does not have a valid password hash"
            )));
        }

        log::info!("Loaded {} users from {}", users.len(), path.display());
        Ok(CredentialStore { users })
    }

    /// Registers or replaces a user, hashing `password`.
    pub fn add_user(&mut self, username: &str, password: &str, role: Role) -> Result<()> {
        let password_hash = hash_password(password)?;
        self.users.insert(
            username.to_string(),
            Credential {
                password_hash,
                role,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Verify user credentials
    ///
    /// Checks whether the provided username and password match a known user.
    ///
    /// # Arguments
    /// * `username` - Username to verify
    /// * `password` - Password to verify
    ///
    /// # Returns
    /// * `Result<Role>` - The user's role if the credentials are valid
    ///
    /// # Errors
    /// * `Auth("InvalidCredentials")` for an unknown user or a wrong password
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Role> {
        match self.users.get(username) {
            Some(credential) if verify_password(password, &credential.password_hash) => {
                log::info!("User {username} logged in as {}", credential.role);
                Ok(credential.role)
            }
            _ => {
                log::warn!("Rejected login for {username:?}");
                Err(DashboardError::invalid_credentials())
            }
        }
    }
}

/// Hash a password using Argon2
///
/// Creates a cryptographically secure hash of a password using Argon2id.
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String>` - The password hash in PHC string format
///
/// # Errors
/// * Returns an error if the password hashing fails
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DashboardError::Internal(format!("password hashing failed: {e}")))
}

/// Checks a plaintext password against a stored Argon2 hash. A malformed
/// hash never matches.
fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Login state of one client
///
/// Created empty, filled by a successful login, cleared by logout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Whether the client has logged in
    pub authenticated: bool,

    /// Role of the logged-in user
    pub role: Option<Role>,
}

impl Session {
    /// Authenticates against `credentials`. A failed attempt leaves the
    /// session exactly as it was.
    pub fn login(
        &mut self,
        credentials: &CredentialStore,
        username: &str,
        password: &str,
    ) -> Result<Role> {
        let role = credentials.authenticate(username, password)?;
        self.authenticated = true;
        self.role = Some(role);
        Ok(role)
    }

    pub fn logout(&mut self) {
        *self = Session::default();
    }

    /// The session's role if it may perform `operation`.
    ///
    /// # Errors
    /// * `Auth` when nobody is logged in
    /// * `Forbidden` when the role lacks the permission
    pub fn require(&self, operation: Operation) -> Result<Role> {
        let role = match (self.authenticated, self.role) {
            (true, Some(role)) => role,
            _ => return Err(DashboardError::Auth("NotLoggedIn")),
        };
        if authorize(role, operation) {
            Ok(role)
        } else {
            Err(DashboardError::Forbidden {
                role: role.to_string(),
                operation: operation.to_string(),
            })
        }
    }
}

/// Active client sessions keyed by cookie value
///
/// Owned by the web app state; entries exist only between login and logout.
#[cfg(feature = "web")]
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

#[cfg(feature = "web")]
impl SessionRegistry {
    /// Stores `session` under a fresh random id and returns the id.
    pub fn create(&self, session: Session) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), session);
        session_id
    }

    /// The session for `session_id`, or an empty one if it is unknown.
    pub fn get(&self, session_id: &str) -> Session {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}
