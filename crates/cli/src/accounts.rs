//! Account directory: the session/auth collaborator for the CLI.
//!
//! Usernames are unique per role; passwords are stored as salted SHA-256
//! hashes and verified in constant time. The reservation engine never sees
//! credentials; it only receives the `Session` produced by a successful
//! login.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use common::{Role, Username};
use constant_time_eq::constant_time_eq;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const SALT_LEN: usize = 16;

/// Errors from account creation and login.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The username is already registered under this role.
    #[error("username already taken: {0}")]
    UsernameTaken(Username),

    /// Unknown username or wrong password. Deliberately indistinct.
    #[error("invalid username or password")]
    InvalidCredentials,
}

#[derive(Clone)]
struct Account {
    salt: [u8; SALT_LEN],
    hash: [u8; 32],
}

/// In-memory account directory.
///
/// Patients and caregivers live in separate namespaces, matching the two
/// credential relations of the persistence layout.
#[derive(Clone, Default)]
pub struct AccountDirectory {
    accounts: Arc<RwLock<HashMap<(Role, String), Account>>>,
}

impl AccountDirectory {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account under the given role.
    pub fn create(
        &self,
        username: &Username,
        password: &str,
        role: Role,
    ) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().unwrap();
        let key = (role, username.as_str().to_string());
        if accounts.contains_key(&key) {
            return Err(AccountError::UsernameTaken(username.clone()));
        }

        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = hash_password(password, &salt);
        accounts.insert(key, Account { salt, hash });
        Ok(())
    }

    /// Checks a credential pair against the stored hash.
    pub fn verify(
        &self,
        username: &Username,
        password: &str,
        role: Role,
    ) -> Result<(), AccountError> {
        let accounts = self.accounts.read().unwrap();
        let account = accounts
            .get(&(role, username.as_str().to_string()))
            .ok_or(AccountError::InvalidCredentials)?;

        let candidate = hash_password(password, &account.salt);
        if constant_time_eq(&candidate, &account.hash) {
            Ok(())
        } else {
            Err(AccountError::InvalidCredentials)
        }
    }
}

fn hash_password(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_verify() {
        let directory = AccountDirectory::new();
        let pat = Username::new("pat");

        directory.create(&pat, "hunter2", Role::Patient).unwrap();
        directory.verify(&pat, "hunter2", Role::Patient).unwrap();
    }

    #[test]
    fn wrong_password_is_rejected() {
        let directory = AccountDirectory::new();
        let pat = Username::new("pat");
        directory.create(&pat, "hunter2", Role::Patient).unwrap();

        let result = directory.verify(&pat, "hunter3", Role::Patient);
        assert!(matches!(result, Err(AccountError::InvalidCredentials)));
    }

    #[test]
    fn unknown_username_is_rejected() {
        let directory = AccountDirectory::new();
        let result = directory.verify(&Username::new("ghost"), "pw", Role::Patient);
        assert!(matches!(result, Err(AccountError::InvalidCredentials)));
    }

    #[test]
    fn duplicate_username_within_a_role_is_rejected() {
        let directory = AccountDirectory::new();
        let pat = Username::new("pat");
        directory.create(&pat, "pw", Role::Patient).unwrap();

        let result = directory.create(&pat, "other", Role::Patient);
        assert!(matches!(result, Err(AccountError::UsernameTaken(_))));
    }

    #[test]
    fn roles_are_separate_namespaces() {
        let directory = AccountDirectory::new();
        let sam = Username::new("sam");

        directory.create(&sam, "patient-pw", Role::Patient).unwrap();
        directory
            .create(&sam, "caregiver-pw", Role::Caregiver)
            .unwrap();

        directory.verify(&sam, "patient-pw", Role::Patient).unwrap();
        directory
            .verify(&sam, "caregiver-pw", Role::Caregiver)
            .unwrap();
        assert!(directory.verify(&sam, "patient-pw", Role::Caregiver).is_err());
    }

    #[test]
    fn salts_differ_between_accounts() {
        let directory = AccountDirectory::new();
        directory
            .create(&Username::new("a"), "same-pw", Role::Patient)
            .unwrap();
        directory
            .create(&Username::new("b"), "same-pw", Role::Patient)
            .unwrap();

        let accounts = directory.accounts.read().unwrap();
        let a = &accounts[&(Role::Patient, "a".to_string())];
        let b = &accounts[&(Role::Patient, "b".to_string())];
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }
}
