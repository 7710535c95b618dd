use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_PREFIX: &str = "authcache";

/// Secure OS-level credential storage via the platform keychain.
///
/// Passwords are keyed by (base URL, username) so the same account name
/// against different backends stores independently.
pub struct CredentialStore;

impl CredentialStore {
    fn service(base_url: &str) -> String {
        format!("{}:{}", SERVICE_PREFIX, base_url)
    }

    /// Store a password in the OS keychain
    pub fn store(base_url: &str, username: &str, password: &str) -> Result<()> {
        let entry = Entry::new(&Self::service(base_url), username)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve the password for a username from the OS keychain
    pub fn get_password(base_url: &str, username: &str) -> Result<String> {
        let entry = Entry::new(&Self::service(base_url), username)
            .context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete stored credentials for a username
    pub fn delete(base_url: &str, username: &str) -> Result<()> {
        let entry = Entry::new(&Self::service(base_url), username)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    /// Check if credentials exist for a username
    pub fn has_credentials(base_url: &str, username: &str) -> bool {
        if let Ok(entry) = Entry::new(&Self::service(base_url), username) {
            entry.get_password().is_ok()
        } else {
            false
        }
    }
}
