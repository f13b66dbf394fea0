//! Keyring integration for secure API key storage
//! Falls back to file storage if keyring is unavailable

use anyhow::{Result, Context};
use std::path::{Path, PathBuf};
use std::fs;

const SERVICE_NAME: &str = "agent-workflows";
const API_KEY_USERNAME: &str = "llm-api-key";
const API_KEY_FILE: &str = "api_key.txt";

/// Environment variable consulted before the keyring
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Get the path for the fallback API key file
fn api_key_file_path() -> Result<PathBuf> {
    let dir = crate::config::config_path()?
        .parent()
        .context("Config path has no parent")?
        .to_path_buf();
    fs::create_dir_all(&dir).context("Failed to create config directory")?;
    Ok(dir.join(API_KEY_FILE))
}

/// Set API key - tries keyring first, falls back to file
pub fn set_api_key(key: &str) -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if entry.set_password(key).is_ok() {
            return Ok(());
        }
    }

    save_to_file(key)?;
    tracing::warn!("Keyring unavailable, API key stored in {}", api_key_file_path()?.display());
    Ok(())
}

fn save_to_file(key: &str) -> Result<()> {
    let path = api_key_file_path()?;
    fs::write(&path, key).context("Failed to write API key file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }

    Ok(())
}

/// Get API key from the named environment variable, the keyring or the fallback file
pub fn get_api_key_with_env(env_var: &str) -> Result<String> {
    if let Ok(key) = std::env::var(env_var) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if let Ok(key) = entry.get_password() {
            return Ok(key);
        }
    }

    let path = api_key_file_path()?;
    let key = fs::read_to_string(&path)
        .with_context(|| format!(
            "No API key found. Set {} or run 'agent-workflows config --set-api-key YOUR_KEY'.",
            env_var
        ))?;
    Ok(key.trim().to_string())
}

/// Delete API key from both keyring and file
pub fn delete_api_key() -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        let _ = entry.delete_credential();
    }

    if remove_key_file(&api_key_file_path()?)? {
        tracing::info!("Removed fallback API key file");
    }
    Ok(())
}

/// Remove the fallback key file; returns whether one existed
fn remove_key_file(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)
        .with_context(|| format!("Failed to delete API key file {}", path.display()))?;
    Ok(true)
}
