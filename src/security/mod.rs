//! Security module
//!
//! Credential storage for the LLM provider key (OS keyring with file fallback).

pub mod keyring;

use anyhow::Result;

/// Set API key in secure keyring
pub fn set_api_key(key: &str) -> Result<()> {
    keyring::set_api_key(key)
}

/// Delete API key from keyring
pub fn delete_api_key() -> Result<()> {
    keyring::delete_api_key()
}
