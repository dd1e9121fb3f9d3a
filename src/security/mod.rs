//! Security module
//!
//! Secure storage for the verification API key (OS keyring with a
//! permission-restricted file fallback).

pub mod keyring;

use anyhow::Result;

/// Set API key in secure keyring
pub fn set_api_key(key: &str) -> Result<()> {
    keyring::set_api_key(key)
}

/// Get API key from the environment or secure keyring
pub fn get_api_key() -> Result<String> {
    keyring::get_api_key()
}

/// Delete API key from keyring
pub fn delete_api_key() -> Result<()> {
    keyring::delete_api_key()
}

/// Check whether an API key is available
pub fn has_api_key() -> bool {
    keyring::has_api_key()
}
