//! Credentials for the text-generation API
//!
//! Lookup order:
//! 1. `CLAUDE_CODE_OAUTH_TOKEN` (subscription access)
//! 2. The API key variable named in `models.api_key_env` (default `ANTHROPIC_API_KEY`)

use counsel_core::{CounselError, Result};
use std::env;

const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Resolve the API credential, preferring the OAuth token
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Some(token) = non_empty_var(OAUTH_TOKEN_ENV) {
        tracing::debug!("Using {} for text generation", OAUTH_TOKEN_ENV);
        return Ok(token);
    }

    if let Some(key) = non_empty_var(api_key_env) {
        tracing::debug!("Using {} for text generation", api_key_env);
        return Ok(key);
    }

    Err(CounselError::Auth(format!(
        "No credentials found. Set {} or {}",
        OAUTH_TOKEN_ENV, api_key_env
    )))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-wide
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const TEST_KEY_ENV: &str = "COUNSEL_TEST_API_KEY";

    fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
        result
    }

    #[test]
    fn test_oauth_token_wins() {
        with_env_vars(
            &[(OAUTH_TOKEN_ENV, Some("oauth")), (TEST_KEY_ENV, Some("key"))],
            || assert_eq!(get_auth_token(TEST_KEY_ENV).unwrap(), "oauth"),
        );
    }

    #[test]
    fn test_configured_key_fallback() {
        with_env_vars(
            &[(OAUTH_TOKEN_ENV, None), (TEST_KEY_ENV, Some("key"))],
            || assert_eq!(get_auth_token(TEST_KEY_ENV).unwrap(), "key"),
        );
    }

    #[test]
    fn test_blank_values_are_ignored() {
        with_env_vars(
            &[(OAUTH_TOKEN_ENV, Some("  ")), (TEST_KEY_ENV, None)],
            || {
                let err = get_auth_token(TEST_KEY_ENV).unwrap_err();
                assert!(matches!(err, CounselError::Auth(_)));
                assert!(err.to_string().contains(TEST_KEY_ENV));
            },
        );
    }
}
