//! Shared helpers for provider adapters.

use parlor_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeouts map to [`Error::Transient`] (the caller may retry an
/// idempotent operation); everything else maps to [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transient(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read a provider API key from the environment variable named in config.
///
/// Keys are resolved eagerly at registry construction so a missing
/// variable surfaces at startup, not on the first turn.
pub(crate) fn api_key_from_env(provider_id: &str, env_var: &str) -> Result<String> {
    std::env::var(env_var).map_err(|_| {
        Error::Auth(format!(
            "provider '{provider_id}': environment variable '{env_var}' not set"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_resolves_from_env() {
        let var = "PARLOR_TEST_KEY_RESOLVE_4242";
        std::env::set_var(var, "sk-test");
        assert_eq!(api_key_from_env("openai", var).unwrap(), "sk-test");
        std::env::remove_var(var);
    }

    #[test]
    fn missing_env_var_names_the_variable() {
        let err = api_key_from_env("openai", "PARLOR_TEST_MISSING_9999").unwrap_err();
        assert!(err.to_string().contains("PARLOR_TEST_MISSING_9999"));
    }
}
