//! Environment configuration helpers.

use tracing::warn;

/// Parse an environment variable, warning when it is set but unparsable.
///
/// Unset variables return `None` silently.
pub(crate) fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse() {
        std::env::set_var("STEADYSTEP_TEST_ENV_OK", " 42 ");
        std::env::set_var("STEADYSTEP_TEST_ENV_BAD", "forty-two");

        assert_eq!(env_parse::<u32>("STEADYSTEP_TEST_ENV_OK"), Some(42));
        assert_eq!(env_parse::<u32>("STEADYSTEP_TEST_ENV_BAD"), None);
        assert_eq!(env_parse::<u32>("STEADYSTEP_TEST_ENV_UNSET"), None);
    }
}
