//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating relay configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidEnv { var: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_problem() {
        let err = Error::Config("timeout_secs must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout_secs must be greater than 0"
        );
    }

    #[test]
    fn invalid_env_names_the_variable() {
        let err = Error::InvalidEnv {
            var: "PORT".into(),
            reason: "invalid digit found in string".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PORT"), "got: {msg}");
        assert!(msg.contains("invalid digit"), "got: {msg}");
    }

    #[test]
    fn io_error_converts() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "keys file missing").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }
}
