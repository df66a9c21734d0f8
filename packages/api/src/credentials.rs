//! Bearer token lookup.

/// Environment variable holding the API bearer token.
pub const DEFAULT_TOKEN_VAR: &str = "BEARER_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The variable is unset or empty.
    #[error("The {var} environment variable must be set in order to run this program")]
    Missing {
        /// Name of the variable that was checked.
        var: String,
    },
}

/// Supplies the bearer token attached to every request.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Read the named environment variable on every call.
    Env(String),
    /// A token fixed at construction time.
    Static(String),
}

impl Default for Credentials {
    fn default() -> Self {
        Self::Env(DEFAULT_TOKEN_VAR.to_owned())
    }
}

impl Credentials {
    #[must_use]
    pub fn from_env_var(var: &str) -> Self {
        Self::Env(var.to_owned())
    }

    /// Returns the bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Missing`] if the token is unset or empty.
    pub fn token(&self) -> Result<String, CredentialError> {
        match self {
            Self::Env(var) => non_empty(var, std::env::var(var).ok()),
            Self::Static(token) => non_empty("token", Some(token.clone())),
        }
    }
}

fn non_empty(var: &str, value: Option<String>) -> Result<String, CredentialError> {
    value
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| CredentialError::Missing {
            var: var.to_owned(),
        })
}
