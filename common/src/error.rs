use thiserror::Error;

/// Rejections raised while turning user input into probe targets.
///
/// These are surfaced before any probe is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// The input could not be parsed. `token` is the offending fragment.
    #[error("invalid spec '{token}': {reason}")]
    InvalidSpec { token: String, reason: String },
    /// A hostname in the input did not resolve to any address.
    #[error("could not resolve '{name}'")]
    Unresolvable { name: String },
}

impl SpecError {
    pub fn invalid(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// The fragment of the input that caused the rejection.
    pub fn token(&self) -> &str {
        match self {
            Self::InvalidSpec { token, .. } => token,
            Self::Unresolvable { name } => name,
        }
    }
}
