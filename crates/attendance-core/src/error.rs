use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store write failed for '{key}': {message}")]
    Write { key: String, message: String },
}

impl StoreError {
    pub fn write(key: &str, message: impl Into<String>) -> Self {
        StoreError::Write {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Every way an access check can go wrong.
///
/// None of these are retried internally. Biometric ceremonies in particular
/// must be re-triggered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The identity provider rejected the code, or the round trip failed.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// No identity token, or one that cannot be decoded.
    #[error("malformed identity token: {0}")]
    MalformedToken(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("biometric registration failed: {0}")]
    Registration(String),

    #[error("TouchID registration expired")]
    EnrollmentExpired,

    #[error("biometric verification failed: {0}")]
    Verification(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    /// Stable machine-readable code, suitable for UI message lookup.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Exchange(_) => "exchange_failed",
            AccessError::MalformedToken(_) => "malformed_token",
            AccessError::Unsupported(_) => "unsupported",
            AccessError::Unavailable(_) => "unavailable",
            AccessError::Registration(_) => "registration_failed",
            AccessError::EnrollmentExpired => "enrollment_expired",
            AccessError::Verification(_) => "verification_failed",
            AccessError::Store(_) => "store_error",
        }
    }

    /// Failures that mean "the platform can't do biometrics here", as opposed
    /// to "this attempt failed".
    pub fn is_capability(&self) -> bool {
        matches!(self, AccessError::Unsupported(_) | AccessError::Unavailable(_))
    }
}

pub type Result<T, E = AccessError> = std::result::Result<T, E>;
