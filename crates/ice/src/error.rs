use thiserror::Error;

/// Credential issuer failures. The message is shown to callers as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IceError {
    #[error("no ICE provider configured")]
    NotConfigured,

    #[error("ICE issuer returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("ICE issuer unreachable: {0}")]
    Transport(String),

    #[error("ICE issuer sent an invalid response: {0}")]
    InvalidResponse(String),
}

pub type IceResult<T> = Result<T, IceError>;
