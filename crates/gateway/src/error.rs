use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    lobby_ice::IceError,
    lobby_protocol::{ErrorShape, error_codes},
    lobby_registry::RegistryError,
    thiserror::Error,
    tracing::warn,
};

/// Everything a handler can fail with, mapped onto a status code and the
/// shared `{ok:false, error, message}` body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ice(#[from] IceError),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn missing_host_id() -> Self {
        Self::InvalidRequest("hostId is required".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Registry(RegistryError::NoHosts) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Registry(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Ice(IceError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Ice(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Registry(e) => e.code(),
            Self::Ice(_) => error_codes::ICE_UNAVAILABLE,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::NotFound(_) => error_codes::HOST_NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Ice(e) = &self {
            warn!(error = %e, "ICE request failed");
        }
        let body = ErrorShape::new(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
