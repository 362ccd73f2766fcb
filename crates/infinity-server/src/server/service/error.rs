use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// An encoding error surfaced as an HTTP response.
///
/// Only errors raised before the response head is sent end up here; once a
/// streaming body has started, failures can only abort the body.
#[derive(Debug)]
pub struct ApiError(pub infinity::Error);

impl From<infinity::Error> for ApiError {
    fn from(err: infinity::Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        use infinity::Error;
        match &self.0 {
            Error::Configuration { .. } => StatusCode::BAD_REQUEST,
            Error::ServiceShutdown | Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::ResourceLimit { .. }
            | Error::Transport(_)
            | Error::Source { .. }
            | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, "Request failed: {}", self.0);
        } else {
            tracing::debug!(%status, "Request rejected: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}
