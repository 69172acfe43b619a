use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Erreurs métier du kernel, exposées en JSON `{"message": ...}` côté HTTP
#[derive(Debug, thiserror::Error)]
pub enum MappError {
    /// Clé de callback absente ou inconnue (endpoints d'ingestion)
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Validation(String),
    /// Salle inconnue ou vide : remplacée par la démo côté HTTP
    #[error("room '{0}' not found")]
    RoomNotFound(String),
    #[error("login required")]
    LoginRequired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MappError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(_) | Self::LoginRequired => StatusCode::UNAUTHORIZED,
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MappError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "[http] request failed");
        }
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}
