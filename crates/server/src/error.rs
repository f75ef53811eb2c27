//! HTTP error responses.
//!
//! Errors that reach this point are not correctable by the submitter: a
//! missing record becomes a 404 page, everything else is logged and becomes a
//! generic 500 page.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use pwadir_core::Error;

use crate::views;

/// Error returned by route handlers.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct AppError(#[from] pub Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_not_found() { StatusCode::NOT_FOUND } else { StatusCode::INTERNAL_SERVER_ERROR }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(error = %self.0, "record not found");
            return not_found();
        }

        tracing::error!(error = %self.0, "request failed");
        (status, Html(views::error_document("Something went wrong", "The request could not be completed."))).into_response()
    }
}

/// The 404 page.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(views::error_document("Not Found", "There is nothing at this address."))).into_response()
}
