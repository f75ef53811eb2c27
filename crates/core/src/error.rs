//! Unified error type for the PWA directory.
//!
//! Every failure in the workspace is one of these kinds. Route handlers use
//! [`Error::form_message`] to decide whether an error is something the
//! submitter can fix (re-render the form with a message) or something for the
//! generic error handler.

use std::sync::LazyLock;

use regex::Regex;
use tokio_rusqlite::rusqlite;

/// Validation messages come back as `ERROR: <message>.`; only the message is shown.
static VALIDATION_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ERROR:\s+(.*)\.$").expect("validation message pattern is valid"));

/// Unified error types for the PWA directory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest URL is not an https URL.
    #[error("INVALID_MANIFEST_URL: {0}")]
    InvalidManifestUrl(String),

    /// No owning user was attached to a submission.
    #[error("MISSING_USER_INFORMATION")]
    MissingUserInformation,

    /// A record without a manifest URL was submitted for storage.
    #[error("MANIFEST_URL_MISSING")]
    MissingManifestUrl,

    /// A stored or submitted record is not a well-formed PWA record.
    #[error("INVALID_RECORD: {0}")]
    InvalidRecord(String),

    /// The manifest could not be fetched or parsed.
    #[error("MANIFEST_ERROR: {0}")]
    ManifestError(String),

    /// The manifest was fetched but failed validation.
    #[error("MANIFEST_INVALID: {}", .0.join("; "))]
    ManifestInvalid(Vec<String>),

    /// A record with the same identifier already exists.
    #[error("ALREADY_EXISTS: {0}")]
    AlreadyExists(String),

    /// The identity token was missing or rejected.
    #[error("NOT_LOGGED_IN: {0}")]
    NotLoggedIn(String),

    /// No record with the given identifier.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// No page cache entry for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("DATABASE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("DATABASE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// SSRF blocked - private/internal address not allowed.
    #[error("SSRF_BLOCKED: {0}")]
    SsrfBlocked(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),
}

impl Error {
    /// Human-readable message for errors the submitter can correct.
    ///
    /// Returns `None` for everything that belongs to the generic error handler.
    pub fn form_message(&self) -> Option<String> {
        match self {
            Error::InvalidManifestUrl(url) => Some(format!("pwa.manifestUrl [{url}] is not a valid URL")),
            Error::MissingUserInformation => Some("Missing user information".into()),
            Error::MissingManifestUrl => Some("Missing manifestUrl".into()),
            Error::InvalidRecord(_) => Some("pwa is not a valid PWA record".into()),
            Error::ManifestInvalid(messages) => Some(format_validation_messages(messages)),
            Error::AlreadyExists(_) => Some("manifest already exists".into()),
            Error::NotLoggedIn(_) => Some("user not logged in".into()),
            Error::ManifestError(_)
            | Error::InvalidUrl(_)
            | Error::SsrfBlocked(_)
            | Error::FetchTimeout(_)
            | Error::FetchTooLarge(_)
            | Error::HttpError(_) => Some("error loading manifest".into()),
            Error::NotFound(_)
            | Error::CacheMiss(_)
            | Error::Database(_)
            | Error::MigrationFailed(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Join validation messages into one line, stripping the `ERROR: ... .` envelope.
///
/// Messages that don't follow the envelope are kept verbatim.
pub fn format_validation_messages(messages: &[String]) -> String {
    messages
        .iter()
        .map(|m| match VALIDATION_MESSAGE.captures(m) {
            Some(caps) => caps[1].to_string(),
            None => m.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
