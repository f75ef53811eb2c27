//! Outbound collaborators for the PWA directory.
//!
//! This crate provides the manifest fetch pipeline (with SSRF protection),
//! manifest parsing, and identity token verification used by the server.

pub mod fetch;
pub mod identity;
pub mod manifest;

pub use fetch::{FetchConfig, HttpManifestFetcher, ManifestFetcher};
pub use identity::{IdentityClaims, IdentityVerifier, JwtVerifier};
pub use manifest::parse_manifest;
