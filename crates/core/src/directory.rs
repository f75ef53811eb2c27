//! Create and update rules for directory records.
//!
//! These functions sit between the routes and a [`PwaStore`]: they enforce
//! the record invariants (https manifest URL, owner present, identifier
//! derived from the URL) and reconcile create-versus-update.

use chrono::Utc;

use crate::Error;
use crate::hash::compute_pwa_id;
use crate::manifest::Manifest;
use crate::store::{PwaRecord, PwaStore, User};

const INSECURE_SCHEME: &str = "http://";
const SECURE_SCHEME: &str = "https://";

/// Trim a submitted manifest URL and upgrade `http://` to `https://`.
pub fn normalize_manifest_url(input: &str) -> String {
    let trimmed = input.trim();
    match trimmed.strip_prefix(INSECURE_SCHEME) {
        Some(rest) => format!("{SECURE_SCHEME}{rest}"),
        None => trimmed.to_string(),
    }
}

/// Check that `url` is present and uses https.
pub fn validate_manifest_url(url: &str) -> Result<(), Error> {
    if url.is_empty() {
        return Err(Error::MissingManifestUrl);
    }
    match url.strip_prefix(SECURE_SCHEME) {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(Error::InvalidManifestUrl(url.to_string())),
    }
}

/// Create the record for `manifest`, or update it in place if it exists.
///
/// The identifier and creation time of an existing record are kept; the
/// manifest-derived fields, owner, and update time are replaced.
pub async fn create_or_update(store: &dyn PwaStore, manifest: &Manifest, user: Option<User>) -> Result<PwaRecord, Error> {
    validate_manifest_url(&manifest.url)?;
    let user = match user {
        Some(user) if !user.id.is_empty() => user,
        _ => return Err(Error::MissingUserInformation),
    };

    let mut record = PwaRecord::from_manifest(manifest, Some(user), Utc::now());

    match store.find(&record.id).await {
        Ok(existing) => {
            record.created = existing.created;
            record.lighthouse_score = existing.lighthouse_score;
            store.update(&record).await?;
            tracing::info!(id = %record.id, "updated directory record");
        }
        Err(Error::NotFound(_)) => match store.insert(&record).await {
            Ok(()) => tracing::info!(id = %record.id, "created directory record"),
            // Lost a race with a concurrent submission of the same URL.
            Err(Error::AlreadyExists(_)) => {
                let existing = store.find(&record.id).await?;
                record.created = existing.created;
                record.lighthouse_score = existing.lighthouse_score;
                store.update(&record).await?;
            }
            Err(e) => return Err(e),
        },
        Err(e) => return Err(e),
    }

    Ok(record)
}

/// Create a record without an owner; fails if one already exists for the URL.
pub async fn create(store: &dyn PwaStore, manifest: &Manifest) -> Result<PwaRecord, Error> {
    validate_manifest_url(&manifest.url)?;
    let record = PwaRecord::from_manifest(manifest, None, Utc::now());
    store.insert(&record).await?;
    tracing::info!(id = %record.id, "created directory record");
    Ok(record)
}

/// Refresh the record `id` from a re-fetched manifest.
///
/// The manifest URL must still derive to `id`; the existing owner, creation
/// time and score are kept.
pub async fn refresh(store: &dyn PwaStore, id: &str, manifest: &Manifest) -> Result<PwaRecord, Error> {
    validate_manifest_url(&manifest.url)?;
    let existing = store.find(id).await?;

    if compute_pwa_id(&manifest.url) != existing.id {
        return Err(Error::InvalidRecord(format!(
            "manifest URL {} does not belong to record {id}",
            manifest.url
        )));
    }

    let mut record = PwaRecord::from_manifest(manifest, existing.user, Utc::now());
    record.created = existing.created;
    record.lighthouse_score = existing.lighthouse_score;
    store.update(&record).await?;
    tracing::info!(id = %record.id, "refreshed directory record");
    Ok(record)
}
