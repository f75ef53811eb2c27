//! Content-Security-Policy middleware.
//!
//! Every request gets two fresh nonces for the inline scripts in the page
//! layout. Handlers read them from the [`Nonces`] request extension; the
//! matching policy is attached to the response.

use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use rand::RngCore;

const NONCE_BYTES: usize = 16;

/// Per-request script nonces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonces {
    pub first: String,
    pub second: String,
}

impl Nonces {
    pub fn generate() -> Self {
        Self { first: random_nonce(), second: random_nonce() }
    }

    /// Policy header value allowing exactly these nonces.
    pub fn policy(&self) -> String {
        [
            "default-src 'self' accounts.google.com apis.google.com".to_string(),
            format!(
                "script-src 'self' 'unsafe-eval' apis.google.com *.google-analytics.com 'nonce-{}' 'nonce-{}'",
                self.first, self.second
            ),
            "style-src 'self' 'unsafe-inline' cdnjs.cloudflare.com/ajax/libs/font-awesome/".to_string(),
            "font-src 'self' cdnjs.cloudflare.com/ajax/libs/font-awesome/".to_string(),
            "img-src 'self' storage.googleapis.com *.google-analytics.com".to_string(),
        ]
        .join("; ")
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Attach nonces to the request and the policy to the response.
///
/// Responses without a content type are labelled as HTML.
pub async fn content_security_policy(mut request: Request, next: Next) -> Response {
    let nonces = Nonces::generate();
    let policy = nonces.policy();
    request.extensions_mut().insert(nonces);

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    match HeaderValue::from_str(&policy) {
        Ok(value) => {
            headers.insert(header::CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => tracing::error!(error = %e, "unrepresentable content security policy"),
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_format() {
        let nonces = Nonces::generate();
        assert_eq!(nonces.first.len(), NONCE_BYTES * 2);
        assert!(nonces.first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(nonces.first, nonces.second);
    }

    #[test]
    fn test_policy_lists_both_nonces() {
        let nonces = Nonces { first: "aa".into(), second: "bb".into() };
        let policy = nonces.policy();
        assert!(policy.starts_with("default-src 'self' accounts.google.com apis.google.com; script-src"));
        assert!(policy.contains("'nonce-aa' 'nonce-bb'"));
        assert!(policy.ends_with("img-src 'self' storage.googleapis.com *.google-analytics.com"));
        assert_eq!(policy.matches("; ").count(), 4);
    }
}
