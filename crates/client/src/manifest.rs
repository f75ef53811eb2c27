//! Web app manifest parsing and validation.
//!
//! The raw document is kept verbatim; display fields are normalized and every
//! URL in them is resolved against the manifest's own URL. Validation problems
//! are collected rather than failing on the first one, each in the form
//! `ERROR: <message>.`

use pwadir_core::{Error, Manifest};
use serde_json::{Map, Value};
use url::Url;

/// Parse and validate a manifest body fetched from `url`.
///
/// # Errors
///
/// - `Error::ManifestError` if the body is not UTF-8 JSON
/// - `Error::ManifestInvalid` with every validation problem found
pub fn parse_manifest(url: &Url, body: &[u8]) -> Result<Manifest, Error> {
    let raw = std::str::from_utf8(body).map_err(|e| Error::ManifestError(format!("manifest is not UTF-8: {e}")))?;
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::ManifestError(format!("manifest is not valid JSON: {e}")))?;

    let Value::Object(root) = value else {
        return Err(Error::ManifestInvalid(vec!["ERROR: Manifest is not a JSON object.".into()]));
    };

    let mut problems = Vec::new();

    let name = string_field(&root, "name", &mut problems);
    let short_name = string_field(&root, "short_name", &mut problems);
    if name.is_none() && short_name.is_none() {
        problems.push("ERROR: Manifest is missing a name.".into());
    }

    let description = string_field(&root, "description", &mut problems);
    let background_color = string_field(&root, "background_color", &mut problems);
    let theme_color = string_field(&root, "theme_color", &mut problems);

    let start_url = string_field(&root, "start_url", &mut problems).and_then(|s| match resolve_web_url(url, &s) {
        Some(resolved) => Some(resolved.to_string()),
        None => {
            problems.push(format!("ERROR: start_url {s} is not a valid URL."));
            None
        }
    });

    let icon_url = largest_icon(url, root.get("icons"), &mut problems);

    if !problems.is_empty() {
        return Err(Error::ManifestInvalid(problems));
    }

    Ok(Manifest {
        url: url.to_string(),
        raw: raw.to_string(),
        name,
        short_name,
        description,
        start_url: start_url.or_else(|| url.join("/").ok().map(|u| u.to_string())),
        icon_url,
        background_color,
        theme_color,
    })
}

/// Trimmed string member; empty strings count as absent.
fn string_field(root: &Map<String, Value>, key: &str, problems: &mut Vec<String>) -> Option<String> {
    match root.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        Some(_) => {
            problems.push(format!("ERROR: {key} must be a string."));
            None
        }
    }
}

/// Resolve `value` against `base`, accepting only http and https targets.
fn resolve_web_url(base: &Url, value: &str) -> Option<Url> {
    base.join(value.trim()).ok().filter(|resolved| matches!(resolved.scheme(), "http" | "https"))
}

/// Area of the largest size in an icon `sizes` attribute. `any` sorts above everything.
fn icon_area(sizes: Option<&str>) -> u64 {
    sizes
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|size| {
            if size.eq_ignore_ascii_case("any") {
                return Some(u64::MAX);
            }
            let lower = size.to_ascii_lowercase();
            let (w, h) = lower.split_once('x')?;
            Some(w.parse::<u64>().ok()?.saturating_mul(h.parse::<u64>().ok()?))
        })
        .max()
        .unwrap_or(0)
}

fn largest_icon(base: &Url, icons: Option<&Value>, problems: &mut Vec<String>) -> Option<String> {
    let icons = match icons {
        None | Some(Value::Null) => return None,
        Some(Value::Array(icons)) => icons,
        Some(_) => {
            problems.push("ERROR: icons must be an array.".into());
            return None;
        }
    };

    let mut best: Option<(u64, Url)> = None;
    for (index, icon) in icons.iter().enumerate() {
        let Some(src) = icon.get("src").and_then(Value::as_str) else {
            problems.push(format!("ERROR: icons[{index}] has no src."));
            continue;
        };
        let Some(resolved) = resolve_web_url(base, src) else {
            problems.push(format!("ERROR: icons[{index}].src {src} is not a valid URL."));
            continue;
        };

        let area = icon_area(icon.get("sizes").and_then(Value::as_str));
        if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
            best = Some((area, resolved));
        }
    }

    best.map(|(_, url)| url.to_string())
}
