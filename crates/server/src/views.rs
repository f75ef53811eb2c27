//! HTML rendering.
//!
//! Each page has a `*_content` fragment, which is what `contentOnly`
//! requests receive, and is otherwise wrapped in [`document`]. All
//! interpolated values are escaped.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use pwadir_core::{AnalysisReport, PwaRecord, SortOrder};

use crate::csp::Nonces;

pub const SITE_TITLE: &str = "PWA Directory";
pub const SITE_DESCRIPTION: &str = "PWA Directory: A Directory of Progressive Web Apps";

/// Document-level metadata.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub title: &'a str,
    pub description: &'a str,
    /// Show a link back to the listing.
    pub backlink: bool,
}

impl Default for Page<'_> {
    fn default() -> Self {
        Self { title: SITE_TITLE, description: SITE_DESCRIPTION, backlink: false }
    }
}

/// Full HTML document around `content`.
pub fn document(page: &Page<'_>, nonces: &Nonces, content: &str) -> String {
    let back = if page.backlink { r#"<a class="header-back" href="/" aria-label="Back">&larr;</a>"# } else { "" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<meta name="description" content="{description}">
<link rel="manifest" href="/manifest.json">
<link rel="stylesheet" href="/css/style.css">
<script nonce="{first}">document.documentElement.classList.add('js');</script>
</head>
<body>
<header class="header">{back}<a class="header-title" href="/">{site}</a><a class="header-add" href="/add">Submit a PWA</a></header>
<main id="content">
{content}
</main>
<script nonce="{second}" src="/js/gulliver.js" defer></script>
</body>
</html>
"#,
        title = text(page.title),
        description = attr(page.description),
        first = nonces.first,
        second = nonces.second,
        site = SITE_TITLE,
    )
}

/// Standalone error document. Carries no scripts, so needs no nonces.
pub fn error_document(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} - {site}</title>
<link rel="stylesheet" href="/css/style.css">
</head>
<body>
<main id="content" class="error-page">
<h1>{title}</h1>
<p>{message}</p>
<p><a href="/">Back to the directory</a></p>
</main>
</body>
</html>
"#,
        title = text(title),
        message = text(message),
        site = SITE_TITLE,
    )
}

/// Everything the listing page shows.
#[derive(Debug, Clone)]
pub struct Listing<'a> {
    pub pwas: &'a [PwaRecord],
    pub sort: SortOrder,
    pub page_number: u64,
    pub has_next_page: bool,
    pub pwa_count: u64,
    /// First displayed position, 1-based.
    pub start_pwa: u64,
    /// Last displayed position, inclusive.
    pub end_pwa: u64,
}

fn sort_tab(sort: SortOrder, current: SortOrder, label: &str) -> String {
    let class = if sort == current { "sort-tab active" } else { "sort-tab" };
    format!(r#"<a class="{class}" href="/?sort={}">{label}</a>"#, sort.as_str())
}

pub fn list_content(listing: &Listing<'_>) -> String {
    let mut html = String::from(r#"<section class="pwa-listing">"#);

    html.push_str(r#"<nav class="sort">"#);
    html.push_str(&sort_tab(SortOrder::Newest, listing.sort, "Newest"));
    html.push_str(&sort_tab(SortOrder::Score, listing.sort, "Top Score"));
    html.push_str("</nav>");

    if listing.pwas.is_empty() {
        html.push_str(r#"<p class="empty">No PWAs found.</p>"#);
    } else {
        html.push_str(&format!(
            r#"<p class="range">Showing {}-{} of {}</p>"#,
            listing.start_pwa, listing.end_pwa, listing.pwa_count
        ));
        html.push_str(r#"<ul class="pwa-list">"#);
        for pwa in listing.pwas {
            html.push_str(&list_item(pwa, &format!("/{}", pwa.id)));
        }
        html.push_str("</ul>");
    }

    html.push_str(r#"<nav class="pagination">"#);
    if listing.page_number > 1 {
        html.push_str(&format!(
            r#"<a class="previous" href="/?page={}&amp;sort={}">Previous</a>"#,
            listing.page_number - 1,
            listing.sort.as_str()
        ));
    }
    if listing.has_next_page {
        html.push_str(&format!(
            r#"<a class="next" href="/?page={}&amp;sort={}">Next</a>"#,
            listing.page_number + 1,
            listing.sort.as_str()
        ));
    }
    html.push_str("</nav></section>");
    html
}

fn list_item(pwa: &PwaRecord, href: &str) -> String {
    let icon = match &pwa.icon_url {
        Some(src) => format!(r#"<img class="pwa-icon" src="{}" alt="" width="48" height="48">"#, attr(src)),
        None => r#"<span class="pwa-icon placeholder"></span>"#.to_string(),
    };
    let score = match pwa.lighthouse_score {
        Some(score) => format!(r#"<span class="pwa-score">{score}</span>"#),
        None => String::new(),
    };
    let style = pwa
        .background_color
        .as_deref()
        .map(|color| format!(r#" style="background-color: {}""#, attr(color)))
        .unwrap_or_default();

    format!(
        r#"<li class="pwa"{style}><a href="{href}">{icon}<span class="pwa-name">{name}</span>{score}</a></li>"#,
        href = attr(href),
        name = text(pwa.display_name()),
    )
}

/// The submission form.
#[derive(Debug, Clone, Copy)]
pub struct SubmitForm<'a> {
    /// Form target.
    pub action: &'a str,
    pub heading: &'a str,
    /// Value to prefill, typically what was last submitted.
    pub manifest_url: &'a str,
    pub error: Option<&'a str>,
    /// Include the identity token field filled in by the sign-in script.
    pub with_token: bool,
}

pub fn form_content(form: &SubmitForm<'_>) -> String {
    let error = match form.error {
        Some(message) => format!(r#"<p class="error" role="alert">{}</p>"#, text(message)),
        None => String::new(),
    };
    let token = if form.with_token { r#"<input type="hidden" name="idToken" id="idToken" value="">"# } else { "" };

    format!(
        r#"<section class="pwa-form">
<h1>{heading}</h1>
{error}<form method="post" action="{action}">
<label for="manifestUrl">Manifest URL</label>
<input type="url" name="manifestUrl" id="manifestUrl" value="{manifest_url}" placeholder="https://example.com/manifest.json" required>
{token}<button type="submit">Submit</button>
</form>
</section>"#,
        heading = text(form.heading),
        action = attr(form.action),
        manifest_url = attr(form.manifest_url),
    )
}

/// Links to the legacy edit and delete actions of a record.
#[derive(Debug, Clone, Copy)]
pub struct RecordActions<'a> {
    pub edit: &'a str,
    pub delete: &'a str,
}

pub fn detail_content(
    pwa: &PwaRecord, report: Option<&AnalysisReport>, manifest_json: &str, actions: Option<RecordActions<'_>>,
) -> String {
    let mut html = String::from(r#"<article class="pwa-detail">"#);

    if let Some(icon) = &pwa.icon_url {
        html.push_str(&format!(r#"<img class="pwa-icon" src="{}" alt="" width="128" height="128">"#, attr(icon)));
    }
    html.push_str(&format!("<h1>{}</h1>", text(pwa.display_name())));
    if let Some(description) = &pwa.description {
        html.push_str(&format!(r#"<p class="pwa-description">{}</p>"#, text(description)));
    }

    html.push_str("<dl>");
    if let Some(start_url) = &pwa.start_url {
        html.push_str(&format!(
            r#"<dt>Start URL</dt><dd><a href="{}" rel="noopener">{}</a></dd>"#,
            attr(start_url),
            text(start_url)
        ));
    }
    html.push_str(&format!(
        r#"<dt>Manifest</dt><dd><a href="{}" rel="noopener">{}</a></dd>"#,
        attr(&pwa.manifest_url),
        text(&pwa.manifest_url)
    ));
    if let Some(user) = &pwa.user
        && let Some(name) = user.name.as_deref().or(user.email.as_deref())
    {
        html.push_str(&format!("<dt>Submitted by</dt><dd>{}</dd>", text(name)));
    }
    html.push_str(&format!("<dt>Updated</dt><dd>{}</dd>", text(&pwa.updated)));
    html.push_str("</dl>");

    if let Some(report) = report {
        html.push_str(&format!(
            r#"<section class="lighthouse"><h2>Lighthouse</h2><p class="total-score">{score}</p><p class="report-date">{date}</p>"#,
            score = report.total_score,
            date = report.date.format("%Y-%m-%d"),
        ));
        if let Some(categories) = report.scores.as_object() {
            html.push_str("<ul>");
            for (category, score) in categories {
                html.push_str(&format!("<li>{}: {}</li>", text(category), text(&score.to_string())));
            }
            html.push_str("</ul>");
        }
        html.push_str("</section>");
    }

    html.push_str(&format!(
        r#"<section class="manifest"><h2>Manifest</h2><pre><code>{}</code></pre></section>"#,
        text(manifest_json)
    ));

    if let Some(actions) = actions {
        html.push_str(&format!(
            r#"<nav class="record-actions"><a href="{}">Edit</a><a href="{}">Delete</a></nav>"#,
            attr(actions.edit),
            attr(actions.delete)
        ));
    }

    html.push_str("</article>");
    html
}

/// Listing for the legacy routes, paged by an opaque token.
pub fn legacy_list_content(pwas: &[PwaRecord], next_page_token: Option<&str>) -> String {
    let mut html = String::from(r#"<section class="pwa-listing"><h1>PWAs</h1><a href="/pwas/add">Add PWA</a>"#);

    if pwas.is_empty() {
        html.push_str(r#"<p class="empty">No PWAs found.</p>"#);
    } else {
        html.push_str(r#"<ul class="pwa-list">"#);
        for pwa in pwas {
            html.push_str(&list_item(pwa, &format!("/pwas/{}", pwa.id)));
        }
        html.push_str("</ul>");
    }

    if let Some(token) = next_page_token {
        html.push_str(&format!(
            r#"<nav class="pagination"><a class="next" href="/pwas?pageToken={}">More</a></nav>"#,
            attr(token)
        ));
    }

    html.push_str("</section>");
    html
}
