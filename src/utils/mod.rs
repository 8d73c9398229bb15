// src/utils/mod.rs

//! Utility functions and helpers.

pub mod http;

use url::Url;

use crate::models::{Accession, normalize_cik};

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Archive folder for one submission: `{base}/Archives/edgar/data/{cik}/{acc}/`.
fn archive_base_url(base_url: &str, cik: &str, accession: &Accession) -> String {
    let cik = normalize_cik(cik).unwrap_or_else(|| cik.to_string());
    format!(
        "{}/Archives/edgar/data/{}/{}/",
        base_url.trim_end_matches('/'),
        cik,
        accession.no_dashes()
    )
}

/// Index page URL for one submission.
pub fn index_url(base_url: &str, cik: &str, accession: &Accession) -> String {
    format!(
        "{}{}-index.htm",
        archive_base_url(base_url, cik, accession),
        accession
    )
}

/// Extract the accession number from an index URL ending in `{acc}-index.htm`.
pub fn accession_from_index_url(index_url: &str) -> Option<Accession> {
    let file = index_url.trim_end_matches('/').rsplit('/').next()?;
    let stem = file
        .strip_suffix("-index.htm")
        .or_else(|| file.strip_suffix("-index.html"))?;
    stem.parse().ok()
}
