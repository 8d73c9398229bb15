// src/services/index.rs

//! Filing index resolver.
//!
//! Fetches `{acc}-index.htm` for an accession and extracts the document
//! table plus the complete-submission link.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Accession, CompleteSubmission, DocumentRow, FeedEntry, RenderHint, ResolvedFiling};
use crate::services::fetcher::{ConditionalFetcher, FetchMode, FetchOutcome};
use crate::utils::{accession_from_index_url, index_url, resolve};

const COMPLETE_SUBMISSION_LABEL: &str = "Complete submission text file";

/// Candidate selectors, tried in order before falling back to a header scan.
const TABLE_SELECTORS: [&str; 3] = [
    "table#documents",
    r#"table[summary="Document Format Files"]"#,
    "table.tableFile",
];

static XSL_XML_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/xsl[^/]+/.*\.xml$").expect("valid xsl regex"));

/// Column positions derived from the header row.
#[derive(Debug, Default, Clone, Copy)]
struct ColumnMap {
    seq: Option<usize>,
    description: Option<usize>,
    document: Option<usize>,
    doc_type: Option<usize>,
    size: Option<usize>,
}

impl ColumnMap {
    fn from_labels(labels: &[String]) -> Self {
        let find = |needle: &str| labels.iter().position(|l| l.contains(needle));
        Self {
            seq: find("seq"),
            description: find("description"),
            document: find("document"),
            doc_type: find("type"),
            size: find("size"),
        }
    }
}

/// Resolves filing index pages into document sets.
pub struct DocumentResolver {
    fetcher: Arc<ConditionalFetcher>,
    base_url: String,
}

impl DocumentResolver {
    pub fn new(fetcher: Arc<ConditionalFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Resolve the index page of a canonical feed entry.
    pub async fn resolve(&self, entry: &FeedEntry) -> Result<ResolvedFiling> {
        let url = index_url(&self.base_url, &entry.cik, &entry.accession);
        self.fetch_index(&url, &entry.accession).await
    }

    /// Resolve an arbitrary `.../{acc}-index.htm` URL.
    pub async fn resolve_index_url(&self, url: &str) -> Result<ResolvedFiling> {
        let accession = accession_from_index_url(url).ok_or_else(|| {
            AppError::validation(format!("'{url}' does not end in an accession index page"))
        })?;
        self.fetch_index(url, &accession).await
    }

    async fn fetch_index(&self, url: &str, accession: &Accession) -> Result<ResolvedFiling> {
        // Index pages are immutable once published, and a retry must see a body.
        match self.fetcher.fetch(url, FetchMode::Always).await? {
            FetchOutcome::Fresh { body, .. } => parse_index(&body, url, accession),
            FetchOutcome::NotModified => Err(AppError::parse(url, "unexpected 304 for index page")),
        }
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn cell_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn header_labels(table: &ElementRef<'_>, row_sel: &Selector, cell_sel: &Selector) -> Vec<String> {
    table
        .select(row_sel)
        .next()
        .map(|row| {
            row.select(cell_sel)
                .map(|c| cell_text(&c).to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

fn find_documents_table<'a>(document: &'a Html) -> Result<Option<ElementRef<'a>>> {
    for selector in TABLE_SELECTORS {
        let sel = parse_selector(selector)?;
        if let Some(table) = document.select(&sel).next() {
            return Ok(Some(table));
        }
    }

    let table_sel = parse_selector("table")?;
    let row_sel = parse_selector("tr")?;
    let cell_sel = parse_selector("th, td")?;
    Ok(document.select(&table_sel).find(|table| {
        let labels = header_labels(table, &row_sel, &cell_sel);
        labels.iter().any(|l| l.contains("document")) && labels.iter().any(|l| l.contains("type"))
    }))
}

/// Hint for XML documents served through an `xsl*` rendering folder.
pub fn render_hint_for_href(href: &str) -> Option<RenderHint> {
    if !XSL_XML_RE.is_match(href) {
        return None;
    }
    let parts: Vec<&str> = href.trim_matches('/').split('/').collect();
    let xsl_folder = match parts.len() {
        0 => None,
        1 => Some(parts[0].to_string()),
        n => Some(parts[n - 2].to_string()),
    };
    let suggested_html_twin = href
        .len()
        .checked_sub(4)
        .and_then(|stem| href.get(..stem))
        .map(|stem| format!("{stem}.html"));
    Some(RenderHint {
        xml_with_xsl: true,
        xsl_folder,
        suggested_html_twin,
    })
}

fn find_complete_submission(
    document: &Html,
    index_url: &str,
    accession: &Accession,
) -> Result<CompleteSubmission> {
    let anchor_sel = parse_selector("a[href]")?;
    let row_sel = parse_selector("tr")?;
    let needle = COMPLETE_SUBMISSION_LABEL.to_lowercase();

    let labelled_anchor = document
        .select(&anchor_sel)
        .find(|a| cell_text(a).to_lowercase().contains(&needle));
    let labelled_row_anchor = || {
        document
            .select(&row_sel)
            .filter(|row| cell_text(row).to_lowercase().contains(&needle))
            .find_map(|row| row.select(&anchor_sel).next())
    };

    let href = labelled_anchor
        .or_else(labelled_row_anchor)
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string);

    let url = match &href {
        Some(href) => resolve(index_url, href).unwrap_or_else(|| href.clone()),
        None => {
            let derived = format!("{accession}.txt");
            resolve(index_url, &derived).unwrap_or(derived)
        }
    };
    Ok(CompleteSubmission {
        label: COMPLETE_SUBMISSION_LABEL.to_string(),
        href_raw: href,
        url,
    })
}

/// Parse an index page already fetched from `index_url`.
pub fn parse_index(html: &str, index_url: &str, accession: &Accession) -> Result<ResolvedFiling> {
    let document = Html::parse_document(html);
    let table = find_documents_table(&document)?
        .ok_or_else(|| AppError::parse(index_url, "no documents table in index page"))?;

    let row_sel = parse_selector("tr")?;
    let header_sel = parse_selector("th, td")?;
    let td_sel = parse_selector("td")?;
    let anchor_sel = parse_selector("a")?;

    let columns = ColumnMap::from_labels(&header_labels(&table, &row_sel, &header_sel));
    let mut documents = Vec::new();

    for row in table.select(&row_sel).skip(1) {
        let cells: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
        if cells.is_empty() {
            continue;
        }
        let column = |idx: Option<usize>| idx.and_then(|i| cells.get(i));
        let text_of = |idx: Option<usize>| column(idx).map(cell_text).and_then(non_empty);

        let anchor = match column(columns.document) {
            Some(cell) => cell.select(&anchor_sel).next(),
            None => row.select(&anchor_sel).next(),
        };
        let href_raw = anchor
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        let url = href_raw
            .as_deref()
            .map(|href| resolve(index_url, href).unwrap_or_else(|| href.to_string()));
        let document_name = anchor
            .map(|a| cell_text(&a))
            .and_then(non_empty)
            .or_else(|| text_of(columns.document));

        documents.push(DocumentRow {
            seq: text_of(columns.seq),
            description: text_of(columns.description),
            document: document_name,
            doc_type: text_of(columns.doc_type),
            size: text_of(columns.size),
            render_hint: href_raw.as_deref().and_then(render_hint_for_href),
            href_raw,
            url,
        });
    }

    let complete_submission = find_complete_submission(&document, index_url, accession)?;
    log::debug!("{}: {} documents", accession, documents.len());

    Ok(ResolvedFiling {
        accession_number: accession.clone(),
        index_url: index_url.to_string(),
        documents,
        complete_submission,
        ticker: None,
    })
}
