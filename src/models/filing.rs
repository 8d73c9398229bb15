// src/models/filing.rs

//! Resolved filing and output record structures.

use serde::{Deserialize, Serialize};

use crate::models::{Accession, FeedEntry};

/// Hint for documents that EDGAR renders from XML through an XSL folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderHint {
    pub xml_with_xsl: bool,
    pub xsl_folder: Option<String>,
    pub suggested_html_twin: Option<String>,
}

/// One file within a filing's index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Sequence number within the submission
    pub seq: Option<String>,
    pub description: Option<String>,
    /// File name (anchor text of the document link)
    pub document: Option<String>,
    /// Document type (e.g. `8-K`, `EX-99.1`, `GRAPHIC`)
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub size: Option<String>,
    /// Link target as written in the index page
    pub href_raw: Option<String>,
    /// Absolute URL
    pub url: Option<String>,
    pub render_hint: Option<RenderHint>,
}

/// Link to the complete submission text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSubmission {
    pub label: String,
    pub href_raw: Option<String>,
    pub url: String,
}

/// Document set resolved from one accession's index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFiling {
    pub accession_number: Accession,
    pub index_url: String,
    pub documents: Vec<DocumentRow>,
    pub complete_submission: CompleteSubmission,
    /// Ticker of the canonical feed entry, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
}

impl ResolvedFiling {
    /// First document carrying a URL, usually the primary document.
    pub fn primary_document_url(&self) -> Option<&str> {
        self.documents.iter().find_map(|d| d.url.as_deref())
    }

    /// One compact JSON line per document, tagged with accession and index URL.
    pub fn to_ndjson(&self) -> crate::error::Result<Vec<String>> {
        #[derive(Serialize)]
        struct Row<'a> {
            accession_number: &'a Accession,
            index_url: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            ticker: Option<&'a str>,
            #[serde(flatten)]
            document: &'a DocumentRow,
        }

        self.documents
            .iter()
            .map(|document| {
                let row = Row {
                    accession_number: &self.accession_number,
                    index_url: &self.index_url,
                    ticker: self.ticker.as_deref(),
                    document,
                };
                Ok(serde_json::to_string(&row)?)
            })
            .collect()
    }
}

/// The unit handed to output sinks: one per new filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRecord {
    pub feed_entry: FeedEntry,
    pub documents: ResolvedFiling,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndjson: Option<Vec<String>>,
    pub ticker: Option<String>,
}

impl FilingRecord {
    /// Assemble a record, tagging the document set with the entry's ticker.
    pub fn new(
        feed_entry: FeedEntry,
        mut documents: ResolvedFiling,
        include_ndjson: bool,
    ) -> crate::error::Result<Self> {
        documents.ticker = feed_entry.ticker.clone();
        let ndjson = if include_ndjson {
            Some(documents.to_ndjson()?)
        } else {
            None
        };
        Ok(Self {
            ticker: feed_entry.ticker.clone(),
            feed_entry,
            documents,
            ndjson,
        })
    }

    pub fn accession(&self) -> &Accession {
        &self.feed_entry.accession
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filing() -> ResolvedFiling {
        ResolvedFiling {
            accession_number: "0001234567-26-000001".parse().unwrap(),
            index_url: "https://www.sec.gov/idx".into(),
            documents: vec![
                DocumentRow {
                    seq: Some("1".into()),
                    document: Some("form8k.htm".into()),
                    doc_type: Some("8-K".into()),
                    url: Some("https://www.sec.gov/form8k.htm".into()),
                    ..DocumentRow::default()
                },
                DocumentRow {
                    seq: Some("2".into()),
                    document: Some("ex99.htm".into()),
                    doc_type: Some("EX-99.1".into()),
                    ..DocumentRow::default()
                },
            ],
            complete_submission: CompleteSubmission {
                label: "Complete submission text file".into(),
                href_raw: None,
                url: "https://www.sec.gov/full.txt".into(),
            },
            ticker: Some("ACME".into()),
        }
    }

    #[test]
    fn ndjson_lines_carry_accession_and_ticker() {
        let lines = filing().to_ndjson().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].contains('\n'));

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["accession_number"], "0001234567-26-000001");
        assert_eq!(first["ticker"], "ACME");
        assert_eq!(first["type"], "8-K");
        assert_eq!(first["document"], "form8k.htm");
    }

    #[test]
    fn primary_document_is_first_with_url() {
        let mut f = filing();
        assert_eq!(f.primary_document_url(), Some("https://www.sec.gov/form8k.htm"));
        f.documents.clear();
        assert_eq!(f.primary_document_url(), None);
    }
}
