// src/models/feed.rs

//! Feed entry data structures.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::models::Accession;

/// Relationship tag attached to a feed row.
///
/// Some form types appear once per related entity, e.g. a "Filed by" row for
/// the filer and a "Subject" row for the company being filed about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilerRole {
    Subject,
    FiledBy,
    Filer,
    Reporting,
    Issuer,
    Other(String),
}

impl FilerRole {
    /// Canonicalization priority, lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            FilerRole::Subject => 0,
            FilerRole::FiledBy => 1,
            _ => 2,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FilerRole::Subject => "Subject",
            FilerRole::FiledBy => "Filed by",
            FilerRole::Filer => "Filer",
            FilerRole::Reporting => "Reporting",
            FilerRole::Issuer => "Issuer",
            FilerRole::Other(label) => label,
        }
    }
}

impl From<&str> for FilerRole {
    fn from(value: &str) -> Self {
        let lowered = value.trim().to_lowercase();
        if lowered.contains("subject") {
            FilerRole::Subject
        } else if lowered.contains("filed") {
            FilerRole::FiledBy
        } else if lowered == "filer" {
            FilerRole::Filer
        } else if lowered == "reporting" {
            FilerRole::Reporting
        } else if lowered == "issuer" {
            FilerRole::Issuer
        } else {
            FilerRole::Other(value.trim().to_string())
        }
    }
}

impl From<String> for FilerRole {
    fn from(value: String) -> Self {
        FilerRole::from(value.as_str())
    }
}

impl From<FilerRole> for String {
    fn from(value: FilerRole) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for FilerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields extracted from the HTML summary of a feed row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSummary {
    /// Summary with markup removed
    pub text: Option<String>,
    /// Filing date (`YYYY-MM-DD`)
    pub filed: Option<String>,
    /// Human-readable submission size
    pub size: Option<String>,
}

/// One canonical row from the latest-filings feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Accession identifier, unique per filing event
    pub accession: Accession,

    /// Entity name as shown in the feed title
    pub company: String,

    /// Central index key, as printed in the feed
    pub cik: String,

    /// Filer role, when the title carries one
    pub role: Option<FilerRole>,

    /// Ticker from the reference dataset; serialized as `null` when unknown
    pub ticker: Option<String>,

    /// Filing form type (e.g. `8-K`)
    pub form_type: String,

    /// Raw feed title
    pub title: String,

    pub summary: FeedSummary,

    /// Publication timestamp (`updated`)
    pub published: DateTime<FixedOffset>,

    /// Filing index URL from the feed link
    pub filing_url: String,
}

impl FeedEntry {
    /// Role priority used when several rows share an accession.
    pub fn priority(&self) -> u8 {
        self.role.as_ref().map_or(2, FilerRole::priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_labels_roundtrip_through_strings() {
        assert_eq!(FilerRole::from("Subject"), FilerRole::Subject);
        assert_eq!(FilerRole::from("Filed by"), FilerRole::FiledBy);
        assert_eq!(FilerRole::from("Filer"), FilerRole::Filer);
        assert_eq!(
            FilerRole::from("Agent"),
            FilerRole::Other("Agent".to_string())
        );
        assert_eq!(String::from(FilerRole::FiledBy), "Filed by");
    }

    #[test]
    fn subject_outranks_filed_by() {
        assert!(FilerRole::Subject.priority() < FilerRole::FiledBy.priority());
        assert!(FilerRole::FiledBy.priority() < FilerRole::Reporting.priority());
    }

    #[test]
    fn missing_ticker_serializes_as_null() {
        let entry = FeedEntry {
            accession: "0001234567-26-000001".parse().unwrap(),
            company: "Acme Corp".into(),
            cik: "0001234567".into(),
            role: Some(FilerRole::Filer),
            ticker: None,
            form_type: "8-K".into(),
            title: "8-K - Acme Corp (0001234567) (Filer)".into(),
            summary: FeedSummary::default(),
            published: DateTime::parse_from_rfc3339("2026-10-14T16:05:12-04:00").unwrap(),
            filing_url: "https://www.sec.gov/x-index.htm".into(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("ticker").unwrap().is_null());
        assert_eq!(value["role"], "Filer");
        assert_eq!(value["accession"], "0001234567-26-000001");
    }
}
