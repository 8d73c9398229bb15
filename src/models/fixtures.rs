// src/models/fixtures.rs

//! Shared model fixtures for unit tests.

use chrono::DateTime;

use crate::models::{
    Accession, CompleteSubmission, DocumentRow, FeedEntry, FeedSummary, FilerRole, FilingRecord,
    ResolvedFiling,
};

pub fn entry(accession: &str, cik: &str, form_type: &str) -> FeedEntry {
    let accession: Accession = accession.parse().unwrap();
    FeedEntry {
        filing_url: format!(
            "https://www.sec.gov/Archives/edgar/data/{cik}/{}/{accession}-index.htm",
            accession.no_dashes()
        ),
        accession,
        company: "Acme Corp".to_string(),
        cik: cik.to_string(),
        role: Some(FilerRole::Filer),
        ticker: Some("ACME".to_string()),
        form_type: form_type.to_string(),
        title: format!("{form_type} - Acme Corp ({cik}) (Filer)"),
        summary: FeedSummary::default(),
        published: DateTime::parse_from_rfc3339("2026-10-14T16:05:12-04:00").unwrap(),
    }
}

pub fn filing(accession: &str) -> ResolvedFiling {
    ResolvedFiling {
        accession_number: accession.parse().unwrap(),
        index_url: "https://www.sec.gov/idx".into(),
        documents: vec![DocumentRow {
            seq: Some("1".into()),
            document: Some("form8k.htm".into()),
            doc_type: Some("8-K".into()),
            url: Some("https://www.sec.gov/form8k.htm".into()),
            ..DocumentRow::default()
        }],
        complete_submission: CompleteSubmission {
            label: "Complete submission text file".into(),
            href_raw: None,
            url: "https://www.sec.gov/full.txt".into(),
        },
        ticker: None,
    }
}

pub fn sample_record() -> FilingRecord {
    let acc = "0001234567-26-000001";
    FilingRecord::new(entry(acc, "1234567", "8-K"), filing(acc), true).unwrap()
}
