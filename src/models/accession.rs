// src/models/accession.rs

//! Accession number newtype.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{10}-\d{2}-\d{6})").expect("valid accession regex"));

static DASHED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}-\d{2}-\d{6}$").expect("valid accession regex"));

/// An SEC accession number in dashed form (`##########-##-######`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    /// Find the first dashed accession number inside arbitrary text.
    pub fn find_in(text: &str) -> Option<Self> {
        ACCESSION_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accession with the dash separators removed, as used in archive paths.
    pub fn no_dashes(&self) -> String {
        self.0.replace('-', "")
    }
}

impl FromStr for Accession {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
        let only_digits_and_dashes = s.chars().all(|c| c.is_ascii_digit() || c == '-');
        if !only_digits_and_dashes || digits.len() != 18 {
            return Err(AppError::validation(format!("Invalid accession number: {s}")));
        }
        if s.contains('-') && !DASHED_RE.is_match(s) {
            return Err(AppError::validation(format!("Invalid accession number: {s}")));
        }
        Ok(Self(format!(
            "{}-{}-{}",
            &digits[..10],
            &digits[10..12],
            &digits[12..]
        )))
    }
}

impl TryFrom<String> for Accession {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(value: Accession) -> Self {
        value.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a CIK: keep digits only, strip leading zeros.
///
/// Returns `None` when the input holds no digits. An all-zero CIK stays as-is.
pub fn normalize_cik(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        Some(digits)
    } else {
        Some(trimmed.to_string())
    }
}
