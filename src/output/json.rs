// src/output/json.rs

//! JSON sink: one JSON document per filing on a line-oriented writer.

use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::FilingRecord;
use crate::output::FilingSink;

pub struct JsonSink<W: Write + Send + 'static> {
    writer: Mutex<W>,
    compact: bool,
}

impl JsonSink<io::Stdout> {
    pub fn stdout(compact: bool) -> Self {
        Self::new(io::stdout(), compact)
    }
}

impl<W: Write + Send + 'static> JsonSink<W> {
    pub fn new(writer: W, compact: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            compact,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn render(&self, record: &FilingRecord) -> Result<String> {
        let text = if self.compact {
            serde_json::to_string(record)?
        } else {
            serde_json::to_string_pretty(record)?
        };
        Ok(text)
    }
}

#[async_trait]
impl<W: Write + Send + 'static> FilingSink for JsonSink<W> {
    async fn deliver(&self, record: &FilingRecord) -> Result<()> {
        let text = self.render(record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AppError::Sink("output writer poisoned".into()))?;
        writeln!(writer, "{text}")
            .and_then(|_| writer.flush())
            .map_err(|e| AppError::Sink(format!("write failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample_record;

    #[tokio::test]
    async fn compact_output_is_one_line_per_filing() {
        let sink = JsonSink::new(Vec::new(), true);
        sink.deliver(&sample_record()).await.unwrap();
        sink.deliver(&sample_record()).await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["feed_entry"]["accession"], "0001234567-26-000001");
        assert_eq!(value["documents"]["ticker"], "ACME");
        assert_eq!(value["ticker"], "ACME");
        assert_eq!(value["ndjson"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn pretty_output_parses_back() {
        let sink = JsonSink::new(Vec::new(), false);
        sink.deliver(&sample_record()).await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.lines().count() > 1);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["feed_entry"]["form_type"], "8-K");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn write_failure_is_sink_error() {
        let sink = JsonSink::new(BrokenPipe, true);
        let err = sink.deliver(&sample_record()).await.unwrap_err();
        assert!(matches!(err, AppError::Sink(_)));
    }
}
