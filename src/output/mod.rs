// src/output/mod.rs

//! Output sinks for assembled filing records.
//!
//! A delivery succeeds only when the primary sink accepts the record; the
//! orchestrator commits the accession to the ledger after that.

pub mod json;
#[cfg(feature = "notify")]
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::FilingRecord;

pub use json::JsonSink;
#[cfg(feature = "notify")]
pub use webhook::WebhookNotifier;

/// Destination for emitted filing records.
#[async_trait]
pub trait FilingSink: Send + Sync {
    async fn deliver(&self, record: &FilingRecord) -> Result<()>;
}

/// Best-effort side channel notified after a successful delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, record: &FilingRecord) -> Result<()>;
}

/// Primary sink plus notifiers whose failures never fail the delivery.
pub struct NotifyingSink {
    primary: Arc<dyn FilingSink>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifyingSink {
    pub fn new(primary: Arc<dyn FilingSink>) -> Self {
        Self {
            primary,
            notifiers: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }
}

#[async_trait]
impl FilingSink for NotifyingSink {
    async fn deliver(&self, record: &FilingRecord) -> Result<()> {
        self.primary.deliver(record).await?;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(record).await {
                log::warn!("Notification for {} failed: {}", record.accession(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::AppError;
    use crate::models::Accession;

    /// Collects delivered records; fails for accessions listed in `reject`.
    #[derive(Default)]
    pub struct RecordingSink {
        pub delivered: Mutex<Vec<FilingRecord>>,
        pub reject: Mutex<Vec<Accession>>,
        pub attempts: AtomicUsize,
    }

    impl RecordingSink {
        pub fn rejecting(accessions: impl IntoIterator<Item = Accession>) -> Self {
            Self {
                reject: Mutex::new(accessions.into_iter().collect()),
                ..Self::default()
            }
        }

        pub fn accept_all(&self) {
            self.reject.lock().unwrap().clear();
        }

        pub fn delivered_accessions(&self) -> Vec<String> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.accession().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl FilingSink for RecordingSink {
        async fn deliver(&self, record: &FilingRecord) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.reject.lock().unwrap().contains(record.accession()) {
                return Err(AppError::Sink(format!("refused {}", record.accession())));
            }
            self.delivered.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _record: &FilingRecord) -> Result<()> {
            Err(AppError::Sink("webhook unreachable".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingNotifier, RecordingSink};
    use super::*;
    use crate::models::fixtures::sample_record;

    #[tokio::test]
    async fn notifier_failure_does_not_fail_delivery() {
        let primary = Arc::new(RecordingSink::default());
        let sink = NotifyingSink::new(primary.clone()).with_notifier(Arc::new(FailingNotifier));

        sink.deliver(&sample_record()).await.unwrap();
        assert_eq!(primary.delivered_accessions().len(), 1);
    }

    #[tokio::test]
    async fn primary_failure_fails_delivery() {
        let record = sample_record();
        let primary = Arc::new(RecordingSink::rejecting([record.accession().clone()]));
        let sink = NotifyingSink::new(primary);

        assert!(sink.deliver(&record).await.is_err());
    }
}
