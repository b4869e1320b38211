//! Runs a unit of work inside one store transaction.
//!
//! A unit is begun, applied and committed as a whole. Any error aborts the
//! transaction before it is returned. Write conflicts are retried with
//! backoff, and every attempt's work phase must finish before one shared
//! deadline. When the deadline fires the in-flight transaction is dropped,
//! which rolls it back. A commit that has started is never cut short, so a
//! deadline error always means nothing was committed.

use futures::future::BoxFuture;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::config::Config;
use crate::error::ContentError;
use crate::metrics::{self, TRANSACTION_RETRIES_TOTAL, TRANSACTION_ROLLBACKS_TOTAL};
use crate::models::content::EntityKind;
use crate::store::{ContentStore, ContentTx};
use crate::utils::retry::{retry_async_when, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Commit,
    Discard,
}

#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn ContentStore>,
    retry: RetryConfig,
    deadline: Duration,
}

impl TransactionRunner {
    pub fn new(store: Arc<dyn ContentStore>, config: &Config) -> Self {
        Self {
            store,
            retry: RetryConfig::with_attempts(config.transaction_max_attempts),
            deadline: Duration::from_millis(config.cascade_deadline_ms),
        }
    }

    /// Applies `work` and commits it. `kind` and `operation` label logs and
    /// metrics.
    pub async fn write<T, F>(
        &self,
        kind: EntityKind,
        operation: &'static str,
        work: F,
    ) -> Result<T, ContentError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut dyn ContentTx) -> BoxFuture<'t, Result<T, ContentError>>
            + Send
            + Sync,
    {
        let result = self.run(operation, Finish::Commit, &work).await;

        metrics::record_content_write(kind.as_str(), operation, result.is_ok());
        match &result {
            Ok(_) => tracing::debug!(kind = %kind, operation, "Content write committed"),
            Err(err) if err.is_retryable() => {
                tracing::warn!(kind = %kind, operation, error = %err, "Content write rolled back")
            }
            Err(err) => {
                tracing::debug!(kind = %kind, operation, error = %err, "Content write rejected")
            }
        }

        result
    }

    /// Runs `work` against one snapshot and discards the transaction.
    pub async fn read<T, F>(&self, operation: &'static str, work: F) -> Result<T, ContentError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut dyn ContentTx) -> BoxFuture<'t, Result<T, ContentError>>
            + Send
            + Sync,
    {
        self.run(operation, Finish::Discard, &work).await
    }

    async fn run<T, F>(
        &self,
        operation: &'static str,
        finish: Finish,
        work: &F,
    ) -> Result<T, ContentError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut dyn ContentTx) -> BoxFuture<'t, Result<T, ContentError>>
            + Send
            + Sync,
    {
        let deadline = Instant::now() + self.deadline;
        retry_async_when(
            self.retry.clone(),
            || self.attempt(operation, finish, deadline, work),
            |err: &ContentError| {
                let retry = err.is_conflict();
                if retry {
                    TRANSACTION_RETRIES_TOTAL
                        .with_label_values(&[operation])
                        .inc();
                    tracing::warn!(operation, error = %err, "Retrying transaction after conflict");
                }
                retry
            },
        )
        .await
    }

    fn deadline_exceeded(&self, operation: &'static str) -> ContentError {
        let deadline_ms = self.deadline.as_millis() as u64;
        TRANSACTION_ROLLBACKS_TOTAL
            .with_label_values(&[operation, "deadline"])
            .inc();
        tracing::warn!(operation, deadline_ms, "Transaction deadline exceeded, rolled back");
        ContentError::deadline_exceeded(operation, deadline_ms)
    }

    async fn attempt<T, F>(
        &self,
        operation: &'static str,
        finish: Finish,
        deadline: Instant,
        work: &F,
    ) -> Result<T, ContentError>
    where
        T: Send,
        F: for<'t> Fn(&'t mut dyn ContentTx) -> BoxFuture<'t, Result<T, ContentError>>
            + Send
            + Sync,
    {
        if Instant::now() >= deadline {
            return Err(self.deadline_exceeded(operation));
        }
        let staged = tokio::time::timeout_at(deadline, async {
            let mut tx = self.store.begin().await?;
            let applied = work(&mut *tx).await;
            Ok::<_, ContentError>((tx, applied))
        })
        .await;
        let (mut tx, applied) = match staged {
            Ok(staged) => staged?,
            Err(_) => return Err(self.deadline_exceeded(operation)),
        };

        let outcome = match applied {
            Ok(value) if finish == Finish::Commit => match tx.commit().await {
                Ok(()) => return Ok(value),
                Err(err) => Err(ContentError::from(err)),
            },
            Ok(value) => {
                if let Err(err) = tx.abort().await {
                    tracing::debug!(operation, error = %err, "Abort after read failed");
                }
                return Ok(value);
            }
            Err(err) => Err(err),
        };

        if let Err(abort_err) = tx.abort().await {
            tracing::warn!(operation, error = %abort_err, "Abort failed; transaction is dropped instead");
        }

        if finish == Finish::Commit {
            let reason = match &outcome {
                Err(err) if err.is_retryable() => "store",
                _ => "rejected",
            };
            TRANSACTION_ROLLBACKS_TOTAL
                .with_label_values(&[operation, reason])
                .inc();
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{EntityRecord, YearRecord};
    use crate::store::{memory::FaultPoint, MemoryContentStore, StoreError};
    use crate::utils::time::now_millis;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn year(id: &str) -> EntityRecord {
        let now = now_millis();
        EntityRecord::Year(YearRecord {
            id: id.to_string(),
            name: id.to_string(),
            icon: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    fn runner(store: &MemoryContentStore, deadline_ms: u64) -> TransactionRunner {
        let config = Config {
            cascade_deadline_ms: deadline_ms,
            transaction_max_attempts: 3,
            ..Config::default()
        };
        TransactionRunner::new(Arc::new(store.clone()), &config)
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_commit() {
        let store = MemoryContentStore::new();
        store.fail_once(FaultPoint::Commit, StoreError::Transient("conflict".into()));
        let calls = AtomicUsize::new(0);

        let runner = runner(&store, 1_000);
        runner
            .write(EntityKind::Year, "create", |tx| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    tx.insert(&year("Y1")).await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.counts().await.0, 1);
    }

    #[tokio::test]
    async fn rejected_work_is_not_retried_or_kept() {
        let store = MemoryContentStore::new();
        let calls = AtomicUsize::new(0);

        let err = runner(&store, 1_000)
            .write(EntityKind::Year, "create", |tx| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    tx.insert(&year("Y1")).await?;
                    Err::<(), _>(ContentError::missing_field(EntityKind::Year, "name"))
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "MissingField");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.counts().await.0, 0);
    }

    #[tokio::test]
    async fn deadline_rolls_back_in_flight_work() {
        let store = MemoryContentStore::new();
        store.set_op_delay(Some(Duration::from_millis(40)));

        let err = runner(&store, 60)
            .write(EntityKind::Year, "create", |tx| {
                Box::pin(async move {
                    tx.insert(&year("Y1")).await?;
                    tx.insert(&year("Y2")).await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "DeadlineExceeded");
        store.set_op_delay(None);
        assert_eq!(store.counts().await.0, 0);
    }

    #[tokio::test]
    async fn commit_in_flight_outlives_the_deadline() {
        let store = MemoryContentStore::new();
        store.set_op_delay(Some(Duration::from_millis(70)));

        // The insert fits the deadline; the slow commit does not, and still lands
        runner(&store, 100)
            .write(EntityKind::Year, "create", |tx| {
                Box::pin(async move {
                    tx.insert(&year("Y1")).await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        store.set_op_delay(None);
        assert_eq!(store.counts().await.0, 1);
    }
}
