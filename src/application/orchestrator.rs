//! Request orchestrator - drives one call through one adapter.
//!
//! Each attempt is preceded by the quota check and the rate window, runs
//! under the adapter's timeout, and races the request's cancellation token.
//! Transient failures are retried with exponential backoff. The orchestrator
//! never crosses adapter boundaries; fallback is the manager's job.

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::provider_adapter::ProviderAdapter;
use crate::domain::provider::{
    ChunkStream, ProviderError, Request, Response, RetryPolicy, StreamChunk,
};

/// Retry, timeout and cancellation around single adapter calls.
#[derive(Debug, Clone, Default)]
pub struct RequestOrchestrator {
    retry: RetryPolicy,
}

/// Outcome of one guarded chunk pull.
enum Pull {
    Item(Option<Result<StreamChunk, ProviderError>>),
    TimedOut,
    Cancelled,
}

impl RequestOrchestrator {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Executes a non-streaming request.
    pub async fn execute(
        &self,
        adapter: &ProviderAdapter,
        request: &Request,
    ) -> Result<Response, ProviderError> {
        adapter.check_capabilities(request)?;
        self.run(adapter, request, || adapter.send(request)).await
    }

    /// Opens a stream and guards every pull with the timeout and the
    /// cancellation token.
    pub async fn stream(
        &self,
        adapter: &Arc<ProviderAdapter>,
        request: &Request,
    ) -> Result<ChunkStream, ProviderError> {
        adapter.check_capabilities(request)?;
        let chunks = self.run(adapter, request, || adapter.stream(request)).await?;
        Ok(ChunkStream::new(guard(
            adapter.clone(),
            request.cancellation().clone(),
            chunks,
        )))
    }

    async fn run<T, F, Fut>(
        &self,
        adapter: &ProviderAdapter,
        request: &Request,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let cancel = request.cancellation();
        let usage = adapter.usage();
        let deadline = adapter.timeout();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            usage.check_quota(request.max_tokens)?;
            usage.acquire_slot(cancel).await?;
            // Calls in flight during the wait may have used up the quota.
            usage.check_quota(request.max_tokens)?;

            debug!(
                provider = %adapter.id(),
                request_id = %request.id,
                attempt,
                "dispatching request"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    usage.record_failure();
                    return Err(ProviderError::Cancelled);
                }
                result = timeout(deadline, call()) => match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        usage.record_failure();
                        Err(ProviderError::Timeout { after: deadline })
                    }
                },
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= adapter.max_retries() {
                return Err(error);
            }

            let delay = self.retry.delay_for(attempt, error.retry_after());
            warn!(
                provider = %adapter.id(),
                request_id = %request.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying request"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Bounds every pull by the adapter timeout and stops at cancellation.
fn guard(
    adapter: Arc<ProviderAdapter>,
    cancel: CancellationToken,
    mut chunks: ChunkStream,
) -> impl Stream<Item = Result<StreamChunk, ProviderError>> + Send + 'static {
    stream! {
        let deadline = adapter.timeout();
        loop {
            let pull = tokio::select! {
                biased;
                _ = cancel.cancelled() => Pull::Cancelled,
                next = timeout(deadline, chunks.next()) => match next {
                    Ok(item) => Pull::Item(item),
                    Err(_) => Pull::TimedOut,
                },
            };

            match pull {
                Pull::Item(Some(item)) => {
                    let terminal = match &item {
                        Ok(chunk) => chunk.is_final,
                        Err(_) => true,
                    };
                    yield item;
                    if terminal {
                        return;
                    }
                }
                Pull::Item(None) => return,
                Pull::TimedOut => {
                    adapter.usage().record_failure();
                    yield Err(ProviderError::Timeout { after: deadline });
                    return;
                }
                Pull::Cancelled => {
                    adapter.usage().record_failure();
                    debug!(provider = %adapter.id(), "stream cancelled");
                    yield Err(ProviderError::Cancelled);
                    return;
                }
            }
        }
    }
}
