//! Concurrent provider dispatch with per-provider timeouts.

use crate::orchestrator::retry::RetryPolicy;
use crate::providers::{FetchRequest, ProviderError};
use crate::registry::Candidate;
use crate::types::observation_table::ObservationTable;
use futures_util::future::join_all;
use log::{error, info};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a provider contributed nothing.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("timeout")]
    Timeout(Duration),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Outcome of one provider call.
#[derive(Debug)]
pub struct ProviderResult {
    pub id: String,
    pub outcome: Result<ObservationTable, FetchFailure>,
}

/// Calls every candidate concurrently, each bounded by `per_source_timeout`
/// including its retries.
///
/// Results come back in candidate order. A slow, failing or panicking
/// provider only affects its own entry.
pub async fn dispatch(
    candidates: Vec<Candidate>,
    base: &FetchRequest,
    retry: &RetryPolicy,
    per_source_timeout: Duration,
) -> Vec<ProviderResult> {
    let (ids, handles): (Vec<String>, Vec<_>) = candidates
        .into_iter()
        .map(|candidate| {
            let id = candidate.id.clone();
            let request = FetchRequest {
                factors: candidate.factors,
                ..base.clone()
            };
            let retry = retry.clone();
            let adapter = candidate.adapter;
            let provider = candidate.id;
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(
                    per_source_timeout,
                    retry.run(&provider, || adapter.fetch(&request)),
                )
                .await;
                match result {
                    Ok(Ok(table)) => {
                        info!(
                            "Provider '{provider}' returned {} rows in {:?}",
                            table.height(),
                            started.elapsed()
                        );
                        Ok(table)
                    }
                    Ok(Err(e)) => {
                        error!("Provider '{provider}' failed: {e}");
                        Err(FetchFailure::Provider(e))
                    }
                    Err(_) => {
                        error!("Provider '{provider}' timed out after {per_source_timeout:?}");
                        Err(FetchFailure::Timeout(per_source_timeout))
                    }
                }
            });
            (id, handle)
        })
        .unzip();

    join_all(handles)
        .await
        .into_iter()
        .zip(ids)
        .map(|(joined, id)| {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Provider '{id}' task aborted: {e}");
                    Err(FetchFailure::Provider(ProviderError::TaskJoin(e)))
                }
            };
            ProviderResult { id, outcome }
        })
        .collect()
}
