use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{ProbeRequest, ProbeResponse};

/// The whole batch could not be run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }
}

pub type AnyBatchExecutor = Arc<dyn BatchExecutor>;

/// Runs a batch of probes, usually concurrently.
///
/// Implementations return one response per request. Failures of a single
/// request are reported inside its [`ProbeResponse`]; an `Err` means nothing
/// in the batch can be trusted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn run_batch(
        &self,
        requests: Vec<ProbeRequest>,
    ) -> Result<Vec<ProbeResponse>, TransportError>;
}
