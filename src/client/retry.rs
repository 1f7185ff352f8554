//! Timeouts and retries for API requests.

use std::{future::Future, time::Duration};

use crate::client::ClientError;

/// How long to wait for a request and how to retry it if it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long a single attempt may take before it is abandoned.
    pub timeout: Duration,
    /// How many times to retry after the first attempt fails.
    pub max_retries: u32,
    /// How long to wait between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Run `request` until it succeeds, fails with an error that is not
/// retryable, or runs out of retries.
///
/// Each attempt is cancelled if it takes longer than the policy's timeout and
/// counts as a failure. Client errors (4xx) are returned straight away.
/// Only the final error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut request: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut retries_left = policy.max_retries;

    loop {
        let result = match tokio::time::timeout(policy.timeout, request()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && retries_left > 0 => {
                retries_left -= 1;
                tracing::debug!(
                    "Request failed, retrying in {:?} ({retries_left} retries left): {error}",
                    policy.backoff
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(error) => return Err(error),
        }
    }
}
