//! Deadline and cancellation plumbing for outbound requests.

use crate::core::error::{MarketError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries the caller's cancellation signal and an optional absolute deadline.
///
/// Contexts derived with [`RequestContext::with_timeout`] inherit the parent's
/// cancellation and never extend its deadline.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context without deadline that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child context that expires after `timeout` or at the parent's
    /// deadline, whichever comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the context is cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Drives `fut` to completion unless the context is cancelled or expires
    /// first. The in-flight future is dropped in that case.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(MarketError::TransientUpstream(
                "request cancelled".to_string(),
            )),
            _ = expiry => Err(MarketError::TransientUpstream(
                "deadline exceeded".to_string(),
            )),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_before_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_reports_deadline_as_transient() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(10));
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Upstream unavailable: deadline exceeded");
    }

    #[tokio::test]
    async fn test_parent_cancel_propagates_to_child() {
        let parent = RequestContext::new();
        let child = parent.with_timeout(Duration::from_secs(30));
        parent.cancel();
        assert!(child.is_cancelled());

        let result: Result<()> = child.run(std::future::pending()).await;
        assert_eq!(
            result.unwrap_err(),
            MarketError::TransientUpstream("request cancelled".to_string())
        );
    }

    #[tokio::test]
    async fn test_child_never_extends_parent_deadline() {
        let parent = RequestContext::new().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.with_timeout(Duration::from_millis(1));
        assert!(shorter.deadline().unwrap() < parent.deadline().unwrap());
    }
}
