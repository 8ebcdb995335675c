//! Run-level deadline

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::BackendError;

/// Point in time after which outstanding backend work is cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    #[must_use]
    pub fn from_millis(millis: Option<u64>) -> Self {
        millis.map_or(Self::none(), |ms| Self::after(Duration::from_millis(ms)))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, `None` when unbounded
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Run `fut` unless the deadline passes first
    ///
    /// # Errors
    /// `BackendError::Cancelled` when the deadline has passed or passes
    /// while `fut` is pending.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match self.0 {
            None => fut.await,
            Some(_) if self.is_expired() => Err(BackendError::Cancelled),
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .unwrap_or(Err(BackendError::Cancelled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_deadline_never_cancels() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);

        let result = deadline
            .guard(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(7)
            })
            .await;
        assert!(matches!(result, Ok(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_cancels_pending_work_at_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let result: Result<(), _> = deadline
            .guard(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(BackendError::Cancelled)));
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_fails_fast() {
        let deadline = Deadline::after(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = deadline.guard(async { Ok(()) }).await;
        assert!(matches!(result, Err(BackendError::Cancelled)));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_from_millis_none_is_unbounded() {
        assert_eq!(Deadline::from_millis(None), Deadline::none());
    }
}
