// Copyright (c) 2025 by The Confidential Container Authors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::store::StoreError;

/// Cancellation signal and optional deadline for one request.
///
/// Cloning shares the cancellation signal. Derived contexts
/// ([`RequestContext::with_timeout`]) are cancelled together with their
/// parent but not the other way round.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Derive a child context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(match self.deadline {
                Some(parent) => parent.min(deadline),
                None => deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it completes, the context is cancelled or the
    /// deadline passes, whichever happens first. A context that is already
    /// done never polls `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            _ = deadline => Err(StoreError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn completes() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelled_context_never_polls() {
        let ctx = RequestContext::background();
        ctx.cancel();

        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();
        let res = ctx
            .run(async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(res, Err(StoreError::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_in_flight() {
        let ctx = RequestContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let res = ctx.run(tokio::time::sleep(Duration::from_secs(60))).await;
        assert!(matches!(res, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn deadline_exceeded() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(20));
        let res = ctx.run(tokio::time::sleep(Duration::from_secs(60))).await;
        assert!(matches!(res, Err(StoreError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn child_follows_parent() {
        let parent = RequestContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(child.is_cancelled());

        let parent = RequestContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn nested_timeout_keeps_earliest_deadline() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let outer = RequestContext::background().with_timeout(Duration::from_secs(1));
            let inner = outer.with_timeout(Duration::from_secs(30));
            assert_eq!(inner.deadline(), outer.deadline());
        });
    }
}
