//! Transport abstraction for the push and pull exchanges.
//!
//! The network layer is a collaborator, not part of the engine: anything
//! that can carry a request/response pair (HTTP, gRPC, a test double)
//! implements [`SyncTransport`]. The engine assumes the server is
//! idempotent on `(record_id, operation)` - after a transport success whose
//! acknowledgement is lost, the same item is re-sent on the next cycle.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::protocol::{PullRequest, PullResponse, PushRequest, PushResponse};

/// Request/response channel to the authoritative server.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends a batch of local mutations.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Requests changes since the watermark.
    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;
}

// =============================================================================
// Mock Transport
// =============================================================================

/// Scripted [`SyncTransport`] for tests.
///
/// Push and pull responses are queued FIFO; when a queue runs dry the most
/// recently queued response is repeated. Requests are recorded for
/// assertion. `fail_push`/`fail_pull` inject transport-level errors.
#[derive(Default)]
pub struct MockTransport {
    push_responses: Mutex<Vec<PushResponse>>,
    pull_responses: Mutex<Vec<PullResponse>>,
    push_requests: Mutex<Vec<PushRequest>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    fail_push: Mutex<Option<String>>,
    fail_pull: Mutex<Option<String>>,
}

impl MockTransport {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a push response.
    pub fn enqueue_push_response(&self, response: PushResponse) {
        self.push_responses.lock().push(response);
    }

    /// Queues a pull response.
    pub fn enqueue_pull_response(&self, response: PullResponse) {
        self.pull_responses.lock().push(response);
    }

    /// Makes every subsequent push fail with a transport error.
    pub fn fail_push_with(&self, message: impl Into<String>) {
        *self.fail_push.lock() = Some(message.into());
    }

    /// Makes every subsequent pull fail with a transport error.
    pub fn fail_pull_with(&self, message: impl Into<String>) {
        *self.fail_pull.lock() = Some(message.into());
    }

    /// Clears injected failures.
    pub fn heal(&self) {
        *self.fail_push.lock() = None;
        *self.fail_pull.lock() = None;
    }

    /// Push requests seen so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    /// Pull requests seen so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    /// Number of push calls that reached the transport.
    pub fn push_calls(&self) -> usize {
        self.push_requests.lock().len()
    }

    /// Number of pull calls that reached the transport.
    pub fn pull_calls(&self) -> usize {
        self.pull_requests.lock().len()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.push_requests.lock().push(request.clone());

        if let Some(message) = self.fail_push.lock().clone() {
            return Err(SyncError::Transport(message));
        }

        let mut responses = self.push_responses.lock();
        if responses.is_empty() {
            return Err(SyncError::Transport("no scripted push response".into()));
        }
        if responses.len() == 1 {
            Ok(responses[0].clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pull_requests.lock().push(request.clone());

        if let Some(message) = self.fail_pull.lock().clone() {
            return Err(SyncError::Transport(message));
        }

        let mut responses = self.pull_responses.lock();
        if responses.is_empty() {
            return Err(SyncError::Transport("no scripted pull response".into()));
        }
        if responses.len() == 1 {
            Ok(responses[0].clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_drain_fifo_then_repeat() {
        let transport = MockTransport::new();
        transport.enqueue_pull_response(PullResponse {
            timestamp: 1,
            changes: Default::default(),
        });
        transport.enqueue_pull_response(PullResponse {
            timestamp: 2,
            changes: Default::default(),
        });

        let request = PullRequest {
            last_sync_at: None,
            tables: vec![],
        };

        assert_eq!(transport.pull(&request).await.unwrap().timestamp, 1);
        assert_eq!(transport.pull(&request).await.unwrap().timestamp, 2);
        // last response repeats
        assert_eq!(transport.pull(&request).await.unwrap().timestamp, 2);
        assert_eq!(transport.pull_calls(), 3);
    }

    #[tokio::test]
    async fn injected_failure_and_heal() {
        let transport = MockTransport::new();
        transport.enqueue_push_response(PushResponse {
            success: true,
            results: vec![],
        });
        transport.fail_push_with("Network error");

        let request = PushRequest { changes: vec![] };
        let err = transport.push(&request).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(ref m) if m == "Network error"));

        transport.heal();
        assert!(transport.push(&request).await.is_ok());
    }
}
