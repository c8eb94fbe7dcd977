//! In-memory provider double for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmResult, Usage};

/// A scripted provider: returns queued replies in order (repeating the last
/// one when the queue runs dry), records requests, counts calls.
pub struct MockProvider {
    name: String,
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicU32,
    fail: bool,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            fail: false,
        }
    }

    /// Queue a reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(text.into());
        self
    }

    /// Make every call fail.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of completed `complete` calls (including failures).
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        if self.fail {
            return Err(LlmError::Unavailable("mock configured to fail".into()));
        }

        let text = {
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.pop_front().unwrap_or_default()
            } else {
                replies.front().cloned().unwrap_or_else(|| "ok".to_string())
            }
        };

        Ok(CompletionResponse {
            content: text,
            model: "mock".to_string(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }
}
