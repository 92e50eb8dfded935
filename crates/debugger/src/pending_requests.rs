//! Tracking requests that are waiting for a reply
//!
//! The protocol has no sequence numbers, so replies are matched to the oldest
//! outstanding request whose reply words include the word that arrived.

use std::collections::VecDeque;
use std::time::Instant;

use transport::{Request, Word};

#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub(crate) request: Request,
    pub(crate) sent_at: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    queue: VecDeque<PendingRequest>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a request that was just written, if it expects a reply.
    pub(crate) fn push(&mut self, request: Request) {
        if request.reply_words().is_empty() {
            return;
        }
        self.queue.push_back(PendingRequest {
            request,
            sent_at: Instant::now(),
        });
    }

    /// Remove and return the oldest request answered by `word`.
    pub(crate) fn take(&mut self, word: Word) -> Option<PendingRequest> {
        let index = self
            .queue
            .iter()
            .position(|pending| pending.request.reply_words().contains(&word))?;
        let pending = self.queue.remove(index)?;
        tracing::trace!(
            %word,
            waited = ?pending.sent_at.elapsed(),
            "matched reply to pending request"
        );
        Some(pending)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        if !self.queue.is_empty() {
            tracing::debug!(count = self.queue.len(), "dropping unanswered requests");
        }
        self.queue.clear();
    }
}
