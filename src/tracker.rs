//! Message-pair tracking
//!
//! Each conversational turn owns at most two outgoing messages: the stage
//! prompt and an optional inline error. Their ids are remembered so stale
//! prompts can always be edited or removed. The ordering requirement around
//! these ids (delete the error before advancing a stage, send the next
//! prompt after) lives in the wizard engine; this type only keeps the pair
//! consistent in the store.

use crate::error::Result;
use crate::session::{SessionStore, TrackedMessages};
use std::sync::Arc;

pub struct MessageTracker<S: SessionStore> {
    store: Arc<S>,
}

impl<S: SessionStore> MessageTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user: i64) -> Result<TrackedMessages> {
        self.store.get_tracked(user).await
    }

    /// Record the stage prompt id, keeping any tracked error.
    pub async fn track_prompt(&self, user: i64, message_id: i64) -> Result<()> {
        let mut tracked = self.store.get_tracked(user).await?;
        tracked.prompt = Some(message_id);
        self.store.put_tracked(user, tracked).await
    }

    /// Record the inline error id, keeping the tracked prompt.
    pub async fn track_error(&self, user: i64, message_id: i64) -> Result<()> {
        let mut tracked = self.store.get_tracked(user).await?;
        tracked.error = Some(message_id);
        self.store.put_tracked(user, tracked).await
    }

    /// Drop the error slot only. Used once an invalid input is corrected.
    pub async fn clear_error(&self, user: i64) -> Result<()> {
        let mut tracked = self.store.get_tracked(user).await?;
        if tracked.error.take().is_some() {
            self.store.put_tracked(user, tracked).await?;
        }
        Ok(())
    }

    /// Drop both slots. Clearing when nothing is tracked is a no-op.
    pub async fn clear(&self, user: i64) -> Result<()> {
        self.store.clear_tracked(user).await
    }
}
