//! Per-conversation serialization of inbound updates.
//!
//! Each conversation with pending work has one worker task that drains its
//! queue in order. Different conversations run in parallel. `/cancel` goes
//! into a priority lane and overtakes anything still queued behind the update
//! currently being handled.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::channels::{ConversationKey, InboundUpdate};

use super::engine::IntakeEngine;
use super::event::Event;

#[derive(Default)]
struct Lane {
    priority: VecDeque<InboundUpdate>,
    normal: VecDeque<InboundUpdate>,
}

impl Lane {
    fn push(&mut self, update: InboundUpdate) {
        if matches!(Event::from_update(&update), Event::Cancel) {
            self.priority.push_back(update);
        } else {
            self.normal.push_back(update);
        }
    }

    fn pop(&mut self) -> Option<InboundUpdate> {
        self.priority.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }
}

/// Routes updates to per-conversation workers.
///
/// A key is present in `lanes` exactly while its worker is running.
#[derive(Clone)]
pub struct ConversationRouter {
    engine: Arc<IntakeEngine>,
    lanes: Arc<Mutex<HashMap<ConversationKey, Lane>>>,
    idle: Arc<Notify>,
}

impl ConversationRouter {
    pub fn new(engine: Arc<IntakeEngine>) -> Self {
        Self {
            engine,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Queue an update. Returns the worker handle if a new worker was spawned
    /// for this conversation.
    pub async fn submit(&self, update: InboundUpdate) -> Option<JoinHandle<()>> {
        let key = update.key();
        let mut lanes = self.lanes.lock().await;

        if let Some(lane) = lanes.get_mut(&key) {
            lane.push(update);
            tracing::trace!(%key, queued = lane.len(), "Queued behind running worker");
            return None;
        }

        lanes.insert(key, Lane::default());
        drop(lanes);

        let router = self.clone();
        Some(tokio::spawn(async move { router.run_worker(key, update).await }))
    }

    /// Wait until every worker has drained its queue.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lanes.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }

    async fn run_worker(&self, key: ConversationKey, first: InboundUpdate) {
        let mut next = Some(first);
        while let Some(update) = next {
            if let Err(e) = self.engine.handle(&update).await {
                tracing::error!(%key, "Failed to handle update: {e}");
            }

            let mut lanes = self.lanes.lock().await;
            next = lanes.get_mut(&key).and_then(Lane::pop);
            if next.is_none() {
                lanes.remove(&key);
                if lanes.is_empty() {
                    self.idle.notify_waiters();
                }
            }
        }
    }
}
