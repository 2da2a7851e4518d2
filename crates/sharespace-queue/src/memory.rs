//! In-process queue with SQS-like delivery semantics.
//!
//! Messages stay in the queue while in flight and become visible again when the
//! visibility timeout lapses without an ack. A message received more than
//! `max_receive_count` times is moved to the dead-letter list instead of being
//! delivered again.

use crate::traits::{Delivery, MigrationQueue, QueueError, QueueResult};
use crate::QueueBackend;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct Message {
    id: String,
    body: String,
    receive_count: u32,
    invisible_until: Option<Instant>,
    receipt: Option<String>,
}

impl Message {
    fn is_visible(&self, now: Instant) -> bool {
        match self.invisible_until {
            Some(until) => until <= now,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    messages: VecDeque<Message>,
    dead_letters: Vec<String>,
    next_id: u64,
    next_receipt: u64,
}

pub struct InMemoryQueue {
    state: Mutex<State>,
    notify: Notify,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            visibility_timeout,
            max_receive_count: max_receive_count.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Messages not yet acknowledged, in flight or not.
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bodies of all unacknowledged messages in queue order.
    pub fn pending_bodies(&self) -> Vec<String> {
        self.lock().messages.iter().map(|m| m.body.clone()).collect()
    }

    /// Bodies moved aside after exceeding the receive limit.
    pub fn dead_letters(&self) -> Vec<String> {
        self.lock().dead_letters.clone()
    }

    /// Take up to `max` visible messages, dead-lettering exhausted ones on the way.
    /// Returns the deliveries and, when none were found, the earliest instant a
    /// hidden message becomes visible again.
    fn take_visible(&self, max: usize) -> (Vec<Delivery>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.lock();
        let mut deliveries = Vec::new();
        let mut next_visible: Option<Instant> = None;
        let mut index = 0;

        while index < state.messages.len() && deliveries.len() < max {
            let message = &state.messages[index];
            if !message.is_visible(now) {
                if let Some(until) = message.invisible_until {
                    next_visible = Some(next_visible.map_or(until, |n| n.min(until)));
                }
                index += 1;
                continue;
            }

            if message.receive_count >= self.max_receive_count {
                if let Some(dead) = state.messages.remove(index) {
                    tracing::warn!(
                        message_id = %dead.id,
                        receive_count = dead.receive_count,
                        "Message exceeded receive limit, moved to dead-letter list"
                    );
                    state.dead_letters.push(dead.body);
                }
                continue;
            }

            state.next_receipt += 1;
            let receipt = format!("receipt-{}", state.next_receipt);
            let message = &mut state.messages[index];
            message.receive_count += 1;
            message.invisible_until = Some(now + self.visibility_timeout);
            message.receipt = Some(receipt.clone());
            deliveries.push(Delivery {
                message_id: message.id.clone(),
                receipt,
                receive_count: message.receive_count,
                body: message.body.clone(),
            });
            index += 1;
        }

        (deliveries, next_visible)
    }
}

#[async_trait]
impl MigrationQueue for InMemoryQueue {
    async fn publish(&self, body: &str) -> QueueResult<String> {
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = format!("msg-{}", state.next_id);
            state.messages.push_back(Message {
                id: id.clone(),
                body: body.to_string(),
                receive_count: 0,
                invisible_until: None,
                receipt: None,
            });
            id
        };
        self.notify.notify_waiters();
        tracing::debug!(message_id = %id, "Message published to in-memory queue");
        Ok(id)
    }

    async fn receive(&self, max_messages: u32, wait: Duration) -> QueueResult<Vec<Delivery>> {
        let max = max_messages.clamp(1, 10) as usize;
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (deliveries, next_visible) = self.take_visible(max);
            let now = Instant::now();
            if !deliveries.is_empty() || now >= deadline {
                return Ok(deliveries);
            }

            let wake_at = next_visible.map_or(deadline, |n| n.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, receipt: &str) -> QueueResult<()> {
        let mut state = self.lock();
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::InvalidReceipt(receipt.to_string()))?;
        state.messages.remove(position);
        Ok(())
    }

    async fn release(&self, receipt: &str) -> QueueResult<()> {
        {
            let mut state = self.lock();
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.receipt.as_deref() == Some(receipt))
                .ok_or_else(|| QueueError::InvalidReceipt(receipt.to_string()))?;
            message.invisible_until = None;
            message.receipt = None;
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn backend_type(&self) -> QueueBackend {
        QueueBackend::Memory
    }
}
