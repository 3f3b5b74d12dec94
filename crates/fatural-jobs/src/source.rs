//! Message sources for the pull worker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use fatural_core::{Error, Result};

/// A message leased from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Lease handle used to ack or nack.
    pub ack_id: String,
    pub message_id: String,
    /// Decoded payload bytes.
    pub data: Vec<u8>,
}

/// At-least-once queue the worker pulls from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Lease up to `max` messages. An empty result means the queue is idle.
    async fn pull(&self, max: usize) -> Result<Vec<ReceivedMessage>>;

    /// Settle messages as done.
    async fn ack(&self, ack_ids: &[String]) -> Result<()>;

    /// Release messages for redelivery.
    async fn nack(&self, ack_ids: &[String]) -> Result<()>;
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ReceivedMessage>,
    leased: Vec<ReceivedMessage>,
    acked: Vec<String>,
    nacked: Vec<String>,
    next_id: u64,
}

/// In-process queue with redelivery on nack. Cloning shares the queue.
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<QueueState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("queue lock poisoned".to_string()))
    }

    /// Enqueue a payload; returns its message id.
    pub fn publish(&self, data: impl Into<Vec<u8>>) -> Result<String> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let message_id = format!("msg-{}", state.next_id);
        state.pending.push_back(ReceivedMessage {
            ack_id: format!("{}-ack", message_id),
            message_id: message_id.clone(),
            data: data.into(),
        });
        Ok(message_id)
    }

    /// Message ids acknowledged so far, in order.
    pub fn acked(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.acked.clone())
    }

    /// Message ids nacked so far, in order.
    pub fn nacked(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.nacked.clone())
    }

    /// Messages neither acked nor leased.
    pub fn pending_len(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    fn settle(&self, ack_ids: &[String], requeue: bool) -> Result<()> {
        let mut state = self.lock()?;
        for ack_id in ack_ids {
            let Some(pos) = state.leased.iter().position(|m| &m.ack_id == ack_id) else {
                continue;
            };
            let message = state.leased.remove(pos);
            if requeue {
                state.nacked.push(message.message_id.clone());
                state.pending.push_back(message);
            } else {
                state.acked.push(message.message_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn pull(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let mut state = self.lock()?;
        let n = max.min(state.pending.len());
        let batch: Vec<_> = state.pending.drain(..n).collect();
        state.leased.extend(batch.iter().cloned());
        Ok(batch)
    }

    async fn ack(&self, ack_ids: &[String]) -> Result<()> {
        self.settle(ack_ids, false)
    }

    async fn nack(&self, ack_ids: &[String]) -> Result<()> {
        self.settle(ack_ids, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pull_ack_nack() {
        let source = MemorySource::new();
        let a = source.publish(b"a".to_vec()).unwrap();
        let b = source.publish(b"b".to_vec()).unwrap();

        let batch = source.pull(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(source.pending_len().unwrap(), 0);

        source.ack(&[batch[0].ack_id.clone()]).await.unwrap();
        source.nack(&[batch[1].ack_id.clone()]).await.unwrap();

        assert_eq!(source.acked().unwrap(), vec![a]);
        assert_eq!(source.nacked().unwrap(), vec![b.clone()]);
        let redelivered = source.pull(10).await.unwrap();
        assert_eq!(redelivered[0].message_id, b);
    }

    #[tokio::test]
    async fn test_pull_respects_max() {
        let source = MemorySource::new();
        for i in 0..5u8 {
            source.publish(vec![i]).unwrap();
        }
        assert_eq!(source.pull(3).await.unwrap().len(), 3);
        assert_eq!(source.pending_len().unwrap(), 2);
    }
}
