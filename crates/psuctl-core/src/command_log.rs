//! Bounded log of the commands issued on behalf of each request.
//!
//! [`CommandLog`] maps a [`CorrelationId`] to the ordered list of SCPI
//! commands sent while serving that request. Ids are retained in insertion
//! order; once more than `capacity` ids are held, the oldest id is evicted
//! together with its whole command list. Entries are never removed when a
//! request completes.
//!
//! The log is shared between concurrently running request tasks. A single
//! mutex guards both the entries and the eviction order, so an append and
//! the eviction it may trigger happen as one step.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::correlation::CorrelationId;

/// Default number of correlation ids retained.
pub const DEFAULT_COMMAND_LOG_CAPACITY: usize = 10;

#[derive(Debug, Default)]
struct Entries {
    /// Ids in the order they were first logged, oldest first.
    order: VecDeque<CorrelationId>,
    commands: HashMap<CorrelationId, Vec<String>>,
}

/// Bounded, insertion-ordered map of correlation id to issued commands.
#[derive(Debug)]
pub struct CommandLog {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl CommandLog {
    /// Create a log that retains at most `capacity` correlation ids.
    ///
    /// A capacity of zero is raised to one so the most recent request is
    /// always inspectable.
    pub fn new(capacity: usize) -> Self {
        CommandLog {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Maximum number of retained correlation ids.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `command` to the log of `id`, evicting the oldest id if the
    /// log grows past its capacity.
    pub async fn record(&self, id: &CorrelationId, command: &str) {
        let mut entries = self.entries.lock().await;

        match entries.commands.get_mut(id) {
            Some(commands) => commands.push(command.to_string()),
            None => {
                entries.commands.insert(*id, vec![command.to_string()]);
                entries.order.push_back(*id);
            }
        }

        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.commands.remove(&oldest);
                tracing::trace!(correlation = %oldest, "evicted command log");
            }
        }
    }

    /// Commands logged under `id`, oldest first, or `None` if the id was
    /// never logged or has been evicted.
    pub async fn commands_for(&self, id: &CorrelationId) -> Option<Vec<String>> {
        self.entries.lock().await.commands.get(id).cloned()
    }

    /// Number of correlation ids currently retained.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.order.len()
    }

    /// Whether no commands have been logged (or all were evicted).
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_LOG_CAPACITY)
    }
}
