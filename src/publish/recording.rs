use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{PublishError, Publisher};
use crate::event::SyncEvent;

#[derive(Default)]
struct Script {
    published: Vec<SyncEvent>,
    attempts: usize,
    /// Outcomes to return before falling back to `default_failure`.
    queued: VecDeque<Option<PublishError>>,
    default_failure: Option<PublishError>,
}

/// A publisher that records what it was given and fails on demand.
///
/// Clones share the same record, so a test can keep one handle while the
/// dispatcher owns another.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    script: Arc<Mutex<Script>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` attempts with `error`, then go back to the default.
    pub fn fail_next(&self, times: usize, error: PublishError) {
        if let Ok(mut script) = self.script.lock() {
            script
                .queued
                .extend(std::iter::repeat(Some(error)).take(times));
        }
    }

    /// Fail every attempt not covered by `fail_next`.
    pub fn fail_always(&self, error: PublishError) {
        if let Ok(mut script) = self.script.lock() {
            script.default_failure = Some(error);
        }
    }

    /// Stop failing.
    pub fn recover(&self) {
        if let Ok(mut script) = self.script.lock() {
            script.queued.clear();
            script.default_failure = None;
        }
    }

    /// Events delivered successfully, in delivery order.
    pub fn published(&self) -> Vec<SyncEvent> {
        self.script
            .lock()
            .map(|script| script.published.clone())
            .unwrap_or_default()
    }

    /// Every call to `publish`, successful or not.
    pub fn attempts(&self) -> usize {
        self.script
            .lock()
            .map(|script| script.attempts)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, event: &SyncEvent) -> Result<(), PublishError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| PublishError::Other("recording publisher poisoned".into()))?;
        script.attempts += 1;

        let failure = match script.queued.pop_front() {
            Some(outcome) => outcome,
            None => script.default_failure.clone(),
        };
        if let Some(err) = failure {
            return Err(err);
        }

        script.published.push(event.clone());
        Ok(())
    }
}
