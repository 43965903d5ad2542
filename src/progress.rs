//! Progress reporting and cancellation for clustering batches.
//!
//! Observers are passed into each batch call and only live for that call. Events
//! arrive in zoom order, finest level first.

use crate::ZoomLevel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    ZoomLevelStarted {
        level: ZoomLevel,
    },
    ZoomLevelFinished {
        level: ZoomLevel,
        /// Items represented by this level's clusters once the level settled
        feature_count: usize,
        cluster_count: usize,
        elapsed: Duration,
    },
    BatchFinished {
        total_duration: Duration,
        /// Clusters across every level of the pyramid
        total_clusters: usize,
        total_features: usize,
    },
    /// The caller's loader failed; the batch is processed as empty.
    LoadFailed { message: String },
}

pub trait ProgressObserver {
    fn on_event(&mut self, event: ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: FnMut(ProgressEvent),
{
    fn on_event(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Observer that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_event(&mut self, _event: ProgressEvent) {}
}

/// Observer forwarding events into a channel, for batches running on another thread.
///
/// A disconnected receiver is not an error; the batch simply runs unobserved.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl From<Sender<ProgressEvent>> for ChannelObserver {
    fn from(sender: Sender<ProgressEvent>) -> Self {
        Self::new(sender)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&mut self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("progress receiver dropped");
        }
    }
}

/// Cooperative cancellation flag shared between a batch and whoever may stop it.
///
/// Checked between items at the finest level only. Items already inserted when the
/// flag is raised are still propagated through the whole pyramid.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
