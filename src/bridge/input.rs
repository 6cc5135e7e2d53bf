use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::encoder::{ButtonEdge, Direction, RotationAccumulator, TimedEdge};

/// Entry point for rotation ticks. Safe to call from any thread; never blocks.
#[derive(Debug, Clone)]
pub struct RotationInput {
    accumulator: Arc<RotationAccumulator>,
    wake: Arc<Notify>,
}

impl RotationInput {
    pub(crate) fn new(accumulator: Arc<RotationAccumulator>, wake: Arc<Notify>) -> Self {
        Self { accumulator, wake }
    }

    pub fn tick(&self, direction: Direction) {
        self.accumulator.on_tick(direction);
        self.wake.notify_one();
        trace!("Tick {:?}", direction);
    }
}

/// Entry point for button edges. Edges are stamped on arrival and queued for the
/// button task.
#[derive(Debug, Clone)]
pub struct ButtonInput {
    sender: mpsc::UnboundedSender<TimedEdge>,
}

impl ButtonInput {
    pub(crate) fn new(sender: mpsc::UnboundedSender<TimedEdge>) -> Self {
        Self { sender }
    }

    pub fn edge(&self, edge: ButtonEdge) {
        self.edge_at(edge, Instant::now());
    }

    pub fn edge_at(&self, edge: ButtonEdge, at: Instant) {
        // Only fails once the bridge has shut down
        if let Err(e) = self.sender.send(TimedEdge { edge, at }) {
            debug!("Button task is gone, dropping {:?}", e.0.edge);
        }
    }
}
