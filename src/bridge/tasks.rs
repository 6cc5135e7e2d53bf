use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::BridgeError;
use crate::emitter::{PointerEvent, VirtualPointer};
use crate::encoder::{ActionEvent, PressClassifier, RotationAccumulator, TimedEdge};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the device for the lifetime of the bridge and closes it on the way out.
pub(super) async fn run_emitter(
    mut pointer: VirtualPointer,
    mut events: mpsc::Receiver<PointerEvent>,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    info!("Emitter task started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => {
                    if let Err(e) = pointer.emit(&event) {
                        error!("Failed to emit {:?}: {}", event, e);
                    }
                }
                None => break,
            },
        }
    }

    events.close();
    pointer.close()?;
    info!("Emitter task finished");
    Ok(())
}

/// Waits for ticks, lets a burst settle for `window`, then drains it as one event.
pub(super) async fn run_drain_loop(
    accumulator: Arc<RotationAccumulator>,
    wake: Arc<Notify>,
    window: Duration,
    scale_factor: i32,
    output: mpsc::Sender<PointerEvent>,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    info!("Drain task started with {:?} window", window);

    let mut drains: u64 = 0;
    let mut motion_events: u64 = 0;
    let mut last_stats = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = wake.notified() => {}
        }

        if !window.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(window) => {}
            }
        }

        drains += 1;
        if let Some(motion) = accumulator.drain_and_scale(scale_factor) {
            motion_events += 1;
            if let Err(e) = output.send(PointerEvent::Motion(motion)).await {
                if shutdown.is_cancelled() {
                    break;
                }
                return Err(BridgeError::ChannelError(e.to_string()));
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            info!(
                "Drain stats: {} drains, {} motion events in {}s",
                drains,
                motion_events,
                last_stats.elapsed().as_secs()
            );
            drains = 0;
            motion_events = 0;
            last_stats = Instant::now();
        }
    }

    info!("Drain task finished");
    Ok(())
}

pub(super) struct ButtonLoop {
    pub classifier: PressClassifier,
    pub edges: mpsc::UnboundedReceiver<TimedEdge>,
    pub accumulator: Arc<RotationAccumulator>,
    pub scale_factor: i32,
    pub output: mpsc::Sender<PointerEvent>,
    pub shutdown: CancellationToken,
}

impl ButtonLoop {
    pub async fn run(mut self) -> Result<(), BridgeError> {
        let shutdown = self.shutdown.clone();
        info!(
            "Button task started with {:?} hold threshold",
            self.classifier.state().hold_threshold
        );

        loop {
            let deadline = self.classifier.hold_deadline();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                edge = self.edges.recv() => match edge {
                    Some(edge) => self.on_edge(edge).await?,
                    None => break,
                },
                _ = hold_timer(deadline) => {
                    // Edges stamped before the deadline must be seen first.
                    while let Ok(edge) = self.edges.try_recv() {
                        self.on_edge(edge).await?;
                    }
                    if let Some(action) = self.classifier.poll_hold(Instant::now()) {
                        self.apply(action).await?;
                    }
                }
            }
        }

        info!("Button task finished");
        Ok(())
    }

    async fn on_edge(&mut self, edge: TimedEdge) -> Result<(), BridgeError> {
        debug!("Button {:?}", edge.edge);
        match self.classifier.on_edge(edge) {
            Some(action) => self.apply(action).await,
            None => Ok(()),
        }
    }

    async fn apply(&mut self, action: ActionEvent) -> Result<(), BridgeError> {
        match action {
            ActionEvent::ToggleMode => {
                // Rotation before the toggle stays on the old axis.
                let (motion, axis) = self.accumulator.drain_and_toggle(self.scale_factor);
                info!("Axis switched to {:?}", axis);
                match motion {
                    Some(motion) => self.send(PointerEvent::Motion(motion)).await,
                    None => Ok(()),
                }
            }
            ActionEvent::Click => {
                info!("Hold detected, clicking");
                self.send(PointerEvent::Click).await
            }
        }
    }

    async fn send(&self, event: PointerEvent) -> Result<(), BridgeError> {
        match self.output.send(event).await {
            Ok(()) => Ok(()),
            // Emitter already stopped for shutdown
            Err(_) if self.shutdown.is_cancelled() => Ok(()),
            Err(e) => Err(BridgeError::ChannelError(e.to_string())),
        }
    }
}

async fn hold_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
