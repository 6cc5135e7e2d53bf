//! Bridge lifecycle
//!
//! Wires the encoder state to the virtual pointer and runs it until shutdown. The
//! lifecycle is a typestate machine:
//!
//! ```text
//! Bridge<Initializing> ──start()──► Bridge<Running> ──run_until()──► closed
//! ```
//!
//! `create` builds the device through the supplied factory, so a bridge that exists
//! always owns a live device. From then on the device is released exactly once: by the
//! emitter task on shutdown, or by the [`VirtualPointer`] guard if the bridge is
//! dropped on an error path.

use statum::{machine, state};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::input::{ButtonInput, RotationInput};
use super::tasks::{run_drain_loop, run_emitter, ButtonLoop};
use crate::config::{BridgeConfig, ConfigError};
use crate::emitter::{DeviceCapabilities, EmitterError, EventEmitter, VirtualPointer};
use crate::encoder::{
    timer_handle, ClassifierError, PressClassifier, RotationAccumulator, TimedEdge,
};

// Buffer between the producing tasks and the device
const OUTPUT_CAPACITY: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Emitter error: {0}")]
    Emitter(#[from] EmitterError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Initializing,
    Running,
}

#[machine]
#[derive(Debug)]
pub struct Bridge<S: BridgeState> {
    config: BridgeConfig,

    // Shared with the GPIO callbacks through RotationInput
    accumulator: Arc<RotationAccumulator>,
    wake: Arc<Notify>,

    edge_sender: mpsc::UnboundedSender<TimedEdge>,
    edge_receiver: Option<mpsc::UnboundedReceiver<TimedEdge>>,

    // Moves into the emitter task on start
    pointer: Option<VirtualPointer>,

    shutdown: CancellationToken,
    tasks: JoinSet<Result<(), BridgeError>>,
}

impl<S: BridgeState> Bridge<S> {
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn rotation_input(&self) -> RotationInput {
        RotationInput::new(self.accumulator.clone(), self.wake.clone())
    }

    pub fn button_input(&self) -> ButtonInput {
        ButtonInput::new(self.edge_sender.clone())
    }
}

impl Bridge<Initializing> {
    /// Validates `config` and creates the virtual device through `create_device`.
    pub fn create<E, F>(config: BridgeConfig, create_device: F) -> Result<Self, BridgeError>
    where
        E: EventEmitter + 'static,
        F: FnOnce(&DeviceCapabilities) -> Result<E, EmitterError>,
    {
        config.validate()?;
        info!("Creating bridge with config: {:?}", config);

        let emitter = create_device(&config.capabilities())?;
        let pointer = VirtualPointer::new(Box::new(emitter));
        debug!("Virtual device created");

        let (edge_sender, edge_receiver) = mpsc::unbounded_channel();

        Ok(Self::new(
            config,
            Arc::new(RotationAccumulator::new()),
            Arc::new(Notify::new()),
            edge_sender,
            Some(edge_receiver),
            Some(pointer),
            CancellationToken::new(),
            JoinSet::new(),
        ))
    }

    /// Spawns the emitter, drain and button tasks.
    ///
    /// Fails with [`ClassifierError::ClockUnavailable`] when no timer runtime is
    /// available; the device is still released when the bridge is dropped.
    pub fn start(mut self) -> Result<Bridge<Running>, BridgeError> {
        let runtime = timer_handle()?;

        let (pointer, edges) = match (self.pointer.take(), self.edge_receiver.take()) {
            (Some(pointer), Some(edges)) => (pointer, edges),
            _ => {
                return Err(BridgeError::TaskFailed(
                    "bridge resources already taken".to_string(),
                ))
            }
        };
        let (output, output_receiver) = mpsc::channel(OUTPUT_CAPACITY);
        debug!("Created output channel with capacity {}", OUTPUT_CAPACITY);

        info!("Spawning emitter task");
        self.tasks.spawn_on(
            run_emitter(pointer, output_receiver, self.shutdown.clone()),
            &runtime,
        );

        info!("Spawning drain task");
        self.tasks.spawn_on(
            run_drain_loop(
                self.accumulator.clone(),
                self.wake.clone(),
                self.config.drain_interval(),
                self.config.scale_factor,
                output.clone(),
                self.shutdown.clone(),
            ),
            &runtime,
        );

        info!("Spawning button task");
        let button_loop = ButtonLoop {
            classifier: PressClassifier::new(self.config.hold_threshold()),
            edges,
            accumulator: self.accumulator.clone(),
            scale_factor: self.config.scale_factor,
            output,
            shutdown: self.shutdown.clone(),
        };
        self.tasks.spawn_on(button_loop.run(), &runtime);

        info!("Bridge running");
        Ok(self.transition())
    }
}

impl Bridge<Running> {
    /// Runs until `signal` resolves or a task fails, then stops every task.
    ///
    /// Once this begins shutting down nothing else reaches the device.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        let mut first_error = None;

        tokio::select! {
            _ = signal => info!("Shutdown requested"),
            Some(joined) = self.tasks.join_next() => {
                warn!("A bridge task stopped early, shutting down");
                first_error = task_error(joined);
            }
        }

        self.shutdown.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(e) = task_error(joined) {
                error!("Bridge task failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        info!("Bridge stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn task_error(
    joined: Result<Result<(), BridgeError>, tokio::task::JoinError>,
) -> Option<BridgeError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => Some(BridgeError::TaskFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::testing::RecordingEmitter;
    use crate::emitter::PointerEvent;
    use crate::encoder::{Axis, ButtonEdge, Direction, MotionEvent};
    use std::time::Duration;
    use tokio::time::sleep;

    fn config(drain_interval_ms: u64) -> BridgeConfig {
        BridgeConfig {
            scale_factor: 10,
            hold_threshold_ms: 500,
            drain_interval_ms,
            ..BridgeConfig::default()
        }
    }

    fn start(config: BridgeConfig) -> (Bridge<Running>, RecordingEmitter) {
        let recorder = RecordingEmitter::default();
        let device = recorder.clone();
        let bridge = Bridge::create(config, move |_| Ok(device))
            .unwrap()
            .start()
            .unwrap();
        (bridge, recorder)
    }

    fn motion(axis: Axis, delta: i32) -> PointerEvent {
        PointerEvent::Motion(MotionEvent { axis, delta })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_become_scaled_motion() {
        let (bridge, recorder) = start(config(8));
        let rotation = bridge.rotation_input();

        for _ in 0..3 {
            rotation.tick(Direction::Clockwise);
        }
        sleep(Duration::from_millis(50)).await;
        rotation.tick(Direction::CounterClockwise);
        sleep(Duration::from_millis(50)).await;

        assert_eq!(recorder.events(), vec![motion(Axis::X, 30), motion(Axis::X, -10)]);
        bridge.run_until(async {}).await.unwrap();
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_is_one_event() {
        let (bridge, recorder) = start(config(20));
        let rotation = bridge.rotation_input();

        for i in 0..1000 {
            rotation.tick(if i % 3 == 0 {
                Direction::CounterClockwise
            } else {
                Direction::Clockwise
            });
        }
        sleep(Duration::from_millis(100)).await;

        // 666 clockwise, 334 counter-clockwise
        assert_eq!(recorder.events(), vec![motion(Axis::X, 3320)]);
        bridge.run_until(async {}).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn short_press_switches_axis_for_later_ticks_only() {
        let (bridge, recorder) = start(config(100));
        let rotation = bridge.rotation_input();
        let button = bridge.button_input();

        rotation.tick(Direction::Clockwise);
        rotation.tick(Direction::Clockwise);
        button.edge(ButtonEdge::Pressed);
        sleep(Duration::from_millis(10)).await;
        button.edge(ButtonEdge::Released);
        sleep(Duration::from_millis(10)).await;
        rotation.tick(Direction::Clockwise);
        sleep(Duration::from_millis(300)).await;

        assert_eq!(recorder.events(), vec![motion(Axis::X, 20), motion(Axis::Y, 10)]);
        bridge.run_until(async {}).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn hold_clicks_once_and_keeps_axis() {
        let (bridge, recorder) = start(config(8));
        let rotation = bridge.rotation_input();
        let button = bridge.button_input();

        button.edge(ButtonEdge::Pressed);
        sleep(Duration::from_millis(600)).await;
        assert_eq!(recorder.events(), vec![PointerEvent::Click]);

        sleep(Duration::from_millis(2000)).await;
        button.edge(ButtonEdge::Released);
        rotation.tick(Direction::Clockwise);
        sleep(Duration::from_millis(50)).await;

        assert_eq!(
            recorder.events(),
            vec![PointerEvent::Click, motion(Axis::X, 10)]
        );
        bridge.run_until(async {}).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_then_hold_scenario() {
        let (bridge, recorder) = start(config(8));
        let rotation = bridge.rotation_input();
        let button = bridge.button_input();

        button.edge(ButtonEdge::Pressed);
        sleep(Duration::from_millis(400)).await;
        button.edge(ButtonEdge::Released);
        sleep(Duration::from_millis(600)).await;
        assert!(recorder.events().is_empty());

        button.edge(ButtonEdge::Pressed);
        sleep(Duration::from_millis(600)).await;
        button.edge(ButtonEdge::Released);
        rotation.tick(Direction::CounterClockwise);
        sleep(Duration::from_millis(50)).await;

        assert_eq!(
            recorder.events(),
            vec![PointerEvent::Click, motion(Axis::Y, -10)]
        );
        bridge.run_until(async {}).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_emitted_after_shutdown() {
        let (bridge, recorder) = start(config(8));
        let rotation = bridge.rotation_input();
        let button = bridge.button_input();

        bridge.run_until(async {}).await.unwrap();
        rotation.tick(Direction::Clockwise);
        button.edge(ButtonEdge::Pressed);
        sleep(Duration::from_millis(1000)).await;

        assert!(recorder.events().is_empty());
        assert_eq!(recorder.closes(), 1);
    }

    #[test]
    fn device_creation_failure_is_reported() {
        let result = Bridge::create(BridgeConfig::default(), |_| -> Result<RecordingEmitter, _> {
            Err(EmitterError::DeviceCreationFailed("no uinput".to_string()))
        });
        assert!(matches!(
            result,
            Err(BridgeError::Emitter(EmitterError::DeviceCreationFailed(_)))
        ));
    }

    #[test]
    fn invalid_config_never_creates_a_device() {
        let bad = BridgeConfig {
            scale_factor: 0,
            ..BridgeConfig::default()
        };
        let mut called = false;
        let result = Bridge::create(bad, |_| {
            called = true;
            Ok(RecordingEmitter::default())
        });
        assert!(matches!(result, Err(BridgeError::Config(_))));
        assert!(!called);
    }

    #[test]
    fn start_without_timer_fails_closed() {
        let recorder = RecordingEmitter::default();
        let device = recorder.clone();
        let bridge = Bridge::create(BridgeConfig::default(), move |_| Ok(device)).unwrap();

        let result = bridge.start();
        assert!(matches!(
            result,
            Err(BridgeError::Classifier(ClassifierError::ClockUnavailable(_)))
        ));
        drop(result);
        assert!(recorder.events().is_empty());
        assert_eq!(recorder.closes(), 1);
    }

    #[test]
    fn start_on_runtime_without_timers_fails_closed() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let recorder = RecordingEmitter::default();
        let device = recorder.clone();
        let bridge = Bridge::create(BridgeConfig::default(), move |_| Ok(device)).unwrap();

        let result = bridge.start();
        assert!(matches!(
            result,
            Err(BridgeError::Classifier(ClassifierError::ClockUnavailable(_)))
        ));
        drop(result);
        assert!(recorder.events().is_empty());
        assert_eq!(recorder.closes(), 1);
    }

    #[tokio::test]
    async fn capabilities_follow_config() {
        let config = BridgeConfig {
            device_name: "Knob".to_string(),
            ..BridgeConfig::default()
        };
        let mut seen = None;
        let bridge = Bridge::create(config, |caps| {
            seen = Some(caps.clone());
            Ok(RecordingEmitter::default())
        })
        .unwrap();

        assert_eq!(seen.map(|c| c.name), Some("Knob".to_string()));
        assert_eq!(bridge.config().device_name, "Knob");
    }
}
