// =====================================================================================
// STREAM CLIENT - ASYNC DRIVER FOR THE RECONNECT MACHINE
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use shared_models::{AlertChanged, Heartbeat, Metric};

use crate::models::{ClientSnapshot, ReconnectConfig, SseFrame, StreamEvent};
use crate::services::reconnect::{Command, Input, ReconnectMachine, TimerId, TimerPurpose};
use crate::services::transport::StreamTransport;

/// UI-facing hooks. All methods default to no-ops.
pub trait StreamCallbacks: Send + Sync + 'static {
    fn on_metric(&self, _metric: Metric) {}
    fn on_alert(&self, _alert: AlertChanged) {}
    fn on_ping(&self, _heartbeat: Heartbeat) {}
    fn on_open(&self) {}
    fn on_close(&self) {}
    fn on_fallback(&self, _active: bool) {}
}

enum Control {
    Reconnect,
    Close(oneshot::Sender<()>),
}

enum DriverEvent {
    Connected { generation: u64 },
    Frame { generation: u64, frame: SseFrame },
    Lost { generation: u64 },
    Timer(TimerPurpose, TimerId),
}

/// Handle to a running stream client. Dropping it closes the driver the same
/// way `close()` does, without waiting for the shutdown to finish.
pub struct StreamClient {
    control: mpsc::UnboundedSender<Control>,
    snapshot: watch::Receiver<ClientSnapshot>,
}

impl StreamClient {
    /// Starts connecting immediately.
    pub fn spawn<T: StreamTransport>(
        transport: T,
        config: ReconnectConfig,
        callbacks: Arc<dyn StreamCallbacks>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let machine = ReconnectMachine::new(config);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let driver = Driver {
            machine,
            transport: Arc::new(transport),
            callbacks,
            events_tx,
            snapshot_tx,
            timers: HashMap::new(),
            connection: None,
            generation: 0,
        };
        tokio::spawn(driver.run(control_rx, events_rx));

        Self {
            control: control_tx,
            snapshot: snapshot_rx,
        }
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    /// Resets the attempt counter and dials now, from any state but closed.
    pub fn reconnect(&self) {
        let _ = self.control.send(Control::Reconnect);
    }

    /// Returns once every timer is aborted and the transport dropped.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.control.send(Control::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

struct Driver<T: StreamTransport> {
    machine: ReconnectMachine,
    transport: Arc<T>,
    callbacks: Arc<dyn StreamCallbacks>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    snapshot_tx: watch::Sender<ClientSnapshot>,
    timers: HashMap<TimerPurpose, (TimerId, JoinHandle<()>)>,
    connection: Option<JoinHandle<()>>,
    generation: u64,
}

impl<T: StreamTransport> Driver<T> {
    async fn run(
        mut self,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
        mut events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    ) {
        self.apply(Input::Start);

        loop {
            tokio::select! {
                biased;
                control = control_rx.recv() => match control {
                    Some(Control::Reconnect) => self.apply(Input::Reconnect),
                    Some(Control::Close(ack)) => {
                        self.apply(Input::Close);
                        self.shutdown();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.apply(Input::Close);
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = events_rx.recv() => self.on_event(event),
            }
        }
        debug!("Stream client driver stopped");
    }

    fn on_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Timer(purpose, id) => {
                if self.timers.get(&purpose).map(|(armed, _)| *armed) == Some(id) {
                    self.timers.remove(&purpose);
                }
                self.apply(Input::TimerFired(purpose, id));
            }
            DriverEvent::Connected { generation } if generation == self.generation => {
                self.apply(Input::Connected);
            }
            DriverEvent::Lost { generation } if generation == self.generation => {
                self.connection = None;
                self.apply(Input::TransportError);
            }
            DriverEvent::Frame { generation, frame } if generation == self.generation => {
                self.on_frame(frame);
            }
            _ => debug!("Dropping event from a previous connection"),
        }
    }

    fn on_frame(&mut self, frame: SseFrame) {
        match StreamEvent::decode(&frame) {
            Ok(StreamEvent::Ping(heartbeat)) => {
                self.apply(Input::Heartbeat { t: heartbeat.t });
                self.callbacks.on_ping(heartbeat);
            }
            Ok(StreamEvent::Metric(metric)) => {
                self.apply(Input::Data);
                self.callbacks.on_metric(metric);
            }
            Ok(StreamEvent::Alert(alert)) => {
                self.apply(Input::Data);
                self.callbacks.on_alert(alert);
            }
            Ok(StreamEvent::Other(_)) => self.apply(Input::Data),
            Err(e) => {
                self.apply(Input::Data);
                warn!(error = %e, "Ignoring malformed stream payload");
            }
        }
    }

    fn apply(&mut self, input: Input) {
        for command in self.machine.handle(input) {
            self.execute(command);
        }
        let mut snapshot = self.machine.snapshot();
        snapshot.timers_armed = self.timers.len();
        self.snapshot_tx.send_replace(snapshot);
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Connect => self.open_connection(),
            Command::Disconnect => {
                if let Some(connection) = self.connection.take() {
                    connection.abort();
                }
            }
            Command::ArmTimer { purpose, id, delay } => {
                let events = self.events_tx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(DriverEvent::Timer(purpose, id));
                });
                if let Some((_, previous)) = self.timers.insert(purpose, (id, handle)) {
                    previous.abort();
                }
            }
            Command::CancelTimer { purpose, id } => {
                if self.timers.get(&purpose).map(|(armed, _)| *armed) == Some(id) {
                    if let Some((_, handle)) = self.timers.remove(&purpose) {
                        handle.abort();
                    }
                }
            }
            Command::NotifyOpen => self.callbacks.on_open(),
            Command::NotifyFallback(active) => self.callbacks.on_fallback(active),
            Command::NotifyClosed => self.callbacks.on_close(),
        }
    }

    fn open_connection(&mut self) {
        if let Some(previous) = self.connection.take() {
            previous.abort();
        }
        self.generation += 1;
        let generation = self.generation;
        let transport = self.transport.clone();
        let events = self.events_tx.clone();

        self.connection = Some(tokio::spawn(async move {
            let mut frames = match transport.connect().await {
                Ok(frames) => frames,
                Err(e) => {
                    debug!(error = %e, "Stream connect failed");
                    let _ = events.send(DriverEvent::Lost { generation });
                    return;
                }
            };
            let _ = events.send(DriverEvent::Connected { generation });

            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) => {
                        if events.send(DriverEvent::Frame { generation, frame }).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Stream transport error");
                        break;
                    }
                }
            }
            let _ = events.send(DriverEvent::Lost { generation });
        }));
    }

    fn shutdown(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        let mut snapshot = self.machine.snapshot();
        snapshot.timers_armed = 0;
        self.snapshot_tx.send_replace(snapshot);
    }
}
