// =====================================================================================
// RECONNECT STATE MACHINE
// =====================================================================================
//
// Sans-IO core of the stream client. Inputs describe what happened (transport
// events, timer expiries, user calls); the returned commands describe what the
// driver must do. The machine never sleeps or touches a socket.
//
// =====================================================================================

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::models::{ClientSnapshot, ConnectionState, ReconnectConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    Backoff,
    Polling,
    Staleness,
}

impl TimerPurpose {
    pub const ALL: [TimerPurpose; 3] = [TimerPurpose::Backoff, TimerPurpose::Polling, TimerPurpose::Staleness];

    fn slot(self) -> usize {
        match self {
            TimerPurpose::Backoff => 0,
            TimerPurpose::Polling => 1,
            TimerPurpose::Staleness => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Start,
    Connected,
    TransportError,
    Heartbeat { t: i64 },
    /// Any non-heartbeat frame.
    Data,
    TimerFired(TimerPurpose, TimerId),
    Reconnect,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    ArmTimer {
        purpose: TimerPurpose,
        id: TimerId,
        delay: Duration,
    },
    CancelTimer {
        purpose: TimerPurpose,
        id: TimerId,
    },
    NotifyOpen,
    NotifyFallback(bool),
    NotifyClosed,
}

/// `min(max_delay, base * 2^attempt) + jitter`, clamped at zero.
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32, jitter_ms: i64) -> Duration {
    let exp = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(32))
        .min(config.max_delay_ms);
    let delay = (exp as i64).saturating_add(jitter_ms).max(0);
    Duration::from_millis(delay as u64)
}

fn sample_jitter(jitter_ms: u64) -> i64 {
    if jitter_ms == 0 {
        return 0;
    }
    let bound = jitter_ms as i64;
    rand::thread_rng().gen_range(-bound..=bound)
}

pub struct ReconnectMachine {
    config: ReconnectConfig,
    state: ConnectionState,
    attempt: u32,
    fallback: bool,
    last_seen: Option<i64>,
    /// A transport exists, either dialing or open.
    transport_active: bool,
    timers: [Option<TimerId>; 3],
    next_timer: u64,
}

impl ReconnectMachine {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Idle,
            attempt: 0,
            fallback: false,
            last_seen: None,
            transport_active: false,
            timers: [None; 3],
            next_timer: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    pub fn timer(&self, purpose: TimerPurpose) -> Option<TimerId> {
        self.timers[purpose.slot()]
    }

    pub fn armed_timers(&self) -> Vec<TimerPurpose> {
        TimerPurpose::ALL
            .into_iter()
            .filter(|purpose| self.timer(*purpose).is_some())
            .collect()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            state: self.state,
            fallback: self.fallback,
            attempt: self.attempt,
            last_seen: self.last_seen,
            timers_armed: self.armed_timers().len(),
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.state == ConnectionState::Closed {
            return commands;
        }

        match input {
            Input::Start => {
                if self.state == ConnectionState::Idle {
                    self.dial(&mut commands);
                }
            }
            Input::Connected => {
                if self.transport_active && self.state == ConnectionState::Connecting {
                    self.on_open(&mut commands);
                }
            }
            Input::TransportError => {
                if self.transport_active {
                    self.on_failure(&mut commands);
                }
            }
            Input::Heartbeat { t } => {
                if self.state == ConnectionState::Open {
                    self.last_seen = Some(t);
                    self.arm(TimerPurpose::Staleness, self.config.heartbeat_timeout(), &mut commands);
                }
            }
            Input::Data => {
                if self.state == ConnectionState::Open {
                    self.arm(TimerPurpose::Staleness, self.config.heartbeat_timeout(), &mut commands);
                }
            }
            Input::TimerFired(purpose, id) => {
                if self.timer(purpose) != Some(id) {
                    debug!(?purpose, "Ignoring stale timer");
                    return commands;
                }
                self.timers[purpose.slot()] = None;
                self.on_timer(purpose, &mut commands);
            }
            Input::Reconnect => {
                self.cancel_all(&mut commands);
                if self.transport_active {
                    self.transport_active = false;
                    commands.push(Command::Disconnect);
                }
                self.attempt = 0;
                self.set_fallback(false, &mut commands);
                self.dial(&mut commands);
            }
            Input::Close => {
                self.cancel_all(&mut commands);
                if self.transport_active {
                    self.transport_active = false;
                    commands.push(Command::Disconnect);
                }
                self.set_fallback(false, &mut commands);
                self.state = ConnectionState::Closed;
                commands.push(Command::NotifyClosed);
                info!("Stream client closed");
            }
        }

        commands
    }

    fn dial(&mut self, commands: &mut Vec<Command>) {
        self.state = ConnectionState::Connecting;
        self.transport_active = true;
        commands.push(Command::Connect);
    }

    fn on_open(&mut self, commands: &mut Vec<Command>) {
        self.state = ConnectionState::Open;
        self.attempt = 0;
        self.cancel(TimerPurpose::Backoff, commands);
        self.cancel(TimerPurpose::Polling, commands);
        self.set_fallback(false, commands);
        self.arm(TimerPurpose::Staleness, self.config.heartbeat_timeout(), commands);
        commands.push(Command::NotifyOpen);
        info!("Stream connected");
    }

    fn on_failure(&mut self, commands: &mut Vec<Command>) {
        self.transport_active = false;
        self.cancel(TimerPurpose::Staleness, commands);
        commands.push(Command::Disconnect);

        if self.fallback {
            // failed poll: wait for the next polling tick
            self.state = ConnectionState::Fallback;
            debug!("Fallback reconnect attempt failed");
            return;
        }

        self.attempt = self.attempt.saturating_add(1);
        if self.attempt >= self.config.max_retries {
            self.state = ConnectionState::Fallback;
            self.cancel(TimerPurpose::Backoff, commands);
            self.set_fallback(true, commands);
            self.arm(TimerPurpose::Polling, self.config.polling_interval(), commands);
            warn!(attempts = self.attempt, "Stream unavailable, falling back to polling");
            return;
        }

        let delay = backoff_delay(&self.config, self.attempt - 1, sample_jitter(self.config.jitter_ms));
        self.state = ConnectionState::Connecting;
        self.arm(TimerPurpose::Backoff, delay, commands);
        debug!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
    }

    fn on_timer(&mut self, purpose: TimerPurpose, commands: &mut Vec<Command>) {
        match purpose {
            TimerPurpose::Backoff => {
                if self.state == ConnectionState::Connecting && !self.transport_active {
                    self.dial(commands);
                }
            }
            TimerPurpose::Polling => {
                self.arm(TimerPurpose::Polling, self.config.polling_interval(), commands);
                if !self.transport_active {
                    self.attempt = 0;
                    self.dial(commands);
                }
            }
            TimerPurpose::Staleness => {
                if self.state == ConnectionState::Open {
                    warn!("No stream traffic within heartbeat timeout");
                    self.on_failure(commands);
                }
            }
        }
    }

    fn set_fallback(&mut self, active: bool, commands: &mut Vec<Command>) {
        if self.fallback != active {
            self.fallback = active;
            commands.push(Command::NotifyFallback(active));
        }
    }

    fn arm(&mut self, purpose: TimerPurpose, delay: Duration, commands: &mut Vec<Command>) {
        self.cancel(purpose, commands);
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.timers[purpose.slot()] = Some(id);
        commands.push(Command::ArmTimer { purpose, id, delay });
    }

    fn cancel(&mut self, purpose: TimerPurpose, commands: &mut Vec<Command>) {
        if let Some(id) = self.timers[purpose.slot()].take() {
            commands.push(Command::CancelTimer { purpose, id });
        }
    }

    fn cancel_all(&mut self, commands: &mut Vec<Command>) {
        for purpose in TimerPurpose::ALL {
            self.cancel(purpose, commands);
        }
    }
}
