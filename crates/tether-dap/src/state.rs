//! Session state for one debug adapter conversation.
//!
//! [`SessionState`] is plain data plus invariant checks. [`SharedState`]
//! is the single lock every writer goes through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::protocol::{DapEvent, Module, Source, StackFrame};

/// Liveness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Receive failures in a row before the session counts as unhealthy.
    pub max_consecutive_failures: u32,
    /// Silence from the adapter longer than this is unhealthy.
    pub response_timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&tether_config::HealthConfig> for HealthPolicy {
    fn from(cfg: &tether_config::HealthConfig) -> Self {
        Self {
            max_consecutive_failures: cfg.max_consecutive_failures,
            response_timeout: Duration::from_secs(cfg.response_timeout_secs),
        }
    }
}

/// Coarse lifecycle position derived from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No live channel to the adapter.
    Disconnected,
    /// Channel open, handshake not finished.
    Connected,
    /// `initialize` succeeded, debuggee not started.
    Initialized,
    /// Debuggee running.
    Running,
    /// Debuggee stopped.
    Paused,
    /// Session over.
    Terminated,
}

impl SessionStatus {
    /// Lowercase label used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connected => "connected",
            SessionStatus::Initialized => "initialized",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Terminated => "terminated",
        }
    }
}

/// Everything the client knows about the session.
#[derive(Debug, Clone)]
pub struct SessionState {
    // Connection
    pub connected: bool,
    pub initialized: bool,
    pub ready_for_configuration: bool,
    pub configuration_done: bool,
    pub session_established: bool,

    // Handshake
    pub handshake_started: bool,
    pub handshake_complete: bool,

    // Execution
    pub stopped: bool,
    pub terminated: bool,
    pub stop_reason: Option<String>,
    pub current_thread_id: Option<i64>,
    pub exit_code: Option<i64>,

    // Location
    pub current_file: Option<String>,
    pub current_line: Option<i64>,
    pub current_column: Option<i64>,

    // Health
    pub consecutive_failures: u32,
    pub last_response_time: Instant,
    pub disconnect_reason: Option<String>,
    policy: HealthPolicy,

    // Requests
    pub last_command_sent: Option<String>,
    pub total_requests_sent: u64,
    pub total_responses_received: u64,
    pub connection_start_time: Option<Instant>,

    // Adapter
    pub adapter_id: Option<String>,
    /// Capabilities exactly as the adapter reported them. A missing key
    /// means unsupported.
    pub capabilities: Map<String, Value>,

    // Instrumentation
    pub last_message_wall: Option<SystemTime>,
    pub last_message_instant: Option<Instant>,
    /// Generation of the receiver task currently feeding this state.
    pub receiver_generation: Option<u64>,
    pub event_last_processed: HashMap<String, Instant>,
    pub event_last_signaled: HashMap<String, Instant>,
    pub loaded_sources: HashMap<String, Source>,
    pub loaded_modules: HashMap<String, Module>,
    pub needs_refresh: HashMap<String, bool>,
}

impl SessionState {
    /// A fresh, disconnected state.
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            connected: false,
            initialized: false,
            ready_for_configuration: false,
            configuration_done: false,
            session_established: false,
            handshake_started: false,
            handshake_complete: false,
            stopped: false,
            terminated: false,
            stop_reason: None,
            current_thread_id: None,
            exit_code: None,
            current_file: None,
            current_line: None,
            current_column: None,
            consecutive_failures: 0,
            last_response_time: Instant::now(),
            disconnect_reason: None,
            policy,
            last_command_sent: None,
            total_requests_sent: 0,
            total_responses_received: 0,
            connection_start_time: None,
            adapter_id: None,
            capabilities: Map::new(),
            last_message_wall: None,
            last_message_instant: None,
            receiver_generation: None,
            event_last_processed: HashMap::new(),
            event_last_signaled: HashMap::new(),
            loaded_sources: HashMap::new(),
            loaded_modules: HashMap::new(),
            needs_refresh: HashMap::new(),
        }
    }

    /// The health thresholds in force.
    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }

    /// Shorthand for `policy().max_consecutive_failures`.
    pub fn max_consecutive_failures(&self) -> u32 {
        self.policy.max_consecutive_failures
    }

    /// Back to construction defaults. The health policy survives.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// Connected, not terminated, under the failure limit and heard from
    /// within the response timeout.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Instant::now())
    }

    /// [`is_healthy`](Self::is_healthy) evaluated at `now`.
    pub fn is_healthy_at(&self, now: Instant) -> bool {
        self.connected
            && !self.terminated
            && self.consecutive_failures < self.policy.max_consecutive_failures
            && now.saturating_duration_since(self.last_response_time) < self.policy.response_timeout
    }

    /// Derived lifecycle position.
    pub fn status(&self) -> SessionStatus {
        if self.terminated {
            SessionStatus::Terminated
        } else if !self.connected {
            SessionStatus::Disconnected
        } else if self.stopped {
            SessionStatus::Paused
        } else if self.session_established || self.configuration_done {
            SessionStatus::Running
        } else if self.initialized {
            SessionStatus::Initialized
        } else {
            SessionStatus::Connected
        }
    }

    /// The channel opened.
    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.disconnect_reason = None;
        self.connection_start_time = Some(Instant::now());
        self.last_response_time = Instant::now();
    }

    /// The channel is gone. Keeps the first reason reported.
    pub fn mark_disconnected(&mut self, reason: impl Into<String>) {
        self.connected = false;
        if self.disconnect_reason.is_none() {
            self.disconnect_reason = Some(reason.into());
        }
    }

    /// An outgoing request was written.
    pub fn record_request(&mut self, command: &str) {
        self.total_requests_sent += 1;
        self.last_command_sent = Some(command.to_string());
    }

    /// Any message arrived from the adapter.
    pub fn record_message(&mut self) {
        let now = Instant::now();
        self.total_responses_received += 1;
        self.last_response_time = now;
        self.last_message_instant = Some(now);
        self.last_message_wall = Some(SystemTime::now());
    }

    /// One more receive failure; returns the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// Move the current location to `frame`.
    pub fn set_location(&mut self, frame: &StackFrame) {
        self.current_file = frame
            .source
            .as_ref()
            .and_then(|s| s.path.clone().or_else(|| s.name.clone()));
        self.current_line = Some(frame.line);
        self.current_column = Some(frame.column);
    }

    fn clear_location(&mut self) {
        self.current_file = None;
        self.current_line = None;
        self.current_column = None;
    }

    /// Fold an adapter event into the flags.
    pub fn apply_event(&mut self, event: &DapEvent) {
        match event {
            DapEvent::Initialized => {
                self.ready_for_configuration = true;
            }
            DapEvent::Stopped(body) => {
                self.stopped = true;
                self.stop_reason = Some(body.reason.clone());
                if body.thread_id.is_some() {
                    self.current_thread_id = body.thread_id;
                }
                // The frame will be re-read; the old position is stale.
                self.clear_location();
            }
            DapEvent::Continued(body) => {
                self.stopped = false;
                self.stop_reason = None;
                self.current_thread_id = Some(body.thread_id);
                self.clear_location();
            }
            DapEvent::Terminated(_) => {
                self.terminated = true;
                self.stopped = false;
            }
            DapEvent::Exited(body) => {
                self.exit_code = Some(body.exit_code);
                self.stopped = false;
            }
            DapEvent::Process(_) => {
                self.session_established = true;
            }
            DapEvent::Thread(body) => {
                if body.reason == "exited" && self.current_thread_id == Some(body.thread_id) {
                    self.current_thread_id = None;
                }
            }
            DapEvent::LoadedSource(body) => {
                let key = source_key(&body.source);
                if body.reason == "removed" {
                    self.loaded_sources.remove(&key);
                } else {
                    self.loaded_sources.insert(key.clone(), body.source.clone());
                }
                self.needs_refresh.insert(key, true);
            }
            DapEvent::Module(body) => {
                let key = body.module.key();
                if body.reason == "removed" {
                    self.loaded_modules.remove(&key);
                } else {
                    self.loaded_modules.insert(key, body.module.clone());
                }
            }
            DapEvent::Breakpoint(body) => {
                if let Some(source) = &body.breakpoint.source {
                    self.needs_refresh.insert(source_key(source), true);
                }
            }
            DapEvent::Capabilities(body) => {
                for (k, v) in &body.capabilities {
                    self.capabilities.insert(k.clone(), v.clone());
                }
            }
            DapEvent::Output(_) | DapEvent::Unknown { .. } => {}
        }
    }

    /// Plain snapshot for observability tooling.
    pub fn get_diagnostics(&self) -> Value {
        let now = Instant::now();
        let uptime = self
            .connection_start_time
            .map(|t| now.saturating_duration_since(t).as_secs_f64());
        let since_last = now
            .saturating_duration_since(self.last_response_time)
            .as_secs_f64();
        let wall = self
            .last_message_wall
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64());

        let ages = |m: &HashMap<String, Instant>| -> Map<String, Value> {
            m.iter()
                .map(|(k, t)| {
                    (
                        k.clone(),
                        json!(now.saturating_duration_since(*t).as_secs_f64()),
                    )
                })
                .collect()
        };

        json!({
            "status": self.status().as_str(),
            "healthy": self.is_healthy_at(now),
            "connected": self.connected,
            "initialized": self.initialized,
            "configuration_done": self.configuration_done,
            "handshake_complete": self.handshake_complete,
            "stopped": self.stopped,
            "terminated": self.terminated,
            "stop_reason": self.stop_reason,
            "current_thread_id": self.current_thread_id,
            "current_file": self.current_file,
            "current_line": self.current_line,
            "exit_code": self.exit_code,
            "disconnect_reason": self.disconnect_reason,
            "adapter_id": self.adapter_id,
            "consecutive_failures": self.consecutive_failures,
            "max_consecutive_failures": self.policy.max_consecutive_failures,
            "seconds_since_last_response": since_last,
            "last_message_unix": wall,
            "uptime_seconds": uptime,
            "last_command_sent": self.last_command_sent,
            "total_requests_sent": self.total_requests_sent,
            "total_responses_received": self.total_responses_received,
            "receiver_generation": self.receiver_generation,
            "capability_count": self.capabilities.len(),
            "loaded_sources": self.loaded_sources.len(),
            "loaded_modules": self.loaded_modules.len(),
            "event_seconds_since_processed": ages(&self.event_last_processed),
            "event_seconds_since_signaled": ages(&self.event_last_signaled),
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(HealthPolicy::default())
    }
}

fn source_key(source: &Source) -> String {
    source
        .path
        .clone()
        .or_else(|| source.source_reference.map(|r| format!("ref:{r}")))
        .or_else(|| source.name.clone())
        .unwrap_or_default()
}

/// Shared handle to one [`SessionState`].
///
/// Locks are held only for the duration of a closure; never across an
/// `.await`.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedState {
    /// Wrap a fresh state.
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState::new(policy))),
        }
    }

    /// Mutate under the lock.
    pub fn update<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        f(&mut self.inner.lock())
    }

    /// Read under the lock.
    pub fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&self.inner.lock())
    }

    /// Copy of the whole record.
    pub fn snapshot(&self) -> SessionState {
        self.inner.lock().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.read(SessionState::status)
    }

    pub fn is_healthy(&self) -> bool {
        self.read(SessionState::is_healthy)
    }

    pub fn is_terminated(&self) -> bool {
        self.read(|s| s.terminated)
    }

    pub fn get_diagnostics(&self) -> Value {
        self.read(SessionState::get_diagnostics)
    }

    pub fn reset(&self) {
        self.update(SessionState::reset);
    }
}
