//! DAP client: request/response correlation and event dispatch.
//!
//! Requests are tagged with a monotonically increasing `seq` and parked in a
//! pending table until the receiver delivers the response whose
//! `request_seq` matches. Events update [`SessionState`](crate::state::SessionState)
//! first and are then fanned out to registered handlers.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::DapError;
use crate::protocol::{
    AttachRequestArguments, ContinueArguments, DapEvent, DisconnectArguments, EvaluateArguments,
    Event, InitializeRequestArguments, LaunchRequestArguments, Message, NextArguments,
    PauseArguments, Request, Response, SetBreakpointsArguments, StackTraceResponseBody,
    StepInArguments, StepOutArguments,
};
use crate::receiver::{MessageProcessor, MessageReceiver, ReceiverExit};
use crate::state::{HealthPolicy, SessionState, SessionStatus, SharedState};
use crate::transport::Transport;

/// Event name that matches every event.
pub const ANY_EVENT: &str = "*";

/// Callback invoked for adapter events.
///
/// Handlers run on the receiver task and must not block. To issue a request
/// from a handler, clone the client into a spawned task.
pub type EventHandler = Arc<dyn Fn(&DapEvent) + Send + Sync>;

/// Client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// `clientID` sent in `initialize`.
    pub client_id: String,
    /// How long a request waits for its response.
    pub request_timeout: Duration,
    /// How long `shutdown` waits for the receiver before aborting it.
    pub stop_timeout: Duration,
    /// Health thresholds for the session state.
    pub health: HealthPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_id: "tether".to_string(),
            request_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_millis(2000),
            health: HealthPolicy::default(),
        }
    }
}

impl From<&tether_config::Config> for ClientOptions {
    fn from(cfg: &tether_config::Config) -> Self {
        Self {
            client_id: cfg.client.client_id.clone(),
            request_timeout: Duration::from_secs(cfg.client.request_timeout_secs),
            stop_timeout: Duration::from_millis(cfg.receiver.stop_timeout_ms),
            health: HealthPolicy::from(&cfg.health),
        }
    }
}

struct Pending {
    command: String,
    tx: oneshot::Sender<Result<Response, DapError>>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    state: SharedState,
    options: ClientOptions,
    next_seq: AtomicI64,
    pending: Mutex<HashMap<i64, Pending>>,
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
    /// Set when the receiver loop ends; nothing will resolve new slots.
    closed: Mutex<Option<ReceiverExit>>,
}

/// Removes a pending slot when the waiting future ends, however it ends.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<i64, Pending>>,
    seq: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.seq);
    }
}

/// A DAP client bound to one transport.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct DapClient {
    inner: Arc<ClientInner>,
    receiver: Arc<MessageReceiver>,
}

impl DapClient {
    /// Create a client over `transport`. Call [`start`](Self::start) to
    /// begin receiving.
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let state = SharedState::new(options.health);
        if transport.is_connected() {
            state.update(SessionState::mark_connected);
        }
        let receiver = Arc::new(MessageReceiver::new(transport.clone(), state.clone()));
        Self {
            inner: Arc::new(ClientInner {
                transport,
                state,
                options,
                next_seq: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                handlers: Mutex::new(HashMap::new()),
                closed: Mutex::new(None),
            }),
            receiver,
        }
    }

    /// Start the background receiver. Idempotent; returns its generation.
    pub fn start(&self) -> u64 {
        self.inner.closed.lock().take();
        self.receiver.start(self.inner.clone())
    }

    /// Stop the receiver, close the transport and fail in-flight requests.
    pub async fn shutdown(&self) {
        self.receiver.stop(self.inner.options.stop_timeout).await;
        self.inner.transport.close().await;
        self.mark_disconnected("client shut down");
        tracing::debug!("client shut down");
    }

    /// Mark the session disconnected and fail every in-flight request.
    pub fn mark_disconnected(&self, reason: &str) {
        self.inner
            .state
            .update(|s| s.mark_disconnected(reason.to_string()));
        self.inner.fail_pending(reason);
    }

    /// Restore the session state to what a new client on the same transport
    /// would see.
    pub fn reset_state(&self) {
        let connected = self.inner.transport.is_connected();
        self.inner.state.update(|s| {
            s.reset();
            if connected {
                s.mark_connected();
            }
        });
    }

    /// Shared handle to the session state.
    pub fn state(&self) -> &SharedState {
        &self.inner.state
    }

    /// Copy of the current session state.
    pub fn session_state(&self) -> SessionState {
        self.inner.state.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.status()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state.is_terminated()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected() && self.inner.state.read(|s| s.connected)
    }

    pub fn get_diagnostics(&self) -> Value {
        self.inner.state.get_diagnostics()
    }

    /// The receiver driving this client.
    pub fn receiver(&self) -> &MessageReceiver {
        &self.receiver
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Capabilities as reported by the adapter.
    pub fn capabilities(&self) -> Map<String, Value> {
        self.inner.state.read(|s| s.capabilities.clone())
    }

    /// Whether the adapter reported `capability` as `true`.
    pub fn supports(&self, capability: &str) -> bool {
        self.inner.state.read(|s| {
            s.capabilities
                .get(capability)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
    }

    /// Register `handler` for events named `event`, or every event with
    /// [`ANY_EVENT`].
    pub fn on_event<F>(&self, event: &str, handler: F)
    where
        F: Fn(&DapEvent) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Drop every handler registered for `event`.
    pub fn clear_handlers(&self, event: &str) {
        self.inner.handlers.lock().remove(event);
    }

    /// Send a request and wait for its response.
    ///
    /// A response with `success: false` is returned as `Ok`.
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<Response, DapError> {
        self.inner.request(command, arguments, None).await
    }

    /// [`send_request`](Self::send_request) that also gives up when
    /// `cancel` fires. A response arriving afterwards is dropped.
    pub async fn send_request_with_cancel(
        &self,
        command: &str,
        arguments: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Response, DapError> {
        self.inner.request(command, arguments, Some(cancel)).await
    }

    async fn send_typed<T: Serialize>(
        &self,
        command: &str,
        arguments: &T,
    ) -> Result<Response, DapError> {
        let value = serde_json::to_value(arguments)
            .map_err(|e| DapError::Transport(format!("cannot encode {command} arguments: {e}")))?;
        self.send_request(command, Some(value)).await
    }

    // -- Handshake -----------------------------------------------------------

    /// Run `initialize`. On success the capabilities are stored verbatim.
    pub async fn initialize(&self, adapter_id: &str) -> Result<Response, DapError> {
        self.inner.state.update(|s| {
            s.handshake_started = true;
            s.adapter_id = Some(adapter_id.to_string());
        });
        let args = InitializeRequestArguments::new(self.inner.options.client_id.clone(), adapter_id);
        self.send_typed("initialize", &args).await
    }

    pub async fn configuration_done(&self) -> Result<Response, DapError> {
        self.send_request("configurationDone", None).await
    }

    pub async fn launch(&self, args: &LaunchRequestArguments) -> Result<Response, DapError> {
        self.send_typed("launch", args).await
    }

    pub async fn attach(&self, args: &AttachRequestArguments) -> Result<Response, DapError> {
        self.send_typed("attach", args).await
    }

    pub async fn set_breakpoints(
        &self,
        args: &SetBreakpointsArguments,
    ) -> Result<Response, DapError> {
        self.send_typed("setBreakpoints", args).await
    }

    // -- Execution control ---------------------------------------------------

    pub async fn continue_execution(&self, thread_id: i64) -> Result<Response, DapError> {
        let args = ContinueArguments {
            thread_id,
            single_thread: None,
        };
        self.send_typed("continue", &args).await
    }

    pub async fn step_over(&self, thread_id: i64) -> Result<Response, DapError> {
        let args = NextArguments {
            thread_id,
            granularity: None,
        };
        self.send_typed("next", &args).await
    }

    pub async fn step_in(&self, thread_id: i64) -> Result<Response, DapError> {
        let args = StepInArguments {
            thread_id,
            target_id: None,
            granularity: None,
        };
        self.send_typed("stepIn", &args).await
    }

    pub async fn step_out(&self, thread_id: i64) -> Result<Response, DapError> {
        let args = StepOutArguments {
            thread_id,
            granularity: None,
        };
        self.send_typed("stepOut", &args).await
    }

    pub async fn pause(&self, thread_id: i64) -> Result<Response, DapError> {
        self.send_typed("pause", &PauseArguments { thread_id }).await
    }

    // -- Inspection ----------------------------------------------------------

    /// Evaluate `expression`, in the context of `frame_id` when given.
    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
        context: Option<&str>,
    ) -> Result<Response, DapError> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: context.map(str::to_string),
        };
        self.send_typed("evaluate", &args).await
    }

    pub async fn variables(&self, variables_reference: i64) -> Result<Response, DapError> {
        let args = serde_json::json!({ "variablesReference": variables_reference });
        self.send_request("variables", Some(args)).await
    }

    /// Ask the adapter to end the session.
    pub async fn disconnect(&self, terminate_debuggee: bool) -> Result<Response, DapError> {
        let args = DisconnectArguments {
            restart: Some(false),
            terminate_debuggee: Some(terminate_debuggee),
            suspend_debuggee: None,
        };
        self.send_typed("disconnect", &args).await
    }
}

impl ClientInner {
    fn next_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(
        &self,
        command: &str,
        arguments: Option<Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response, DapError> {
        if !self.transport.is_connected() {
            return Err(DapError::NotConnected);
        }

        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        // Registered before the write so a fast response always finds its slot.
        self.pending.lock().insert(
            seq,
            Pending {
                command: command.to_string(),
                tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            seq,
        };
        // Checked after the insert: an exit recorded before this point is
        // seen here, one recorded later drains the slot.
        if let Some(exit) = self.closed.lock().clone() {
            return Err(DapError::ConnectionLost(exit.describe()));
        }

        let request = Message::Request(Request::new(seq, command, arguments));
        if let Err(e) = self.transport.send_message(&request).await {
            if e.is_connection_error() {
                self.state.update(|s| s.mark_disconnected(e.to_string()));
            }
            return Err(e);
        }
        self.state.update(|s| s.record_request(command));
        tracing::debug!(seq, command, "request sent");

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            outcome = rx => outcome.unwrap_or_else(|_| {
                Err(DapError::ConnectionLost("response slot dropped".into()))
            }),
            _ = tokio::time::sleep(self.options.request_timeout) => {
                tracing::warn!(seq, command, "request timed out");
                Err(DapError::Timeout { command: command.to_string() })
            }
            _ = cancelled => {
                tracing::debug!(seq, command, "request cancelled");
                Err(DapError::Cancelled { command: command.to_string() })
            }
        }
    }

    fn fail_pending(&self, reason: &str) {
        let drained: Vec<(i64, Pending)> = self.pending.lock().drain().collect();
        for (seq, pending) in drained {
            tracing::debug!(seq, command = %pending.command, "failing in-flight request: {reason}");
            let _ = pending
                .tx
                .send(Err(DapError::ConnectionLost(reason.to_string())));
        }
    }

    fn handle_response(&self, response: Response) {
        if response.success {
            self.apply_response(&response);
        }

        let slot = self.pending.lock().remove(&response.request_seq);
        match slot {
            Some(pending) => {
                if pending.command != response.command {
                    tracing::warn!(
                        request_seq = response.request_seq,
                        expected = %pending.command,
                        got = %response.command,
                        "response command does not match request"
                    );
                }
                if pending.tx.send(Ok(response)).is_err() {
                    tracing::debug!("caller stopped waiting before the response arrived");
                }
            }
            None => tracing::warn!(
                request_seq = response.request_seq,
                command = %response.command,
                "response for unknown request_seq; dropping"
            ),
        }
    }

    /// State side effects of successful responses.
    fn apply_response(&self, response: &Response) {
        match response.command.as_str() {
            "initialize" => {
                let caps = match &response.body {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                tracing::debug!(count = caps.len(), "adapter capabilities received");
                self.state.update(|s| {
                    s.capabilities = caps;
                    s.initialized = true;
                    s.handshake_complete = true;
                });
            }
            "configurationDone" => self.state.update(|s| s.configuration_done = true),
            "launch" | "attach" => self.state.update(|s| s.session_established = true),
            "continue" | "next" | "stepIn" | "stepOut" | "stepBack" | "reverseContinue" => {
                self.state.update(|s| {
                    s.stopped = false;
                    s.stop_reason = None;
                });
            }
            "stackTrace" => {
                if let Some(body) = response.body_as::<StackTraceResponseBody>() {
                    if let Some(top) = body.stack_frames.first() {
                        self.state.update(|s| s.set_location(top));
                    }
                }
            }
            "disconnect" | "terminate" => self.state.update(|s| {
                s.terminated = true;
                s.stopped = false;
            }),
            _ => {}
        }
    }

    fn handle_event(&self, event: Event) {
        let decoded = DapEvent::from_event(&event);
        if let DapEvent::Unknown { event: name, .. } = &decoded {
            if is_known_event(name) {
                tracing::warn!(event = %name, "event body did not match its schema");
            } else {
                tracing::debug!(event = %name, "unrecognised event");
            }
        }
        if let DapEvent::Output(body) = &decoded {
            tracing::debug!(category = ?body.category, "adapter output: {}", body.output.trim_end());
        }

        let name = event.event;
        self.state.update(|s| {
            s.apply_event(&decoded);
            s.event_last_processed.insert(name.clone(), Instant::now());
        });

        let handlers: Vec<EventHandler> = {
            let table = self.handlers.lock();
            table
                .get(&name)
                .into_iter()
                .chain(table.get(ANY_EVENT))
                .flatten()
                .cloned()
                .collect()
        };
        if handlers.is_empty() {
            return;
        }

        for handler in &handlers {
            if std::panic::catch_unwind(AssertUnwindSafe(|| (**handler)(&decoded))).is_err() {
                tracing::error!(event = %name, "event handler panicked");
            }
        }
        self.state.update(|s| {
            s.event_last_signaled.insert(name, Instant::now());
        });
    }

    /// Adapter-to-client requests are not supported; answer with a failure
    /// so the adapter does not wait forever.
    fn handle_reverse_request(&self, request: Request) {
        tracing::warn!(command = %request.command, "rejecting reverse request");
        let reply = Message::Response(Response::failure(
            self.next_seq(),
            request.seq,
            request.command.clone(),
            format!("{} is not supported by this client", request.command),
        ));
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send_message(&reply).await {
                tracing::warn!("failed to answer reverse request: {e}");
            }
        });
    }
}

impl MessageProcessor for ClientInner {
    fn process_message(&self, message: Message) -> Result<(), DapError> {
        self.state.update(SessionState::record_message);
        match message {
            Message::Response(response) => self.handle_response(response),
            Message::Event(event) => self.handle_event(event),
            Message::Request(request) => self.handle_reverse_request(request),
            Message::Unknown(raw) => {
                tracing::warn!("protocol violation, ignoring message: {raw}");
            }
        }
        Ok(())
    }

    fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    fn receiver_exited(&self, exit: &ReceiverExit) {
        *self.closed.lock() = Some(exit.clone());
        self.fail_pending(&exit.describe());
    }
}

fn is_known_event(name: &str) -> bool {
    matches!(
        name,
        "initialized"
            | "stopped"
            | "continued"
            | "terminated"
            | "exited"
            | "output"
            | "breakpoint"
            | "thread"
            | "module"
            | "loadedSource"
            | "process"
            | "capabilities"
    )
}
