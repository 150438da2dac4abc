//! DAP protocol message types.
//!
//! Envelope and body structures of the Debug Adapter Protocol with serde
//! support, plus the closed [`Message`] and [`DapEvent`] sum types the
//! client dispatches on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Base protocol messages
// ---------------------------------------------------------------------------

/// A DAP request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// Always "request".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The command to execute.
    pub command: String,
    /// Command arguments (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    /// Build a request envelope.
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "request".into(),
            command: command.into(),
            arguments,
        }
    }
}

/// A DAP response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number.
    pub seq: i64,
    /// Always "response".
    #[serde(rename = "type")]
    pub message_type: String,
    /// Sequence number of the corresponding request.
    pub request_seq: i64,
    /// Whether the request was successful.
    pub success: bool,
    /// The command this response is for.
    pub command: String,
    /// Error message if `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response body (command-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Build a successful response to `request_seq`.
    pub fn success(seq: i64, request_seq: i64, command: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "response".into(),
            request_seq,
            success: true,
            command: command.into(),
            message: None,
            body,
        }
    }

    /// Build a failed response to `request_seq`.
    pub fn failure(
        seq: i64,
        request_seq: i64,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            seq,
            message_type: "response".into(),
            request_seq,
            success: false,
            command: command.into(),
            message: Some(message.into()),
            body: None,
        }
    }

    /// Deserialize the body into `T`, if there is one and it fits.
    pub fn body_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_value(b.clone()).ok())
    }
}

/// A DAP event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number.
    pub seq: i64,
    /// Always "event".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The event type.
    pub event: String,
    /// Event body (event-specific).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    /// Build an event envelope.
    pub fn new(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "event".into(),
            event: event.into(),
            body,
        }
    }
}

/// Any message travelling over a DAP connection, keyed by its `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `"type": "request"` (client → adapter, or a reverse request).
    Request(Request),
    /// `"type": "response"`.
    Response(Response),
    /// `"type": "event"`.
    Event(Event),
    /// Anything whose discriminant is missing, unknown, or whose envelope
    /// does not deserialize. The raw payload is kept for logging.
    Unknown(Value),
}

impl Message {
    /// Classify a decoded JSON payload.
    pub fn from_value(value: Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        let parsed = match kind.as_deref() {
            Some("request") => serde_json::from_value(value.clone()).map(Message::Request),
            Some("response") => serde_json::from_value(value.clone()).map(Message::Response),
            Some("event") => serde_json::from_value(value.clone()).map(Message::Event),
            _ => return Message::Unknown(value),
        };
        parsed.unwrap_or(Message::Unknown(value))
    }

    /// Serialize back to the wire JSON shape.
    pub fn to_value(&self) -> Value {
        let encoded = match self {
            Message::Request(r) => serde_json::to_value(r),
            Message::Response(r) => serde_json::to_value(r),
            Message::Event(e) => serde_json::to_value(e),
            Message::Unknown(raw) => return raw.clone(),
        };
        encoded.unwrap_or(Value::Null)
    }

    /// The `seq` of this message, when it has one.
    pub fn seq(&self) -> Option<i64> {
        match self {
            Message::Request(r) => Some(r.seq),
            Message::Response(r) => Some(r.seq),
            Message::Event(e) => Some(e.seq),
            Message::Unknown(raw) => raw.get("seq").and_then(Value::as_i64),
        }
    }
}

// ---------------------------------------------------------------------------
// Request arguments
// ---------------------------------------------------------------------------

/// Arguments for the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    /// ID of the client.
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable name of the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// ID of the debug adapter.
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    /// Client locale (e.g. "en-US").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Whether lines are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    /// Whether columns are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    /// Path format: "path" or "uri".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
    /// Whether the client supports variable type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_type: Option<bool>,
    /// Whether the client supports variable paging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_paging: Option<bool>,
    /// Whether the client supports the `runInTerminal` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_run_in_terminal_request: Option<bool>,
}

impl InitializeRequestArguments {
    /// Arguments with 1-based lines/columns and plain paths.
    pub fn new(client_id: impl Into<String>, adapter_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_name: None,
            adapter_id: adapter_id.into(),
            locale: None,
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".into()),
            supports_variable_type: Some(true),
            supports_variable_paging: None,
            supports_run_in_terminal_request: Some(false),
        }
    }
}

/// Typed view over the capabilities an adapter reports.
///
/// The session keeps the verbatim map; this struct is a convenience for
/// callers that want named flags. Absent flags mean "unsupported".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// The adapter supports the `configurationDone` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    /// The adapter supports function breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_function_breakpoints: Option<bool>,
    /// The adapter supports conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_conditional_breakpoints: Option<bool>,
    /// The adapter supports hit conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_hit_conditional_breakpoints: Option<bool>,
    /// The adapter supports log points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_log_points: Option<bool>,
    /// The adapter supports `evaluate` for hovers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_evaluate_for_hovers: Option<bool>,
    /// The adapter supports the `exceptionInfo` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_exception_info_request: Option<bool>,
    /// The adapter supports the `modules` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_modules_request: Option<bool>,
    /// The adapter supports the `loadedSources` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_loaded_sources_request: Option<bool>,
    /// The adapter supports setting variable values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_set_variable: Option<bool>,
    /// The adapter supports the `terminate` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_terminate_request: Option<bool>,
}

impl Capabilities {
    /// Read the typed view from a verbatim capability map.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(map.clone())).unwrap_or_default()
    }
}

/// Arguments for the `launch` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequestArguments {
    /// Launch without debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_debug: Option<bool>,
    /// Restart data (for reconnect).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "__restart")]
    pub restart: Option<Value>,
    /// Program to launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Command-line arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Working directory for the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Value>,
    /// Stop at the entry point of the program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_entry: Option<bool>,
    /// Adapter-specific launch settings, passed through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Arguments for the `attach` request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequestArguments {
    /// Restart data (for reconnect).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "__restart")]
    pub restart: Option<Value>,
    /// Process ID to attach to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i64>,
    /// Adapter-specific attach settings (host/port, etc).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Arguments for the `setBreakpoints` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    /// The source to set breakpoints for.
    pub source: Source,
    /// Breakpoints to set (replaces all previous ones).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
}

/// Response body for `setBreakpoints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    /// Information about the breakpoints.
    pub breakpoints: Vec<BreakpointResponse>,
}

/// A breakpoint as returned by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResponse {
    /// Unique identifier for the breakpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Whether the breakpoint has been verified.
    pub verified: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Actual source location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Actual line of the breakpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Actual column of the breakpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

/// A source breakpoint (client-side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// The source line of the breakpoint.
    pub line: i64,
    /// Optional column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Hit condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    /// Log message (logpoint).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Step / flow-control arguments
// ---------------------------------------------------------------------------

/// Arguments for the `continue` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueArguments {
    /// The thread to continue.
    pub thread_id: i64,
    /// Whether to continue just this thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_thread: Option<bool>,
}

/// Arguments for the `next` (step over) request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextArguments {
    /// The thread to step.
    pub thread_id: i64,
    /// Stepping granularity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// Arguments for the `stepIn` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInArguments {
    /// The thread to step.
    pub thread_id: i64,
    /// Target to step into (if multiple).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
    /// Stepping granularity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// Arguments for the `stepOut` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutArguments {
    /// The thread to step.
    pub thread_id: i64,
    /// Stepping granularity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// Arguments for the `pause` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseArguments {
    /// The thread to pause.
    pub thread_id: i64,
}

// ---------------------------------------------------------------------------
// Inspection requests
// ---------------------------------------------------------------------------

/// Arguments for the `stackTrace` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    /// Thread whose stack to retrieve.
    pub thread_id: i64,
    /// Index of the first frame to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    /// Maximum number of frames to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

/// Response body for `stackTrace`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    /// The frames, innermost first.
    #[serde(default)]
    pub stack_frames: Vec<StackFrame>,
    /// Total number of frames available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<i64>,
}

/// Response body for `threads`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    /// All threads.
    #[serde(default)]
    pub threads: Vec<Thread>,
}

/// Response body for `scopes`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    /// Scopes of the frame.
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

/// Response body for `variables`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponseBody {
    /// The variables.
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// Response body for `exceptionInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfoResponseBody {
    /// Identifier of the exception (e.g. its type name).
    pub exception_id: String,
    /// Description of the exception.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `never`, `always`, `unhandled` or `userUnhandled`.
    pub break_mode: String,
    /// Detailed information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ExceptionDetails>,
}

/// Detailed information about an exception.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    /// Message of the exception.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Short type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Fully qualified type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_type_name: Option<String>,
    /// Stack trace as text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Nested exceptions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_exception: Option<Vec<ExceptionDetails>>,
}

/// Response body for `modules`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulesResponseBody {
    /// The modules.
    #[serde(default)]
    pub modules: Vec<Module>,
    /// Total number of modules available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_modules: Option<i64>,
}

// ---------------------------------------------------------------------------
// Runtime types
// ---------------------------------------------------------------------------

/// A thread in the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Unique identifier of the thread.
    pub id: i64,
    /// Human-readable name of the thread.
    pub name: String,
}

/// A stack frame in the call stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Unique identifier for the stack frame.
    pub id: i64,
    /// Name of the frame (function name).
    pub name: String,
    /// Source location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Line within the source.
    pub line: i64,
    /// Column within the source.
    #[serde(default)]
    pub column: i64,
    /// Module ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<Value>,
}

/// A source location.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Short name of the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// File system path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Source reference (for sources without a file path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

/// A scope (container for variables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Name of the scope (e.g. "Locals", "Globals").
    pub name: String,
    /// Variables reference for this scope.
    pub variables_reference: i64,
    /// Whether the scope is expensive to resolve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expensive: Option<bool>,
}

/// A variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Name of the variable.
    pub name: String,
    /// Value of the variable as a string.
    pub value: String,
    /// Type of the variable.
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    /// If > 0, the variable has children accessed via this reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_reference: Option<i64>,
}

/// A module (library, assembly, package) loaded by the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Integer or string identifier.
    pub id: Value,
    /// Module name.
    pub name: String,
    /// Path of the module on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether symbols were loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_status: Option<String>,
}

impl Module {
    /// The module id rendered as a map key.
    pub fn key(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Arguments for the `evaluate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    /// The expression to evaluate.
    pub expression: String,
    /// Stack frame in whose context to evaluate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    /// Context: "watch", "repl", "hover", "clipboard".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Response body for `evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    /// The result string.
    pub result: String,
    /// Type of the result.
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    /// If > 0, the result has children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables_reference: Option<i64>,
}

// ---------------------------------------------------------------------------
// Disconnect
// ---------------------------------------------------------------------------

/// Arguments for the `disconnect` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    /// Whether to restart the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    /// Whether to terminate the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
    /// Whether to suspend the debuggee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend_debuggee: Option<bool>,
}

// ---------------------------------------------------------------------------
// Event bodies
// ---------------------------------------------------------------------------

/// Body of the `stopped` event.
///
/// `reason` stays a string: adapters send values beyond the documented set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// The reason for the stop ("breakpoint", "step", "exception", ...).
    pub reason: String,
    /// Description of the stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Thread that stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    /// Whether all threads are stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
    /// Additional text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body of the `continued` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    /// Thread that continued.
    pub thread_id: i64,
    /// Whether all threads continued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

/// Body of the `output` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    /// Output category: "console", "stdout", "stderr", "telemetry".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The output text.
    pub output: String,
    /// Source location that generated the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Line in the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Column in the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

/// Body of the `exited` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    /// The exit code of the debuggee.
    pub exit_code: i64,
}

/// Body of the `terminated` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedEventBody {
    /// Restart data; if present, a restart is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<Value>,
}

/// Body of the `breakpoint` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    /// "changed", "new" or "removed".
    pub reason: String,
    /// The affected breakpoint.
    pub breakpoint: BreakpointResponse,
}

/// Body of the `thread` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
    /// "started" or "exited".
    pub reason: String,
    /// The thread.
    pub thread_id: i64,
}

/// Body of the `module` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEventBody {
    /// "new", "changed" or "removed".
    pub reason: String,
    /// The module.
    pub module: Module,
}

/// Body of the `loadedSource` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSourceEventBody {
    /// "new", "changed" or "removed".
    pub reason: String,
    /// The source.
    pub source: Source,
}

/// Body of the `process` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEventBody {
    /// Logical name of the process.
    pub name: String,
    /// OS process id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_process_id: Option<i64>,
    /// "launch" or "attach".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_method: Option<String>,
}

/// Body of the `capabilities` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesEventBody {
    /// Changed capabilities, verbatim.
    pub capabilities: Map<String, Value>,
}

/// An event, decoded by name into its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DapEvent {
    /// The adapter is ready for configuration requests.
    Initialized,
    /// Execution stopped.
    Stopped(StoppedEventBody),
    /// Execution resumed.
    Continued(ContinuedEventBody),
    /// The debug session ended.
    Terminated(TerminatedEventBody),
    /// The debuggee exited.
    Exited(ExitedEventBody),
    /// Debuggee or adapter output.
    Output(OutputEventBody),
    /// A breakpoint changed.
    Breakpoint(BreakpointEventBody),
    /// A thread started or exited.
    Thread(ThreadEventBody),
    /// A module was loaded, changed or removed.
    Module(ModuleEventBody),
    /// A source was loaded, changed or removed.
    LoadedSource(LoadedSourceEventBody),
    /// The debuggee process started or was attached.
    Process(ProcessEventBody),
    /// Capabilities changed after initialization.
    Capabilities(CapabilitiesEventBody),
    /// Unrecognised event name, or a known name whose body did not parse.
    Unknown {
        /// The event name.
        event: String,
        /// The raw body.
        body: Option<Value>,
    },
}

impl DapEvent {
    /// Decode an event envelope.
    pub fn from_event(event: &Event) -> Self {
        let body = event.body.clone().unwrap_or(Value::Null);
        let decoded = match event.event.as_str() {
            "initialized" => Some(DapEvent::Initialized),
            "stopped" => parse(body).map(DapEvent::Stopped),
            "continued" => parse(body).map(DapEvent::Continued),
            "terminated" => Some(DapEvent::Terminated(parse(body).unwrap_or_default())),
            "exited" => parse(body).map(DapEvent::Exited),
            "output" => parse(body).map(DapEvent::Output),
            "breakpoint" => parse(body).map(DapEvent::Breakpoint),
            "thread" => parse(body).map(DapEvent::Thread),
            "module" => parse(body).map(DapEvent::Module),
            "loadedSource" => parse(body).map(DapEvent::LoadedSource),
            "process" => parse(body).map(DapEvent::Process),
            "capabilities" => parse(body).map(DapEvent::Capabilities),
            _ => None,
        };
        decoded.unwrap_or_else(|| DapEvent::Unknown {
            event: event.event.clone(),
            body: event.body.clone(),
        })
    }

    /// The wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            DapEvent::Initialized => "initialized",
            DapEvent::Stopped(_) => "stopped",
            DapEvent::Continued(_) => "continued",
            DapEvent::Terminated(_) => "terminated",
            DapEvent::Exited(_) => "exited",
            DapEvent::Output(_) => "output",
            DapEvent::Breakpoint(_) => "breakpoint",
            DapEvent::Thread(_) => "thread",
            DapEvent::Module(_) => "module",
            DapEvent::LoadedSource(_) => "loadedSource",
            DapEvent::Process(_) => "process",
            DapEvent::Capabilities(_) => "capabilities",
            DapEvent::Unknown { event, .. } => event,
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: Value) -> Option<T> {
    serde_json::from_value(body).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_initialize_uses_uppercase_id_keys() {
        let args = InitializeRequestArguments::new("tether", "debugpy");
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["adapterID"], "debugpy");
        assert_eq!(json["clientID"], "tether");
        assert_eq!(json["linesStartAt1"], true);
        assert!(json.get("adapterId").is_none());
    }

    #[test]
    fn protocol_launch_passes_extra_fields_through() {
        let args: LaunchRequestArguments = serde_json::from_value(json!({
            "program": "/usr/bin/app",
            "stopOnEntry": true,
            "justMyCode": false
        }))
        .unwrap();
        assert_eq!(args.program.as_deref(), Some("/usr/bin/app"));
        assert_eq!(args.stop_on_entry, Some(true));
        assert_eq!(args.extra["justMyCode"], false);

        let back = serde_json::to_value(&args).unwrap();
        assert_eq!(back["justMyCode"], false);
        assert_eq!(back["stopOnEntry"], true);
    }

    #[test]
    fn protocol_breakpoint_wire_names() {
        let bp = SourceBreakpoint {
            line: 42,
            column: Some(3),
            condition: Some("x > 10".into()),
            hit_condition: Some(">=2".into()),
            log_message: Some("x={x}".into()),
        };
        let json = serde_json::to_value(&bp).unwrap();
        assert_eq!(json["line"], 42);
        assert_eq!(json["hitCondition"], ">=2");
        assert_eq!(json["logMessage"], "x={x}");
    }

    #[test]
    fn protocol_message_classifies_by_type() {
        let req = Message::from_value(json!({
            "seq": 1, "type": "request", "command": "threads"
        }));
        assert!(matches!(req, Message::Request(ref r) if r.command == "threads"));

        let resp = Message::from_value(json!({
            "seq": 2, "type": "response", "request_seq": 1,
            "success": true, "command": "threads", "body": {"threads": []}
        }));
        assert!(matches!(resp, Message::Response(ref r) if r.request_seq == 1));

        let evt = Message::from_value(json!({
            "seq": 3, "type": "event", "event": "output", "body": {"output": "hi"}
        }));
        assert!(matches!(evt, Message::Event(ref e) if e.event == "output"));
    }

    #[test]
    fn protocol_message_unknown_shapes() {
        let no_type = Message::from_value(json!({"seq": 4}));
        assert!(matches!(no_type, Message::Unknown(_)));
        assert_eq!(no_type.seq(), Some(4));

        let bad_type = Message::from_value(json!({"seq": 5, "type": "notification"}));
        assert!(matches!(bad_type, Message::Unknown(_)));

        // Right discriminant, broken envelope.
        let broken = Message::from_value(json!({"type": "response", "seq": 6}));
        assert!(matches!(broken, Message::Unknown(_)));

        let not_object = Message::from_value(json!([1, 2, 3]));
        assert!(matches!(not_object, Message::Unknown(_)));
    }

    #[test]
    fn protocol_message_to_value_matches_wire() {
        let req = Request::new(7, "scopes", Some(json!({"frameId": 1})));
        let value = Message::Request(req).to_value();
        assert_eq!(
            value,
            json!({"seq": 7, "type": "request", "command": "scopes", "arguments": {"frameId": 1}})
        );

        let resp = Response::failure(8, 7, "scopes", "no frame");
        let value = Message::Response(resp).to_value();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "no frame");
        assert!(value.get("body").is_none());
    }

    #[test]
    fn protocol_stopped_event_decodes() {
        let evt = Event::new(
            1,
            "stopped",
            Some(json!({"reason": "function breakpoint", "threadId": 3})),
        );
        match DapEvent::from_event(&evt) {
            DapEvent::Stopped(body) => {
                assert_eq!(body.reason, "function breakpoint");
                assert_eq!(body.thread_id, Some(3));
            }
            other => panic!("expected stopped, got {other:?}"),
        }
    }

    #[test]
    fn protocol_terminated_without_body() {
        let evt = Event::new(1, "terminated", None);
        assert_eq!(
            DapEvent::from_event(&evt),
            DapEvent::Terminated(TerminatedEventBody::default())
        );
    }

    #[test]
    fn protocol_known_event_with_bad_body_is_unknown() {
        let evt = Event::new(1, "exited", Some(json!({"code": "x"})));
        let decoded = DapEvent::from_event(&evt);
        assert!(matches!(decoded, DapEvent::Unknown { ref event, .. } if event == "exited"));
        assert_eq!(decoded.name(), "exited");
    }

    #[test]
    fn protocol_custom_event_is_unknown() {
        let evt = Event::new(1, "debugpyWaitingForServer", Some(json!({"port": 5678})));
        match DapEvent::from_event(&evt) {
            DapEvent::Unknown { event, body } => {
                assert_eq!(event, "debugpyWaitingForServer");
                assert_eq!(body.unwrap()["port"], 5678);
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn protocol_capabilities_from_map() {
        let map = json!({
            "supportsConfigurationDoneRequest": true,
            "supportsModulesRequest": false,
            "supportsSomethingNew": true
        });
        let caps = Capabilities::from_map(map.as_object().unwrap());
        assert_eq!(caps.supports_configuration_done_request, Some(true));
        assert_eq!(caps.supports_modules_request, Some(false));
        assert_eq!(caps.supports_exception_info_request, None);
    }

    #[test]
    fn protocol_stack_frame_tolerates_missing_column() {
        let frame: StackFrame =
            serde_json::from_value(json!({"id": 1, "name": "main", "line": 10})).unwrap();
        assert_eq!(frame.column, 0);
        assert!(frame.source.is_none());
    }

    #[test]
    fn protocol_module_key() {
        let numeric: Module = serde_json::from_value(json!({"id": 7, "name": "libc"})).unwrap();
        assert_eq!(numeric.key(), "7");
        let textual: Module =
            serde_json::from_value(json!({"id": "mod-a", "name": "a"})).unwrap();
        assert_eq!(textual.key(), "mod-a");
    }

    #[test]
    fn protocol_response_body_as() {
        let resp = Response::success(
            2,
            1,
            "threads",
            Some(json!({"threads": [{"id": 1, "name": "main"}]})),
        );
        let body: ThreadsResponseBody = resp.body_as().unwrap();
        assert_eq!(body.threads[0].name, "main");

        let empty = Response::success(3, 2, "threads", None);
        assert!(empty.body_as::<ThreadsResponseBody>().is_none());
    }
}
