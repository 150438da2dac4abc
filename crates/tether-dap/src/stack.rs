//! Stack, thread and execution inspection.
//!
//! [`StackService`] issues inspection requests through a [`DapClient`] and
//! maps the raw bodies into domain objects. An adapter-reported failure
//! comes back as `success: false` with its message, not as an error.

use serde::Serialize;
use serde_json::json;

use crate::client::DapClient;
use crate::error::DapError;
use crate::protocol::{
    ExceptionDetails, ExceptionInfoResponseBody, Module, ModulesResponseBody, Response, Scope,
    ScopesResponseBody, StackFrame, StackTraceResponseBody, Thread, ThreadsResponseBody,
};
use crate::state::SessionStatus;

/// One frame of a call stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameInfo {
    pub id: i64,
    pub name: String,
    /// Source path, if the frame has one.
    pub file: Option<String>,
    /// Short source name.
    pub source_name: Option<String>,
    pub line: i64,
    pub column: i64,
}

impl From<&StackFrame> for FrameInfo {
    fn from(frame: &StackFrame) -> Self {
        Self {
            id: frame.id,
            name: frame.name.clone(),
            file: frame.source.as_ref().and_then(|s| s.path.clone()),
            source_name: frame.source.as_ref().and_then(|s| s.name.clone()),
            line: frame.line,
            column: frame.column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadInfo {
    pub id: i64,
    pub name: String,
}

impl From<&Thread> for ThreadInfo {
    fn from(t: &Thread) -> Self {
        Self {
            id: t.id,
            name: t.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeInfo {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

impl From<&Scope> for ScopeInfo {
    fn from(s: &Scope) -> Self {
        Self {
            name: s.name.clone(),
            variables_reference: s.variables_reference,
            expensive: s.expensive.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    pub version: Option<String>,
    pub symbol_status: Option<String>,
}

impl From<&Module> for ModuleInfo {
    fn from(m: &Module) -> Self {
        Self {
            id: m.key(),
            name: m.name.clone(),
            path: m.path.clone(),
            version: m.version.clone(),
            symbol_status: m.symbol_status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallstackResponse {
    pub success: bool,
    pub message: Option<String>,
    pub thread_id: i64,
    pub frames: Vec<FrameInfo>,
    pub total_frames: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadsResponse {
    pub success: bool,
    pub message: Option<String>,
    pub threads: Vec<ThreadInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopesResponse {
    pub success: bool,
    pub message: Option<String>,
    pub frame_id: i64,
    pub scopes: Vec<ScopeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionResponse {
    pub success: bool,
    pub message: Option<String>,
    pub thread_id: i64,
    pub exception_id: Option<String>,
    pub description: Option<String>,
    pub break_mode: Option<String>,
    pub details: Option<ExceptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModulesResponse {
    pub success: bool,
    pub message: Option<String>,
    pub modules: Vec<ModuleInfo>,
    pub total_modules: Option<i64>,
}

/// Where the debuggee is, derived from the session state at call time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionState {
    /// Handshake or configuration still in progress.
    NotStarted {
        status: &'static str,
    },
    Running {
        thread_id: Option<i64>,
    },
    /// Stopped, with the stack fetched fresh for this call.
    Paused {
        thread_id: Option<i64>,
        reason: Option<String>,
        frames: Vec<FrameInfo>,
    },
    /// Session over, or the adapter connection is gone.
    Terminated {
        reason: Option<String>,
        exit_code: Option<i64>,
    },
}

/// Inspection requests over a client.
#[derive(Clone)]
pub struct StackService {
    client: DapClient,
}

impl StackService {
    pub fn new(client: DapClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DapClient {
        &self.client
    }

    fn ensure_live(&self) -> Result<(), DapError> {
        if self.client.is_terminated() {
            return Err(DapError::Terminated);
        }
        Ok(())
    }

    /// Call stack of `thread_id`, innermost frame first.
    pub async fn callstack(&self, thread_id: i64) -> Result<CallstackResponse, DapError> {
        self.ensure_live()?;
        let args = json!({ "threadId": thread_id, "startFrame": 0 });
        let resp = self.client.send_request("stackTrace", Some(args)).await?;
        let body: StackTraceResponseBody = parsed_body(&resp).unwrap_or_default();
        Ok(CallstackResponse {
            success: resp.success,
            message: resp.message,
            thread_id,
            frames: body.stack_frames.iter().map(FrameInfo::from).collect(),
            total_frames: body.total_frames,
        })
    }

    pub async fn threads(&self) -> Result<ThreadsResponse, DapError> {
        self.ensure_live()?;
        let resp = self.client.send_request("threads", None).await?;
        let body: ThreadsResponseBody = parsed_body(&resp).unwrap_or_default();
        Ok(ThreadsResponse {
            success: resp.success,
            message: resp.message,
            threads: body.threads.iter().map(ThreadInfo::from).collect(),
        })
    }

    /// The frame with `frame_id` on the current thread's stack.
    pub async fn frame(&self, frame_id: i64) -> Result<FrameInfo, DapError> {
        let thread_id = self
            .resolve_thread()
            .await?
            .ok_or(DapError::FrameNotFound(frame_id))?;
        let stack = self.callstack(thread_id).await?;
        if !stack.success {
            return Err(DapError::InvalidResponse(
                stack
                    .message
                    .unwrap_or_else(|| "stackTrace request failed".to_string()),
            ));
        }
        if stack.frames.is_empty() {
            return Err(DapError::EmptyStack { thread_id });
        }
        stack
            .frames
            .into_iter()
            .find(|f| f.id == frame_id)
            .ok_or(DapError::FrameNotFound(frame_id))
    }

    pub async fn get_scopes(&self, frame_id: i64) -> Result<ScopesResponse, DapError> {
        self.ensure_live()?;
        let args = json!({ "frameId": frame_id });
        let resp = self.client.send_request("scopes", Some(args)).await?;
        let body: ScopesResponseBody = parsed_body(&resp).unwrap_or_default();
        Ok(ScopesResponse {
            success: resp.success,
            message: resp.message,
            frame_id,
            scopes: body.scopes.iter().map(ScopeInfo::from).collect(),
        })
    }

    pub async fn exception(&self, thread_id: i64) -> Result<ExceptionResponse, DapError> {
        self.ensure_live()?;
        let args = json!({ "threadId": thread_id });
        let resp = self.client.send_request("exceptionInfo", Some(args)).await?;
        let body: Option<ExceptionInfoResponseBody> = parsed_body(&resp);
        let success = resp.success && body.is_some();
        let message = match (&body, resp.message) {
            (None, None) if resp.success => Some("adapter returned no exception details".into()),
            (_, message) => message,
        };
        Ok(match body {
            Some(b) => ExceptionResponse {
                success,
                message,
                thread_id,
                exception_id: Some(b.exception_id),
                description: b.description,
                break_mode: Some(b.break_mode),
                details: b.details,
            },
            None => ExceptionResponse {
                success,
                message,
                thread_id,
                exception_id: None,
                description: None,
                break_mode: None,
                details: None,
            },
        })
    }

    /// Loaded modules. A response without a body is reported as
    /// unsuccessful with an empty list.
    pub async fn get_modules(&self) -> Result<ModulesResponse, DapError> {
        self.ensure_live()?;
        let resp = self
            .client
            .send_request("modules", Some(json!({ "startModule": 0 })))
            .await?;
        let Some(body) = parsed_body::<ModulesResponseBody>(&resp) else {
            return Ok(ModulesResponse {
                success: false,
                message: resp
                    .message
                    .or_else(|| Some("adapter returned no modules body".to_string())),
                modules: Vec::new(),
                total_modules: None,
            });
        };
        Ok(ModulesResponse {
            success: resp.success,
            message: resp.message,
            modules: body.modules.iter().map(ModuleInfo::from).collect(),
            total_modules: body.total_modules,
        })
    }

    /// Current execution state. Not cached: a paused session refetches
    /// its stack on every call.
    pub async fn get_execution_state(&self) -> Result<ExecutionState, DapError> {
        let snapshot = self.client.session_state();
        match snapshot.status() {
            SessionStatus::Terminated => Ok(ExecutionState::Terminated {
                reason: Some("terminated".to_string()),
                exit_code: snapshot.exit_code,
            }),
            SessionStatus::Disconnected => Ok(ExecutionState::Terminated {
                reason: Some(
                    snapshot
                        .disconnect_reason
                        .unwrap_or_else(|| "disconnected".to_string()),
                ),
                exit_code: snapshot.exit_code,
            }),
            SessionStatus::Running => Ok(ExecutionState::Running {
                thread_id: snapshot.current_thread_id,
            }),
            SessionStatus::Paused => {
                let thread_id = match snapshot.current_thread_id {
                    Some(id) => Some(id),
                    None => self.first_thread().await?,
                };
                let frames = match thread_id {
                    Some(id) => {
                        let stack = self.callstack(id).await?;
                        if !stack.success {
                            tracing::warn!(
                                thread_id = id,
                                "stack fetch failed: {}",
                                stack.message.as_deref().unwrap_or("no message")
                            );
                        }
                        stack.frames
                    }
                    None => Vec::new(),
                };
                Ok(ExecutionState::Paused {
                    thread_id,
                    reason: snapshot.stop_reason,
                    frames,
                })
            }
            status @ (SessionStatus::Connected | SessionStatus::Initialized) => {
                Ok(ExecutionState::NotStarted {
                    status: status.as_str(),
                })
            }
        }
    }

    async fn resolve_thread(&self) -> Result<Option<i64>, DapError> {
        match self.client.state().read(|s| s.current_thread_id) {
            Some(id) => Ok(Some(id)),
            None => self.first_thread().await,
        }
    }

    async fn first_thread(&self) -> Result<Option<i64>, DapError> {
        let threads = self.threads().await?;
        Ok(threads.threads.first().map(|t| t.id))
    }
}

fn parsed_body<T: serde::de::DeserializeOwned>(resp: &Response) -> Option<T> {
    if !resp.success {
        return None;
    }
    let parsed = resp.body_as::<T>();
    if parsed.is_none() && resp.body.is_some() {
        tracing::warn!(command = %resp.command, "response body did not match its schema");
    }
    parsed
}
