//! tether-dap: Debug Adapter Protocol session core.
//!
//! Frames and parses DAP traffic, correlates requests with responses,
//! runs the background receiver, tracks session health, and shapes
//! breakpoint and stack data for callers.

pub mod breakpoints;
pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod registry;
pub mod stack;
pub mod state;
pub mod transport;

pub use breakpoints::{BreakpointSpec, HitCondition};
pub use client::{ClientOptions, DapClient, ANY_EVENT};
pub use error::{BreakpointError, DapError};
pub use protocol::{DapEvent, Event, Message, Request, Response};
pub use receiver::{MessageReceiver, ReceiverExit};
pub use registry::SessionRegistry;
pub use stack::{ExecutionState, StackService};
pub use state::{HealthPolicy, SessionState, SessionStatus, SharedState};
pub use transport::{Received, StreamTransport, TcpTransport, Transport};
