//! Background receive loop.
//!
//! One [`MessageReceiver`] per client owns at most one task that pulls
//! messages off the [`Transport`] and hands them to a [`MessageProcessor`].
//! The loop tolerates timeouts and up to `max_consecutive_failures - 1`
//! read errors in a row; a disconnect or reaching the limit ends it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DapError;
use crate::protocol::Message;
use crate::state::SharedState;
use crate::transport::{Received, Transport};

/// The consumer of received messages.
///
/// Implementations must not block; long work belongs on a spawned task.
pub trait MessageProcessor: Send + Sync + 'static {
    /// Handle one message. Errors and panics are logged by the receiver and
    /// never end the loop.
    fn process_message(&self, message: Message) -> Result<(), DapError>;

    /// Whether the session reached a terminal state.
    fn is_terminated(&self) -> bool;

    /// The loop ended. Called once per started loop.
    fn receiver_exited(&self, exit: &ReceiverExit);
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    Idle,
    Running,
    Stopping,
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverExit {
    /// `stop` was called.
    Stopped,
    /// The transport went away.
    Disconnected(String),
    /// Too many consecutive read failures.
    Unhealthy {
        /// Failure count at exit.
        failures: u32,
    },
    /// The processor reported a terminal session.
    Terminated,
}

impl ReceiverExit {
    /// Human-readable reason, for failing in-flight requests.
    pub fn describe(&self) -> String {
        match self {
            ReceiverExit::Stopped => "receiver stopped".to_string(),
            ReceiverExit::Disconnected(reason) => format!("adapter disconnected: {reason}"),
            ReceiverExit::Unhealthy { failures } => {
                format!("adapter unhealthy after {failures} consecutive failures")
            }
            ReceiverExit::Terminated => "session terminated".to_string(),
        }
    }
}

struct Control {
    phase: ReceiverPhase,
    generation: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    processor: Option<Arc<dyn MessageProcessor>>,
    last_exit: Option<ReceiverExit>,
}

/// Owner of the background receive task.
pub struct MessageReceiver {
    transport: Arc<dyn Transport>,
    state: SharedState,
    control: Arc<Mutex<Control>>,
}

impl MessageReceiver {
    /// A receiver in the [`Idle`](ReceiverPhase::Idle) phase.
    pub fn new(transport: Arc<dyn Transport>, state: SharedState) -> Self {
        Self {
            transport,
            state,
            control: Arc::new(Mutex::new(Control {
                phase: ReceiverPhase::Idle,
                generation: 0,
                cancel: CancellationToken::new(),
                handle: None,
                processor: None,
                last_exit: None,
            })),
        }
    }

    /// Spawn the loop, or return the generation of the one already running.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(&self, processor: Arc<dyn MessageProcessor>) -> u64 {
        let mut control = self.control.lock();
        if control.phase == ReceiverPhase::Running {
            return control.generation;
        }

        control.generation += 1;
        let generation = control.generation;
        let cancel = CancellationToken::new();
        control.cancel = cancel.clone();
        control.phase = ReceiverPhase::Running;
        control.processor = Some(processor.clone());
        self.state.update(|s| s.receiver_generation = Some(generation));

        let task = ReceiveLoop {
            transport: self.transport.clone(),
            state: self.state.clone(),
            processor,
            cancel,
        };
        let shared = self.control.clone();
        let state = self.state.clone();
        control.handle = Some(tokio::spawn(async move {
            let exit = match AssertUnwindSafe(task.run()).catch_unwind().await {
                Ok(exit) => exit,
                Err(payload) => {
                    let reason = format!("receiver panicked: {}", panic_message(&*payload));
                    tracing::error!(generation, "{reason}");
                    state.update(|s| s.mark_disconnected(reason.clone()));
                    ReceiverExit::Disconnected(reason)
                }
            };
            tracing::debug!(generation, ?exit, "receiver loop exited");
            finish(&shared, generation, exit);
        }));
        tracing::debug!(generation, "receiver started");
        generation
    }

    /// Signal the loop and wait up to `timeout` for it to exit, then abort.
    ///
    /// No-op when not running.
    pub async fn stop(&self, timeout: Duration) {
        let (handle, generation) = {
            let mut control = self.control.lock();
            if control.phase != ReceiverPhase::Running {
                return;
            }
            control.phase = ReceiverPhase::Stopping;
            control.cancel.cancel();
            (control.handle.take(), control.generation)
        };

        if let Some(mut handle) = handle {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(generation, "receiver task failed: {e}"),
                Err(_) => {
                    tracing::warn!(
                        generation,
                        "receiver did not stop within {timeout:?}; aborting"
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        // The loop checks cancellation before every read, so the abort above
        // only happens while a processor call blocks the task. Only then
        // is there work left to do here.
        finish(&self.control, generation, ReceiverExit::Stopped);
    }

    /// Whether a loop is running and not asked to stop.
    pub fn is_running(&self) -> bool {
        self.control.lock().phase == ReceiverPhase::Running
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.control.lock().phase
    }

    /// Generation of the most recently started loop; 0 before the first start.
    pub fn generation(&self) -> u64 {
        self.control.lock().generation
    }

    /// How the most recent loop ended.
    pub fn last_exit(&self) -> Option<ReceiverExit> {
        self.control.lock().last_exit.clone()
    }
}

/// Record the exit of `generation` and notify its processor, once.
fn finish(control: &Mutex<Control>, generation: u64, exit: ReceiverExit) {
    let processor = {
        let mut c = control.lock();
        if c.generation != generation || c.phase == ReceiverPhase::Idle {
            return;
        }
        c.phase = ReceiverPhase::Idle;
        c.last_exit = Some(exit.clone());
        c.processor.take()
    };
    if let Some(processor) = processor {
        processor.receiver_exited(&exit);
    }
}

struct ReceiveLoop {
    transport: Arc<dyn Transport>,
    state: SharedState,
    processor: Arc<dyn MessageProcessor>,
    cancel: CancellationToken,
}

impl ReceiveLoop {
    async fn run(self) -> ReceiverExit {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ReceiverExit::Stopped,
                received = self.transport.receive_message() => received,
            };

            match received {
                Received::Message(message) => {
                    self.state.update(|s| s.consecutive_failures = 0);
                    self.handle_message(message);
                    if self.processor.is_terminated() {
                        return ReceiverExit::Terminated;
                    }
                }
                Received::Timeout => {
                    tracing::trace!("receive timed out; polling again");
                }
                Received::Disconnected(reason) => {
                    if self.cancel.is_cancelled() {
                        return ReceiverExit::Stopped;
                    }
                    tracing::error!(%reason, "debug adapter connection lost");
                    self.state.update(|s| s.mark_disconnected(reason.clone()));
                    return ReceiverExit::Disconnected(reason);
                }
                Received::Error(detail) => {
                    if self.cancel.is_cancelled() {
                        return ReceiverExit::Stopped;
                    }
                    let (failures, max) = self
                        .state
                        .update(|s| (s.record_failure(), s.max_consecutive_failures()));
                    tracing::warn!(failures, max, "receive failed: {detail}");
                    if failures >= max {
                        tracing::error!(failures, "too many consecutive receive failures");
                        return ReceiverExit::Unhealthy { failures };
                    }
                }
            }
        }
    }

    fn handle_message(&self, message: Message) {
        let seq = message.seq();
        let processor = &self.processor;
        match std::panic::catch_unwind(AssertUnwindSafe(|| processor.process_message(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(?seq, "failed to process message: {e}"),
            Err(payload) => {
                tracing::error!(?seq, "message processor panicked: {}", panic_message(&*payload));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Event;
    use crate::state::HealthPolicy;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Plays back a fixed script, then blocks forever.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Received>>,
        receive_calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Received>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                receive_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn is_connected(&self) -> bool {
            true
        }

        async fn receive_message(&self) -> Received {
            self.receive_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            match next {
                Some(r) => r,
                None => std::future::pending().await,
            }
        }

        async fn send_message(&self, _message: &Message) -> Result<(), DapError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct RecordingProcessor {
        seen: Mutex<Vec<i64>>,
        panic_on: Option<i64>,
        fail_on: Option<i64>,
        terminate_after: Option<usize>,
        terminated: AtomicBool,
        exits: Mutex<Vec<ReceiverExit>>,
    }

    impl MessageProcessor for RecordingProcessor {
        fn process_message(&self, message: Message) -> Result<(), DapError> {
            let seq = message.seq().unwrap_or(-1);
            if Some(seq) == self.panic_on {
                panic!("handler blew up on {seq}");
            }
            let count = {
                let mut seen = self.seen.lock();
                seen.push(seq);
                seen.len()
            };
            if Some(count) == self.terminate_after {
                self.terminated.store(true, Ordering::SeqCst);
            }
            if Some(seq) == self.fail_on {
                return Err(DapError::InvalidResponse("bad body".into()));
            }
            Ok(())
        }

        fn is_terminated(&self) -> bool {
            self.terminated.load(Ordering::SeqCst)
        }

        fn receiver_exited(&self, exit: &ReceiverExit) {
            self.exits.lock().push(exit.clone());
        }
    }

    fn msg(seq: i64) -> Received {
        Received::Message(Message::Event(Event::new(seq, "output", None)))
    }

    fn connected_state() -> SharedState {
        let state = SharedState::new(HealthPolicy::default());
        state.update(|s| s.mark_connected());
        state
    }

    async fn wait_until_idle(receiver: &MessageReceiver) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while receiver.phase() != ReceiverPhase::Idle {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("receiver did not exit");
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn start_twice_runs_one_loop() {
        let transport = ScriptedTransport::new(vec![]);
        let receiver = MessageReceiver::new(transport.clone(), connected_state());
        let processor = Arc::new(RecordingProcessor::default());

        let first = receiver.start(processor.clone());
        let second = receiver.start(processor.clone());
        assert_eq!(first, second);
        settle().await;

        assert_eq!(transport.receive_calls.load(Ordering::SeqCst), 1);
        assert!(receiver.is_running());

        receiver.stop(Duration::from_secs(1)).await;
        assert!(!receiver.is_running());
        assert_eq!(receiver.last_exit(), Some(ReceiverExit::Stopped));
        assert_eq!(*processor.exits.lock(), vec![ReceiverExit::Stopped]);
    }

    #[tokio::test]
    async fn stop_when_idle_is_noop() {
        let receiver = MessageReceiver::new(ScriptedTransport::new(vec![]), connected_state());
        receiver.stop(Duration::from_millis(10)).await;
        receiver.stop(Duration::from_millis(10)).await;
        assert_eq!(receiver.phase(), ReceiverPhase::Idle);
        assert!(receiver.last_exit().is_none());
    }

    #[tokio::test]
    async fn restart_uses_new_generation() {
        let state = connected_state();
        let receiver = MessageReceiver::new(ScriptedTransport::new(vec![]), state.clone());
        let processor = Arc::new(RecordingProcessor::default());

        let first = receiver.start(processor.clone());
        receiver.stop(Duration::from_secs(1)).await;
        let second = receiver.start(processor.clone());
        assert_eq!(second, first + 1);
        assert_eq!(state.read(|s| s.receiver_generation), Some(second));
        receiver.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn connection_loss_after_two_messages() {
        let state = connected_state();
        let transport = ScriptedTransport::new(vec![
            msg(1),
            msg(2),
            Received::Disconnected("connection reset by peer".into()),
        ]);
        let receiver = MessageReceiver::new(transport, state.clone());
        let processor = Arc::new(RecordingProcessor::default());

        receiver.start(processor.clone());
        wait_until_idle(&receiver).await;

        assert_eq!(*processor.seen.lock(), vec![1, 2]);
        assert!(!state.read(|s| s.connected));
        assert_eq!(
            state.read(|s| s.disconnect_reason.clone()).as_deref(),
            Some("connection reset by peer")
        );
        let exit = ReceiverExit::Disconnected("connection reset by peer".into());
        assert_eq!(receiver.last_exit(), Some(exit.clone()));
        assert_eq!(*processor.exits.lock(), vec![exit]);

        // Already idle, nothing to cancel.
        receiver.stop(Duration::from_millis(10)).await;
        assert_eq!(processor.exits.lock().len(), 1);
    }

    #[tokio::test]
    async fn consecutive_failures_exhaust_at_limit() {
        let state = connected_state();
        let transport = ScriptedTransport::new(vec![
            Received::Error("bad frame".into()),
            Received::Error("bad frame".into()),
            Received::Error("bad frame".into()),
            msg(99),
        ]);
        let receiver = MessageReceiver::new(transport, state.clone());
        let processor = Arc::new(RecordingProcessor::default());

        receiver.start(processor.clone());
        wait_until_idle(&receiver).await;

        assert_eq!(state.read(|s| s.consecutive_failures), 3);
        assert_eq!(
            receiver.last_exit(),
            Some(ReceiverExit::Unhealthy { failures: 3 })
        );
        assert!(processor.seen.lock().is_empty());
        assert!(!state.is_healthy());
    }

    #[tokio::test]
    async fn message_resets_failure_count() {
        let state = connected_state();
        let transport = ScriptedTransport::new(vec![
            Received::Error("x".into()),
            Received::Error("x".into()),
            msg(1),
            Received::Error("x".into()),
            Received::Error("x".into()),
        ]);
        let receiver = MessageReceiver::new(transport, state.clone());
        let processor = Arc::new(RecordingProcessor::default());

        receiver.start(processor.clone());
        settle().await;

        assert!(receiver.is_running());
        assert_eq!(state.read(|s| s.consecutive_failures), 2);
        assert_eq!(*processor.seen.lock(), vec![1]);
        receiver.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn timeouts_are_soft() {
        let state = connected_state();
        let mut script: Vec<Received> = (0..5).map(|_| Received::Timeout).collect();
        script.push(msg(7));
        let receiver = MessageReceiver::new(ScriptedTransport::new(script), state.clone());
        let processor = Arc::new(RecordingProcessor::default());

        receiver.start(processor.clone());
        settle().await;

        assert!(receiver.is_running());
        assert_eq!(state.read(|s| s.consecutive_failures), 0);
        assert_eq!(*processor.seen.lock(), vec![7]);
        receiver.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn panicking_processor_does_not_stop_loop() {
        let transport = ScriptedTransport::new(vec![msg(1), msg(2), msg(3)]);
        let receiver = MessageReceiver::new(transport, connected_state());
        let processor = Arc::new(RecordingProcessor {
            panic_on: Some(1),
            fail_on: Some(2),
            ..Default::default()
        });

        receiver.start(processor.clone());
        settle().await;

        assert!(receiver.is_running());
        assert_eq!(*processor.seen.lock(), vec![2, 3]);
        receiver.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn terminated_session_ends_loop() {
        let transport = ScriptedTransport::new(vec![msg(1), msg(2), msg(3)]);
        let receiver = MessageReceiver::new(transport, connected_state());
        let processor = Arc::new(RecordingProcessor {
            terminate_after: Some(2),
            ..Default::default()
        });

        receiver.start(processor.clone());
        wait_until_idle(&receiver).await;

        assert_eq!(*processor.seen.lock(), vec![1, 2]);
        assert_eq!(receiver.last_exit(), Some(ReceiverExit::Terminated));
    }

    /// Fails the way a bad length header used to: by panicking mid-read.
    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        fn is_connected(&self) -> bool {
            true
        }

        async fn receive_message(&self) -> Received {
            panic!("capacity overflow")
        }

        async fn send_message(&self, _message: &Message) -> Result<(), DapError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn panicking_read_still_records_exit() {
        let state = connected_state();
        let receiver = MessageReceiver::new(Arc::new(PanickingTransport), state.clone());
        let processor = Arc::new(RecordingProcessor::default());

        let first = receiver.start(processor.clone());
        wait_until_idle(&receiver).await;

        match receiver.last_exit() {
            Some(ReceiverExit::Disconnected(reason)) => {
                assert!(reason.contains("capacity overflow"), "{reason}")
            }
            other => panic!("expected disconnect exit, got {other:?}"),
        }
        assert_eq!(processor.exits.lock().len(), 1);
        assert!(!state.read(|s| s.connected));

        // The receiver is not wedged: a fresh loop can start.
        assert_eq!(receiver.start(processor.clone()), first + 1);
        wait_until_idle(&receiver).await;
    }

    /// Holds the task inside a synchronous call, out of reach of the
    /// cancellation token.
    struct BlockingProcessor {
        block: Duration,
        exits: Mutex<Vec<ReceiverExit>>,
    }

    impl MessageProcessor for BlockingProcessor {
        fn process_message(&self, _message: Message) -> Result<(), DapError> {
            std::thread::sleep(self.block);
            Ok(())
        }

        fn is_terminated(&self) -> bool {
            false
        }

        fn receiver_exited(&self, exit: &ReceiverExit) {
            self.exits.lock().push(exit.clone());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_aborts_after_grace_period() {
        let receiver = MessageReceiver::new(ScriptedTransport::new(vec![msg(1)]), connected_state());
        let processor = Arc::new(BlockingProcessor {
            block: Duration::from_millis(400),
            exits: Mutex::new(Vec::new()),
        });

        receiver.start(processor.clone());
        settle().await;

        let grace = Duration::from_millis(50);
        let started = std::time::Instant::now();
        receiver.stop(grace).await;

        assert!(started.elapsed() >= grace);
        assert_eq!(receiver.phase(), ReceiverPhase::Idle);
        assert_eq!(receiver.last_exit(), Some(ReceiverExit::Stopped));
        assert_eq!(*processor.exits.lock(), vec![ReceiverExit::Stopped]);
    }

    #[test]
    fn exit_descriptions() {
        assert_eq!(ReceiverExit::Stopped.describe(), "receiver stopped");
        assert!(ReceiverExit::Disconnected("eof".into())
            .describe()
            .contains("eof"));
        assert!(ReceiverExit::Unhealthy { failures: 3 }
            .describe()
            .contains("3 consecutive"));
    }
}
