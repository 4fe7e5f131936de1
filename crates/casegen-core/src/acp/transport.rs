//! Line-delimited byte transport to an ACP agent
//!
//! The transport owns the agent's stdio (or any async stream pair), frames
//! outgoing messages, and delivers incoming frames in arrival order on a
//! bounded channel. Termination is reported exactly once as
//! [`Inbound::Closed`], after every frame that preceded it.

use super::codec::{FrameCodec, DEFAULT_MAX_FRAME_BYTES};
use crate::config::AgentCommand;
use crate::error::{AcpError, Error, Result};
use bytes::BytesMut;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Time the exit watcher waits for stdout to drain before reporting closure.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Time `stop()` waits for the killed process to be reaped.
const STOP_GRACE: Duration = Duration::from_secs(5);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Receiving half of the inbound frame channel
pub type InboundReceiver = mpsc::Receiver<Inbound>;

/// Item delivered to the correlation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete line from the agent
    Frame(String),
    /// The stream ended; nothing follows
    Closed(String),
}

/// Transport lifecycle and traffic events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Spawned { pid: Option<u32>, command: String },
    FrameSent { bytes: usize },
    FrameReceived { bytes: usize },
    FrameRejected { reason: String },
    Diagnostic { line: String },
    Exited { code: Option<i32> },
    StopRequested,
    Closed { reason: String },
}

/// Telemetry port injected at construction.
#[cfg_attr(test, mockall::automock)]
pub trait TransportObserver: Send + Sync {
    fn on_event(&self, event: &TransportEvent);
}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransportObserver for TracingObserver {
    fn on_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Spawned { pid, command } => {
                info!("Agent process started: {} (pid {:?})", command, pid)
            }
            TransportEvent::FrameSent { bytes } => trace!("Frame sent ({} bytes)", bytes),
            TransportEvent::FrameReceived { bytes } => trace!("Frame received ({} bytes)", bytes),
            TransportEvent::FrameRejected { reason } => warn!("Dropping inbound frame: {}", reason),
            TransportEvent::Diagnostic { line } => debug!("Agent stderr: {}", line),
            TransportEvent::Exited { code } => info!("Agent process exited with code {:?}", code),
            TransportEvent::StopRequested => debug!("Transport stop requested"),
            TransportEvent::Closed { reason } => info!("Transport closed: {}", reason),
        }
    }
}

/// What to do with lines the agent writes to stderr
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DiagnosticPolicy {
    /// Drain and discard
    Ignore,
    /// Surface as [`TransportEvent::Diagnostic`]
    #[default]
    Log,
    /// Surface, and close the connection when a line matches any pattern
    FailOnMatch { patterns: Vec<String> },
}

impl DiagnosticPolicy {
    fn compile(&self) -> std::result::Result<CompiledPolicy, regex::Error> {
        Ok(match self {
            Self::Ignore => CompiledPolicy::Ignore,
            Self::Log => CompiledPolicy::Log,
            Self::FailOnMatch { patterns } => CompiledPolicy::Fail(RegexSet::new(patterns)?),
        })
    }

    /// Check that every pattern is a valid regex.
    pub fn validate(&self) -> std::result::Result<(), regex::Error> {
        self.compile().map(|_| ())
    }
}

enum CompiledPolicy {
    Ignore,
    Log,
    Fail(RegexSet),
}

/// Transport tuning
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Upper bound on process launch
    pub spawn_timeout: Duration,
    pub max_frame_bytes: usize,
    pub diagnostics: DiagnosticPolicy,
    /// Capacity of the inbound frame channel
    pub inbound_buffer: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            spawn_timeout: Duration::from_secs(10),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            diagnostics: DiagnosticPolicy::default(),
            inbound_buffer: 256,
        }
    }
}

/// State shared between the transport handle and its background tasks
struct Shared {
    observers: Vec<Arc<dyn TransportObserver>>,
    /// Taken on close so no frame can follow `Inbound::Closed`
    inbound_tx: Mutex<Option<mpsc::Sender<Inbound>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns false once nobody is listening anymore.
    async fn deliver(&self, frame: String) -> bool {
        let tx = self.inbound_tx.lock().await;
        let Some(tx) = tx.as_ref() else {
            return false;
        };
        self.emit(TransportEvent::FrameReceived { bytes: frame.len() });
        tx.send(Inbound::Frame(frame)).await.is_ok()
    }

    async fn close(&self, reason: String) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.emit(TransportEvent::Closed {
            reason: reason.clone(),
        });
        let tx = self.inbound_tx.lock().await.take();
        if let Some(tx) = tx {
            let _ = tx.send(Inbound::Closed(reason)).await;
        }
    }
}

/// Transport layer for ACP communication
pub struct Transport {
    writer: Mutex<Option<BoxedWriter>>,
    codec: parking_lot::Mutex<FrameCodec>,
    shared: Arc<Shared>,
    stopped: AtomicBool,
    pid: Option<u32>,
    exit_task: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Spawn the agent process and start reading its output.
    ///
    /// Resolves once the process is confirmed running, or fails with a
    /// transport error when it cannot be started within `spawn_timeout`.
    pub async fn spawn(
        command: &AgentCommand,
        options: &TransportOptions,
        observers: Vec<Arc<dyn TransportObserver>>,
    ) -> Result<(Self, InboundReceiver)> {
        debug!(
            "Spawning agent: {} {:?} (cwd: {:?})",
            command.command, command.args, command.cwd
        );

        let policy = options.diagnostics.compile().map_err(|e| {
            Error::Acp(AcpError::Transport(format!(
                "Invalid diagnostic pattern: {}",
                e
            )))
        })?;

        let mut cmd = Command::new(&command.command);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let launch = async {
            let mut child = cmd.spawn().map_err(|e| {
                Error::Acp(AcpError::Transport(format!(
                    "Failed to spawn agent process {}: {}",
                    command.command, e
                )))
            })?;
            match child.try_wait() {
                Ok(None) => Ok(child),
                Ok(Some(status)) => Err(Error::Acp(AcpError::Transport(format!(
                    "Agent process exited during startup ({})",
                    status
                )))),
                Err(e) => Err(Error::Acp(AcpError::Transport(format!(
                    "Failed to query agent process: {}",
                    e
                )))),
            }
        };

        let mut child = tokio::time::timeout(options.spawn_timeout, launch)
            .await
            .map_err(|_| {
                Error::Acp(AcpError::Transport(format!(
                    "Agent process did not start within {:?}",
                    options.spawn_timeout
                )))
            })??;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::Acp(AcpError::Transport("Failed to capture stdin".to_string()))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::Acp(AcpError::Transport("Failed to capture stdout".to_string()))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::Acp(AcpError::Transport("Failed to capture stderr".to_string()))
        })?;

        let pid = child.id();
        let (transport, inbound_rx) = Self::assemble(Box::new(stdin), options, observers, pid);
        transport.shared.emit(TransportEvent::Spawned {
            pid,
            command: command.command.clone(),
        });

        let reader_done = CancellationToken::new();
        tokio::spawn(read_frames(
            stdout,
            FrameCodec::with_max_frame_bytes(options.max_frame_bytes),
            Arc::clone(&transport.shared),
            reader_done.clone(),
        ));
        tokio::spawn(read_diagnostics(stderr, policy, Arc::clone(&transport.shared)));
        let exit_task = tokio::spawn(watch_exit(child, Arc::clone(&transport.shared), reader_done));
        *transport.exit_task.lock().await = Some(exit_task);

        Ok((transport, inbound_rx))
    }

    /// Run the same framing over an arbitrary stream pair.
    pub fn from_streams<R, W>(
        reader: R,
        writer: W,
        options: &TransportOptions,
        observers: Vec<Arc<dyn TransportObserver>>,
    ) -> (Self, InboundReceiver)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (transport, inbound_rx) = Self::assemble(Box::new(writer), options, observers, None);
        tokio::spawn(read_frames(
            reader,
            FrameCodec::with_max_frame_bytes(options.max_frame_bytes),
            Arc::clone(&transport.shared),
            CancellationToken::new(),
        ));
        (transport, inbound_rx)
    }

    fn assemble(
        writer: BoxedWriter,
        options: &TransportOptions,
        observers: Vec<Arc<dyn TransportObserver>>,
        pid: Option<u32>,
    ) -> (Self, InboundReceiver) {
        let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_buffer.max(1));
        let shared = Arc::new(Shared {
            observers,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });
        let transport = Self {
            writer: Mutex::new(Some(writer)),
            codec: parking_lot::Mutex::new(FrameCodec::with_max_frame_bytes(
                options.max_frame_bytes,
            )),
            shared,
            stopped: AtomicBool::new(false),
            pid,
            exit_task: Mutex::new(None),
        };
        (transport, inbound_rx)
    }

    /// OS process id, for process transports.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.shared.is_closed()
    }

    /// Write one frame and flush it.
    ///
    /// Writes are serialized; the call returns once the stream has accepted
    /// the bytes.
    pub async fn send(&self, frame: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Acp(AcpError::ProcessNotRunning));
        }

        let mut bytes = BytesMut::with_capacity(frame.len() + 1);
        self.codec.lock().encode(frame, &mut bytes)?;
        let len = bytes.len();

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or(Error::Acp(AcpError::ProcessNotRunning))?;

        let written = tokio::select! {
            _ = self.shared.shutdown.cancelled() => {
                return Err(Error::Acp(AcpError::ProcessNotRunning));
            }
            written = async {
                writer.write_all(&bytes).await?;
                writer.flush().await
            } => written,
        };

        match written {
            Ok(()) => {
                self.shared.emit(TransportEvent::FrameSent { bytes: len });
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("Agent stdin closed: {}", e);
                Err(Error::Acp(AcpError::ProcessNotRunning))
            }
            Err(e) => {
                error!("Failed to write to agent: {}", e);
                Err(Error::Acp(AcpError::Transport(format!(
                    "Failed to write frame: {}",
                    e
                ))))
            }
        }
    }

    /// Stop the transport: cancel readers, kill the process, close stdin.
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.emit(TransportEvent::StopRequested);
        self.shared.close("transport stopped".to_string()).await;

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        let exit_task = self.exit_task.lock().await.take();
        if let Some(task) = exit_task {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                warn!("Agent process was not reaped within {:?}", STOP_GRACE);
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Read stdout into a buffer and split it into frames.
async fn read_frames<R>(
    mut reader: R,
    mut codec: FrameCodec,
    shared: Arc<Shared>,
    done: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);

    let reason = 'read: loop {
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    if !shared.deliver(frame).await {
                        break 'read "inbound channel closed".to_string();
                    }
                }
                Ok(None) => break,
                Err(e) => shared.emit(TransportEvent::FrameRejected {
                    reason: e.to_string(),
                }),
            }
        }

        let read = tokio::select! {
            _ = shared.shutdown.cancelled() => break 'read "transport stopped".to_string(),
            read = reader.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                loop {
                    match codec.decode_eof(&mut buf) {
                        Ok(Some(frame)) => {
                            if !shared.deliver(frame).await {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => shared.emit(TransportEvent::FrameRejected {
                            reason: e.to_string(),
                        }),
                    }
                }
                debug!("Agent stdout closed");
                break 'read "agent closed its output stream".to_string();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error reading agent stdout: {}", e);
                break 'read format!("read failed: {}", e);
            }
        }
    };

    done.cancel();
    shared.close(reason).await;
}

/// Drain stderr so the agent can't block on a full pipe.
async fn read_diagnostics(stderr: ChildStderr, policy: CompiledPolicy, shared: Arc<Shared>) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        let line = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Error reading agent stderr: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match &policy {
            CompiledPolicy::Ignore => {}
            CompiledPolicy::Log => shared.emit(TransportEvent::Diagnostic {
                line: line.to_string(),
            }),
            CompiledPolicy::Fail(patterns) => {
                shared.emit(TransportEvent::Diagnostic {
                    line: line.to_string(),
                });
                if patterns.is_match(line) {
                    warn!("Fatal agent diagnostic: {}", line);
                    shared
                        .close(format!("fatal agent diagnostic: {}", line))
                        .await;
                    break;
                }
            }
        }
    }
    debug!("Agent stderr reader ended");
}

/// Wait for the process to exit (or kill it on shutdown) and report closure.
async fn watch_exit(mut child: Child, shared: Arc<Shared>, reader_done: CancellationToken) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = shared.shutdown.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!("Failed to kill agent process: {}", e);
            }
            child.wait().await
        }
    };

    shared.emit(TransportEvent::Exited {
        code: status.as_ref().ok().and_then(|s| s.code()),
    });

    // Frames written just before exit must reach the consumer first.
    let _ = tokio::time::timeout(EXIT_GRACE, reader_done.cancelled()).await;

    let reason = match status {
        Ok(status) => format!("agent process exited ({})", status),
        Err(e) => format!("failed to wait for agent process: {}", e),
    };
    shared.close(reason).await;
}
