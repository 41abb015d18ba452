//! Test utilities: a scriptable PTY spawner and a broker harness.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use orbit::api::{self, AppState};
use orbit::assistant::{ImprovementRequest, Improver};
use orbit::pty::{
    ProcessEvent, ProcessSpec, PtyError, PtyProcess, PtySpawner, SpawnedProcess, TerminalSize,
};
use orbit::session::{AssistantConfig, SessionFactory, ShellConfig};
use orbit::ws::{ConnectionId, ConnectionRegistry, MessageRouter, OutboundSink};
use orbit_protocol::ServerMessage;
use serde_json::Value;
use tokio::sync::mpsc;

// ============================================================================
// Fake PTY
// ============================================================================

#[derive(Debug)]
struct ProcessRecord {
    spec: ProcessSpec,
    size: TerminalSize,
    written: Vec<u8>,
    resizes: Vec<TerminalSize>,
    kills: usize,
    exited: bool,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

/// Test-side view of one spawned fake process.
#[derive(Debug, Clone)]
pub struct FakeProcess(Arc<Mutex<ProcessRecord>>);

impl FakeProcess {
    pub fn spec(&self) -> ProcessSpec {
        self.0.lock().unwrap().spec.clone()
    }

    pub fn size(&self) -> TerminalSize {
        self.0.lock().unwrap().size
    }

    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap().written).into_owned()
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        self.0.lock().unwrap().resizes.clone()
    }

    pub fn kill_count(&self) -> usize {
        self.0.lock().unwrap().kills
    }

    pub fn is_running(&self) -> bool {
        let record = self.0.lock().unwrap();
        record.kills == 0 && !record.exited
    }

    /// Make the process print `bytes`.
    pub fn emit(&self, bytes: &[u8]) {
        let record = self.0.lock().unwrap();
        let _ = record.events.send(ProcessEvent::Output(bytes.to_vec()));
    }

    /// Make the process exit on its own.
    pub fn exit(&self, code: i32) {
        let mut record = self.0.lock().unwrap();
        record.exited = true;
        let _ = record.events.send(ProcessEvent::Exit(code));
    }
}

struct FakePty(FakeProcess);

impl PtyProcess for FakePty {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        let mut record = (self.0).0.lock().unwrap();
        if record.kills > 0 || record.exited {
            return Err(PtyError::InputClosed);
        }
        record.written.extend_from_slice(bytes);
        Ok(())
    }

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError> {
        let mut record = (self.0).0.lock().unwrap();
        record.size = size;
        record.resizes.push(size);
        Ok(())
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        (self.0).0.lock().unwrap().kills += 1;
        Ok(())
    }
}

/// Records every spawn and hands out [`FakeProcess`] controls.
#[derive(Default)]
pub struct FakeSpawner {
    processes: Mutex<Vec<FakeProcess>>,
    failures: AtomicUsize,
}

impl FakeSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` spawns fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn spawn_count(&self) -> usize {
        self.processes.lock().unwrap().len()
    }

    pub fn running_count(&self) -> usize {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_running())
            .count()
    }

    pub fn process(&self, index: usize) -> FakeProcess {
        self.processes.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> FakeProcess {
        self.processes
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no process spawned")
    }
}

impl PtySpawner for FakeSpawner {
    fn spawn(&self, spec: &ProcessSpec, size: TerminalSize) -> Result<SpawnedProcess, PtyError> {
        let failures = self.failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.failures.store(failures - 1, Ordering::SeqCst);
            return Err(PtyError::Spawn {
                program: spec.program.clone(),
                source: anyhow::anyhow!("No such file or directory"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let process = FakeProcess(Arc::new(Mutex::new(ProcessRecord {
            spec: spec.clone(),
            size,
            written: Vec::new(),
            resizes: Vec::new(),
            kills: 0,
            exited: false,
            events: tx,
        })));
        self.processes.lock().unwrap().push(process.clone());
        Ok(SpawnedProcess {
            process: Box::new(FakePty(process)),
            events: rx,
        })
    }
}

// ============================================================================
// Fake improver
// ============================================================================

/// Counts generations; optionally slow or failing.
#[derive(Default)]
pub struct CountingImprover {
    calls: AtomicUsize,
    delay: Option<Duration>,
    failures: AtomicUsize,
}

impl CountingImprover {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn failing(times: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(times),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Improver for CountingImprover {
    async fn improve(&self, request: ImprovementRequest) -> anyhow::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failures = self.failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.failures.store(failures - 1, Ordering::SeqCst);
            anyhow::bail!("generator offline");
        }
        Ok(format!(
            "improved #{call}: {} answers for {}",
            request.answers.len(),
            request.kind
        ))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub spawner: Arc<FakeSpawner>,
    pub registry: Arc<ConnectionRegistry>,
    pub sessions: SessionFactory,
    pub router: MessageRouter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_improver(CountingImprover::new())
    }

    pub fn with_improver(improver: Arc<dyn Improver>) -> Self {
        let spawner = FakeSpawner::new();
        let registry = Arc::new(ConnectionRegistry::default());
        let sessions = session_factory(spawner.clone(), improver);
        let router = MessageRouter::new(registry.clone(), sessions.clone());
        Self {
            spawner,
            registry,
            sessions,
            router,
        }
    }

    /// Register a connection the way the WebSocket handler does.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sink, rx) = OutboundSink::channel();
        let id = self.registry.create(sink).unwrap();
        (id, rx)
    }

    pub async fn send(&self, id: &str, message: Value) {
        self.router.handle_text(id, &message.to_string()).await;
    }
}

pub fn session_factory(spawner: Arc<FakeSpawner>, improver: Arc<dyn Improver>) -> SessionFactory {
    let shell = ShellConfig {
        program: Some("bash".to_string()),
        ..ShellConfig::default()
    };
    SessionFactory::new(spawner, shell, AssistantConfig::default()).with_improver(improver)
}

/// Router over a fake spawner, for HTTP and WebSocket tests.
pub fn test_app() -> (Router, Arc<FakeSpawner>, Arc<ConnectionRegistry>) {
    test_app_with_origins(Vec::new())
}

pub fn test_app_with_origins(
    allowed_origins: Vec<String>,
) -> (Router, Arc<FakeSpawner>, Arc<ConnectionRegistry>) {
    let spawner = FakeSpawner::new();
    let registry = Arc::new(ConnectionRegistry::default());
    let state = AppState::new(
        registry.clone(),
        session_factory(spawner.clone(), CountingImprover::new()),
    )
    .with_allowed_origins(allowed_origins);
    (api::create_router(state), spawner, registry)
}

// ============================================================================
// Outbound helpers
// ============================================================================

/// Wait for the next message, failing the test after two seconds.
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("outbound channel closed")
}

/// Skip messages until one matches `pred`.
pub async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<ServerMessage>, pred: F) -> ServerMessage
where
    F: Fn(&ServerMessage) -> bool,
{
    loop {
        let message = next_message(rx).await;
        if pred(&message) {
            return message;
        }
    }
}

/// Collect whatever arrives within `window`.
pub async fn drain_for(
    rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
    window: Duration,
) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(message)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        out.push(message);
    }
    out
}

/// Let spawned pump tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
