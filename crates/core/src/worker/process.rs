//! Child-process workers speaking newline-delimited JSON
//!
//! Each request is written to the child's stdin as one line:
//!
//! ```text
//! {"id": 7, "request": {"type": "render", "document_id": "d1", "page": 2, "scale": 1.0}}
//! ```
//!
//! and the child answers on stdout with one line per request:
//!
//! ```text
//! {"id": 7, "ok": true, "result": {...}}
//! {"id": 7, "ok": false, "error": "invalid pdf structure"}
//! ```
//!
//! EOF or a broken pipe means the worker crashed; a line that does not
//! parse or answers the wrong id is a protocol error.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::ports::{WorkerFault, WorkerProcess, WorkerRequest, WorkerSpawner};

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    request: &'a WorkerRequest,
}

#[derive(Deserialize)]
struct Response {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

struct Channel {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Spawns workers by running a program
#[derive(Debug, Clone)]
pub struct ProcessWorkerSpawner {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl ProcessWorkerSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), envs: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl WorkerSpawner for ProcessWorkerSpawner {
    async fn spawn(&self, id: &str) -> Result<Arc<dyn WorkerProcess>, WorkerFault> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("DOCRECOVER_WORKER_ID", id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerFault::Spawn(format!("{}: {e}", self.program.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerFault::Spawn("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerFault::Spawn("worker stdout unavailable".to_string()))?;

        debug!(worker_id = id, pid = child.id(), "Spawned worker process");
        Ok(Arc::new(ProcessWorker {
            id: id.to_string(),
            child: Mutex::new(child),
            channel: Mutex::new(Channel { stdin, stdout: BufReader::new(stdout).lines() }),
            next_request: AtomicU64::new(1),
        }))
    }
}

/// A worker backed by a child process
pub struct ProcessWorker {
    id: String,
    child: Mutex<Child>,
    channel: Mutex<Channel>,
    next_request: AtomicU64,
}

#[async_trait]
impl WorkerProcess for ProcessWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, request: WorkerRequest) -> Result<serde_json::Value, WorkerFault> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_string(&Envelope { id: request_id, request: &request })
            .map_err(|e| WorkerFault::Protocol(e.to_string()))?;
        line.push('\n');

        let mut channel = self.channel.lock().await;
        let crashed = |e: std::io::Error| WorkerFault::Crashed(e.to_string());
        channel.stdin.write_all(line.as_bytes()).await.map_err(crashed)?;
        channel.stdin.flush().await.map_err(crashed)?;

        let reply = channel
            .stdout
            .next_line()
            .await
            .map_err(crashed)?
            .ok_or_else(|| WorkerFault::Crashed("worker closed its output".to_string()))?;

        let response: Response = serde_json::from_str(&reply)
            .map_err(|e| WorkerFault::Protocol(format!("unreadable response: {e}")))?;
        if response.id != request_id {
            return Err(WorkerFault::Protocol(format!(
                "expected response {request_id}, got {}",
                response.id
            )));
        }

        if response.ok {
            Ok(response.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(WorkerFault::Task(response.error.unwrap_or_else(|| "worker task failed".to_string())))
        }
    }

    async fn terminate(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!(worker_id = %self.id, error = %e, "Worker already gone");
        }
    }
}
