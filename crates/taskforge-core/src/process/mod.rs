//! Process launching and background process management
//!
//! Commands run through `sh -c` in their own process group so a timeout or a
//! kill terminates every child the command started.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};

pub type ProcessId = String;

const CAPTURE_MAX_LINES: usize = 5000;
const CAPTURE_MAX_BYTES: usize = 512 * 1024;
const READER_JOIN_TIMEOUT_MS: u64 = 500;
const KILL_GRACE_MS: u64 = 200;

/// Line buffer that drops the oldest lines once either limit is exceeded
pub struct BoundedOutputBuffer {
    lines: VecDeque<String>,
    total_bytes: usize,
    dropped_lines: usize,
    max_lines: usize,
    max_bytes: usize,
}

impl BoundedOutputBuffer {
    pub fn new(max_lines: usize, max_bytes: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            total_bytes: 0,
            dropped_lines: 0,
            max_lines,
            max_bytes,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        let kept = tail_by_bytes(line, self.max_bytes);
        self.total_bytes += kept.len();
        self.lines.push_back(kept);

        while self.lines.len() > self.max_lines || self.total_bytes > self.max_bytes {
            let Some(removed) = self.lines.pop_front() else {
                break;
            };
            self.total_bytes -= removed.len();
            self.dropped_lines += 1;
        }
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        if self.dropped_lines > 0 {
            out.push_str(&format!(
                "[... omitted {} earlier line(s) due to buffer limits ...]\n",
                self.dropped_lines
            ));
        }
        out.push_str(&self.lines.iter().cloned().collect::<Vec<_>>().join("\n"));
        out
    }
}

fn tail_by_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

type SharedBuffer = Arc<Mutex<BoundedOutputBuffer>>;

fn new_buffer() -> SharedBuffer {
    Arc::new(Mutex::new(BoundedOutputBuffer::new(
        CAPTURE_MAX_LINES,
        CAPTURE_MAX_BYTES,
    )))
}

fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        #[cfg(unix)]
        c.process_group(0);
        c
    };
    cmd.current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    cmd
}

/// Spawn readers for both pipes of `child`, feeding one shared buffer
fn capture_output(child: &mut Child, buffer: &SharedBuffer) -> [tokio::task::JoinHandle<()>; 2] {
    [
        tokio::spawn(collect_pipe(child.stdout.take(), Arc::clone(buffer))),
        tokio::spawn(collect_pipe(child.stderr.take(), Arc::clone(buffer))),
    ]
}

async fn collect_pipe<R>(pipe: Option<R>, buffer: SharedBuffer)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        buffer.lock().push_line(&line);
    }
}

async fn join_reader(mut handle: tokio::task::JoinHandle<()>) {
    if timeout(Duration::from_millis(READER_JOIN_TIMEOUT_MS), &mut handle)
        .await
        .is_err()
    {
        handle.abort();
    }
}

/// TERM the process group, then KILL whatever survives the grace period
async fn terminate_process_tree(pid: u32) {
    #[cfg(unix)]
    {
        let pgid = format!("-{}", pid);
        let group_ok = std::process::Command::new("kill")
            .args(["-TERM", &pgid])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !group_ok {
            let _ = std::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status();
        }

        sleep(Duration::from_millis(KILL_GRACE_MS)).await;

        let still_running = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if still_running {
            let _ = std::process::Command::new("kill")
                .args(["-KILL", &pgid])
                .status();
        }
    }

    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output();
    }
}

/// Result of a blocking launch
#[derive(Debug)]
pub struct ForegroundOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
    pub output: String,
}

/// Run a command to completion, killing its process tree on timeout.
/// Output captured before the timeout is kept.
pub async fn run_foreground(
    command: &str,
    cwd: &Path,
    limit: Duration,
) -> std::io::Result<ForegroundOutcome> {
    let mut child = shell_command(command, cwd).kill_on_drop(true).spawn()?;
    let buffer = new_buffer();
    let [stdout_reader, stderr_reader] = capture_output(&mut child, &buffer);

    let (exit_code, timed_out) = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => (exit_code_of(status), false),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Process wait error");
            (-1, false)
        }
        Err(_) => {
            if let Some(pid) = child.id() {
                terminate_process_tree(pid).await;
            }
            if timeout(Duration::from_millis(KILL_GRACE_MS), child.wait())
                .await
                .is_err()
            {
                let _ = child.kill().await;
            }
            (-1, true)
        }
    };

    join_reader(stdout_reader).await;
    join_reader(stderr_reader).await;

    let output = buffer.lock().text();
    Ok(ForegroundOutcome {
        exit_code,
        timed_out,
        output,
    })
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

/// Status of a tracked process
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Completed { exit_code: i32, duration_ms: u64 },
    Failed { error: String, duration_ms: u64 },
    Killed { duration_ms: u64 },
}

/// Information about a tracked process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub command: String,
    pub pid: Option<u32>,
    pub started_at: i64,
    pub status: ProcessStatus,
    pub working_dir: PathBuf,
}

impl ProcessInfo {
    pub fn is_running(&self) -> bool {
        matches!(self.status, ProcessStatus::Running)
    }

    pub fn display_status(&self) -> &'static str {
        match &self.status {
            ProcessStatus::Running => "running",
            ProcessStatus::Completed { .. } => "done",
            ProcessStatus::Failed { .. } => "failed",
            ProcessStatus::Killed { .. } => "killed",
        }
    }
}

struct ProcessEntry {
    info: ProcessInfo,
    started: Instant,
    output: SharedBuffer,
    /// Keep handle alive to prevent task cancellation
    _monitor: tokio::task::JoinHandle<()>,
}

/// Registry for tracking background processes
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    processes: Arc<RwLock<HashMap<ProcessId, ProcessEntry>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a background process and track it
    pub async fn spawn(&self, command: &str, working_dir: &Path) -> Result<ProcessId> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut child = shell_command(command, working_dir).spawn()?;
        let pid = child.id();
        let output = new_buffer();
        let readers = capture_output(&mut child, &output);
        let started = Instant::now();

        tracing::info!(id = %id, pid = ?pid, command = %command, "Process spawned");

        // Held until the entry is inserted so a fast exit cannot race `finish`
        let mut processes = self.processes.write().await;
        let registry = self.clone();
        let process_id = id.clone();
        let monitor = tokio::spawn(async move {
            let result = child.wait().await;
            let duration_ms = crate::duration_ms(started.elapsed());
            for reader in readers {
                join_reader(reader).await;
            }

            let status = match result {
                Ok(status) if status.success() => ProcessStatus::Completed {
                    exit_code: 0,
                    duration_ms,
                },
                Ok(status) => ProcessStatus::Failed {
                    error: format!("Exit code: {}", exit_code_of(status)),
                    duration_ms,
                },
                Err(e) => ProcessStatus::Failed {
                    error: e.to_string(),
                    duration_ms,
                },
            };
            registry.finish(&process_id, status).await;
        });

        let entry = ProcessEntry {
            info: ProcessInfo {
                id: id.clone(),
                command: command.to_string(),
                pid,
                started_at: crate::unix_timestamp(),
                status: ProcessStatus::Running,
                working_dir: working_dir.to_path_buf(),
            },
            started,
            output,
            _monitor: monitor,
        };
        processes.insert(id.clone(), entry);

        Ok(id)
    }

    /// Record the exit status unless the process was already killed
    async fn finish(&self, id: &str, status: ProcessStatus) {
        let mut processes = self.processes.write().await;
        if let Some(entry) = processes.get_mut(id) {
            if entry.info.is_running() {
                tracing::info!(id = %id, status = ?status, "Process finished");
                entry.info.status = status;
            }
        }
    }

    /// Kill a running process and its children
    pub async fn kill(&self, id: &str) -> Result<()> {
        let pid = {
            let mut processes = self.processes.write().await;
            let entry = processes
                .get_mut(id)
                .ok_or_else(|| anyhow::anyhow!("Process not found: {}", id))?;
            if !entry.info.is_running() {
                anyhow::bail!("Process not running: {}", id);
            }
            entry.info.status = ProcessStatus::Killed {
                duration_ms: crate::duration_ms(entry.started.elapsed()),
            };
            entry.info.pid
        };

        if let Some(pid) = pid {
            terminate_process_tree(pid).await;
        }
        tracing::info!(id = %id, "Process killed");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<ProcessInfo> {
        self.processes.read().await.get(id).map(|e| e.info.clone())
    }

    /// Output captured so far
    pub async fn output(&self, id: &str) -> Option<String> {
        self.processes
            .read()
            .await
            .get(id)
            .map(|e| e.output.lock().text())
    }

    /// All tracked processes, oldest first
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let mut all: Vec<ProcessInfo> = self
            .processes
            .read()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect();
        all.sort_by_key(|info| info.started_at);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_until_done(registry: &ProcessRegistry, id: &str) -> ProcessInfo {
        for _ in 0..100 {
            let info = registry.get(id).await.unwrap();
            if !info.is_running() {
                return info;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("process {} did not finish", id);
    }

    #[test]
    fn bounded_output_buffer_keeps_tail_lines() {
        let mut buffer = BoundedOutputBuffer::new(3, 1024);
        for line in ["l1", "l2", "l3", "l4"] {
            buffer.push_line(line);
        }
        let text = buffer.text();
        assert!(!text.contains("l1"));
        assert!(text.contains("l4"));
        assert!(text.contains("omitted 1 earlier line"));
    }

    #[test]
    fn bounded_output_buffer_clips_bytes() {
        let mut buffer = BoundedOutputBuffer::new(100, 10);
        buffer.push_line("12345");
        buffer.push_line("67890");
        buffer.push_line("abcdef");
        assert!(buffer.text().ends_with("abcdef"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn foreground_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_foreground("echo hi; echo err >&2; exit 3", dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.timed_out);
        assert!(outcome.output.contains("hi"));
        assert!(outcome.output.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn foreground_timeout_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let outcome = run_foreground("echo started; sleep 10", dir.path(), Duration::from_millis(300))
            .await
            .unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.output.contains("started"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn background_process_completes_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let id = registry.spawn("echo background", dir.path()).await.unwrap();

        let info = wait_until_done(&registry, &id).await;
        assert!(matches!(info.status, ProcessStatus::Completed { exit_code: 0, .. }));
        assert!(registry.output(&id).await.unwrap().contains("background"));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_marks_process_killed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let id = registry.spawn("sleep 30", dir.path()).await.unwrap();

        registry.kill(&id).await.unwrap();
        let info = registry.get(&id).await.unwrap();
        assert_eq!(info.display_status(), "killed");
        assert!(registry.kill(&id).await.is_err());
        assert!(registry.kill("missing").await.is_err());
    }
}
