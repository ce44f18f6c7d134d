//! Child process supervision with bounded output and escalating cancellation.
//!
//! Each output stream is drained by its own reader thread that forwards chunks
//! over a bounded channel. The supervising thread polls the child, collects
//! chunks, and on deadline or cancellation escalates terminate → grace → kill.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Shared flag that asks a supervised child to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a pending cancel and reports whether one was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Limits applied to one supervised run.
#[derive(Debug, Clone)]
pub struct Supervision {
    pub timeout: Duration,
    pub grace_period: Duration,
    pub output_limit_bytes: usize,
    pub channel_capacity: usize,
    pub cancel: CancelToken,
}

/// How far the stop sequence had to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The child exited on its own.
    None,
    /// The child exited within the grace period after terminate.
    Terminated,
    /// The child ignored terminate and was killed.
    Killed,
}

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Exited,
    TimedOut,
    Cancelled,
}

/// Captured result of a supervised child.
#[derive(Debug)]
pub struct SupervisedOutput {
    pub status: ExitStatus,
    /// Exit code, or `128 + signal` when the child died from a signal.
    pub exit_code: i32,
    /// Combined stdout/stderr in arrival order.
    pub output: Vec<u8>,
    pub truncated: usize,
    pub ending: Ending,
    pub escalation: Escalation,
}

impl SupervisedOutput {
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn truncated_notice(&self, label: &str) -> String {
        if self.truncated > 0 {
            format!("\n[{label} output truncated {} bytes]\n", self.truncated)
        } else {
            String::new()
        }
    }
}

/// Run `cmd` under supervision and capture its combined output.
///
/// Stdin is closed. Output beyond `output_limit_bytes` is discarded while the
/// pipes keep draining.
#[instrument(skip_all, fields(timeout_secs = sup.timeout.as_secs(), grace_ms = sup.grace_period.as_millis() as u64))]
pub fn run_supervised(mut cmd: Command, sup: &Supervision) -> Result<SupervisedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = sync_channel::<Vec<u8>>(sup.channel_capacity.max(1));
    spawn_reader(stdout, tx.clone(), "stdout")?;
    spawn_reader(stderr, tx, "stderr")?;

    let mut sink = OutputSink::new(sup.output_limit_bytes, rx);
    let deadline = deadline_after(sup.timeout);

    let (status, ending, escalation) = loop {
        if let Some(status) = child.try_wait().context("poll child")? {
            break (status, Ending::Exited, Escalation::None);
        }
        let ending = if sup.cancel.is_cancelled() {
            Some(Ending::Cancelled)
        } else if Instant::now() >= deadline {
            Some(Ending::TimedOut)
        } else {
            None
        };
        if let Some(ending) = ending {
            warn!(?ending, "stopping child process");
            let (status, escalation) = escalate(&mut child, &mut sink, sup.grace_period)?;
            break (status, ending, escalation);
        }
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .min(POLL_INTERVAL);
        sink.pump(&mut child, wait)?;
    };

    sink.drain_until(deadline_after(sup.grace_period));
    if sink.truncated > 0 {
        warn!(truncated = sink.truncated, "output truncated");
    }

    let exit_code = exit_code_of(&status);
    debug!(exit_code, ?ending, ?escalation, "command finished");
    Ok(SupervisedOutput {
        status,
        exit_code,
        output: sink.collected,
        truncated: sink.truncated,
        ending,
        escalation,
    })
}

/// `now + wait`, clamped instead of overflowing for absurd durations.
fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn escalate(
    child: &mut Child,
    sink: &mut OutputSink,
    grace: Duration,
) -> Result<(ExitStatus, Escalation)> {
    if let Err(err) = send_terminate(child) {
        warn!(err = %err, "terminate failed, falling back to kill");
    }
    let grace_deadline = deadline_after(grace);
    loop {
        if let Some(status) = child.try_wait().context("poll child after terminate")? {
            debug!("child exited after terminate");
            return Ok((status, Escalation::Terminated));
        }
        let remaining = grace_deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        sink.pump(child, remaining.min(POLL_INTERVAL))?;
    }

    warn!(grace_ms = grace.as_millis() as u64, "child ignored terminate, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, Escalation::Killed))
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    let status = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("kill -TERM exited with {status}")))
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

#[cfg(unix)]
fn exit_code_of(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    tx: SyncSender<Vec<u8>>,
    label: &'static str,
) -> Result<()> {
    thread::Builder::new()
        .name(format!("child-{label}"))
        .spawn(move || forward_chunks(reader, &tx, label))
        .with_context(|| format!("spawn {label} reader"))?;
    Ok(())
}

/// Forward line-sized chunks until EOF or until the receiver goes away.
fn forward_chunks<R: Read>(reader: R, tx: &SyncSender<Vec<u8>>, label: &str) {
    let mut reader = BufReader::new(reader);
    loop {
        let mut chunk = Vec::new();
        match reader.read_until(b'\n', &mut chunk) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(chunk).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(stream = label, err = %err, "read child output");
                break;
            }
        }
    }
}

/// Receiving side of the reader channel with a size cap.
struct OutputSink {
    rx: Receiver<Vec<u8>>,
    limit: usize,
    collected: Vec<u8>,
    truncated: usize,
    closed: bool,
}

impl OutputSink {
    fn new(limit: usize, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            limit,
            collected: Vec::new(),
            truncated: 0,
            closed: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let remaining = self.limit.saturating_sub(self.collected.len());
        let keep = chunk.len().min(remaining);
        self.collected.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }

    /// Collect output for up to `wait`, or sleep on the child once streams closed.
    fn pump(&mut self, child: &mut Child, wait: Duration) -> Result<()> {
        if self.closed {
            child.wait_timeout(wait).context("wait for command")?;
            return Ok(());
        }
        match self.rx.recv_timeout(wait) {
            Ok(chunk) => {
                self.push(&chunk);
                while let Ok(chunk) = self.rx.try_recv() {
                    self.push(&chunk);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.closed = true,
        }
        Ok(())
    }

    /// Collect what remains after exit, bounded by `until`.
    ///
    /// A grandchild that inherited the pipes can keep them open; the bound
    /// keeps that from stalling the caller.
    fn drain_until(&mut self, until: Instant) {
        while !self.closed {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("output streams still open after exit, giving up drain");
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.push(&chunk),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.closed = true,
            }
        }
    }
}
