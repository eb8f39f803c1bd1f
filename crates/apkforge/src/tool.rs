use std::ffi::OsStr;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const MAX_LOG_CHARS: usize = 4096;
const DRAIN_POLL: Duration = Duration::from_millis(200);

/// Failure modes shared by every external tool invocation. Callers map these
/// onto their stage's error variant.
#[derive(Debug)]
pub enum ToolError {
    Spawn(String),
    Wait(String),
    Timeout(u64),
    Exit(ExitStatus),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Spawn(msg) => write!(f, "spawn failed: {msg}"),
            ToolError::Wait(msg) => write!(f, "wait failed: {msg}"),
            ToolError::Timeout(secs) => write!(f, "timed out after {secs}s"),
            ToolError::Exit(status) => write!(f, "command failed: {status}"),
        }
    }
}

/// One configured external tool (argv prefix plus deadline), invoked the same
/// way by the extractor, rebuilder, and signer.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    argv: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalTool {
    /// `timeout_secs == 0` disables the deadline.
    pub fn new(argv: &[String], timeout_secs: u64) -> Result<Self, String> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err("tool argv is empty".into());
        }
        Ok(Self {
            argv: argv.to_vec(),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Run the tool to completion. Both output streams are drained on
    /// dedicated threads so the child can never stall on a full pipe while we
    /// block on its exit status; lines are forwarded to the log, not parsed.
    /// The exit status is the sole success signal.
    pub fn run(&self, args: &[&OsStr]) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.argv[0]);
        if self.argv.len() > 1 {
            cmd.args(&self.argv[1..]);
        }
        cmd.args(args);

        // On unix: the child gets its own process group so a timeout can kill
        // the whole subtree, not just the direct child.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setpgid(0, 0) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Spawn(format!("{}: {e}", self.argv[0])))?;
        let pgid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = stdout {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(out, tx));
        }
        if let Some(err) = stderr {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(err, tx));
        }
        drop(tx);

        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            match rx.recv_timeout(DRAIN_POLL) {
                Ok(line) => {
                    let line = sanitize_line(&line);
                    if !line.is_empty() {
                        tracing::debug!(target: "apkforge::tool", tool = %self.argv[0], "{line}");
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                kill_pgroup(pgid, false);
                kill_pgroup(pgid, true);
                let _ = child.wait();
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                return Err(ToolError::Timeout(secs));
            }
        }

        // Streams are closed; the child may still be running (or may have
        // re-parented a grandchild that inherited the pipes).
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(deadline) = deadline
                        && Instant::now() >= deadline
                    {
                        kill_pgroup(pgid, false);
                        kill_pgroup(pgid, true);
                        let _ = child.wait();
                        let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                        return Err(ToolError::Timeout(secs));
                    }
                    std::thread::sleep(DRAIN_POLL);
                }
                Err(e) => return Err(ToolError::Wait(e.to_string())),
            }
        };
        if !status.success() {
            return Err(ToolError::Exit(status));
        }
        Ok(())
    }
}

fn read_output_stream<R: Read>(stream: R, tx: mpsc::Sender<String>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        match line {
            Ok(l) => {
                if tx.send(l).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn kill_pgroup(pgid: u32, force: bool) {
    #[cfg(unix)]
    {
        let sig = if force { libc::SIGKILL } else { libc::SIGTERM };
        // Negative PID targets the whole process group.
        let _ = unsafe { libc::kill(-(pgid as i32), sig) };
    }
    #[cfg(not(unix))]
    {
        let _ = (pgid, force);
    }
}

/// Strip escape sequences and control characters from tool output before it
/// reaches the log. External tools print to terminals; we print their lines.
fn sanitize_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LOG_CHARS));
    let mut in_escape = false;
    let mut char_count = 0usize;
    for c in input.chars() {
        if in_escape {
            // CSI/SGR sequences end on a letter; anything else we skip too.
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
            continue;
        }
        match c {
            '\x1b' => in_escape = true,
            '\r' | '\n' => {}
            '\t' => {
                out.push(' ');
                char_count += 1;
            }
            c if c.is_control() => {}
            c => {
                out.push(c);
                char_count += 1;
            }
        }
        if char_count >= MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }
    out
}
