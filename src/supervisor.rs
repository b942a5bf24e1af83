//! Child server process lifecycle: spawn, stream watching, exit tracking and
//! deliberate shutdown.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::LaunchConfig;
use crate::diagnostics::EventLog;
use crate::error::LaunchError;
use crate::readiness::{ReadySignal, ReadySource};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Everything needed to spawn the child server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPlan {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl SpawnPlan {
    /// `Rscript [flags] <launcher script> <app dir> <port>`, run from the app dir.
    pub fn shiny(interpreter: &Path, config: &LaunchConfig, port: u16) -> Self {
        let mut args: Vec<OsString> = config.interpreter_flags.iter().map(OsString::from).collect();
        args.push(config.launcher_script.clone().into_os_string());
        args.push(config.app_dir.clone().into_os_string());
        args.push(OsString::from(port.to_string()));
        Self {
            program: interpreter.to_path_buf(),
            args,
            cwd: config.app_dir.clone(),
        }
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so shutdown can signal anything R spawned.
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NO_WINDOW);
        command
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub pid: u32,
    pub code: Option<i32>,
    /// The exit followed a `stop()` call.
    pub deliberate: bool,
}

#[derive(Debug)]
struct ChildHandle {
    pid: u32,
    started_at: Instant,
}

struct Inner {
    child: Mutex<Option<ChildHandle>>,
    last_exit: Mutex<Option<ChildExit>>,
    shutting_down: AtomicBool,
    exits: mpsc::UnboundedSender<ChildExit>,
    events: Arc<EventLog>,
}

/// Owns the single child server process of a session.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Supervisor {
    /// The receiver yields crashes that happen after readiness was settled.
    pub fn new(events: Arc<EventLog>) -> (Self, mpsc::UnboundedReceiver<ChildExit>) {
        let (exits, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            child: Mutex::new(None),
            last_exit: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            exits,
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.inner.child).as_ref().map(|handle| handle.pid)
    }

    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub fn last_exit(&self) -> Option<ChildExit> {
        *lock(&self.inner.last_exit)
    }

    /// Spawns the child and wires its streams and exit into `ready`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        plan: &SpawnPlan,
        markers: &[String],
        ready: ReadySignal,
    ) -> Result<u32, LaunchError> {
        let mut slot = lock(&self.inner.child);
        if slot.is_some() {
            return Err(LaunchError::AlreadyLaunched);
        }
        self.inner.shutting_down.store(false, Ordering::SeqCst);

        let program = plan.program_name();
        let mut child = plan
            .command()
            .spawn()
            .map_err(|err| LaunchError::spawn(&program, err))?;
        let pid = child.id().ok_or_else(|| LaunchError::SpawnFailure {
            program: program.clone(),
            source: io::Error::other("child exited before reporting a pid"),
        })?;
        log::info!("R process started (PID {pid}): {program}");
        self.inner
            .events
            .info("supervisor", format!("R process started (PID {pid})"));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_stream(stdout, "stdout", Vec::new(), None));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stream(
                stderr,
                "stderr",
                markers.to_vec(),
                Some(ready.clone()),
            ));
        }

        *slot = Some(ChildHandle {
            pid,
            started_at: Instant::now(),
        });
        drop(slot);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(err) => {
                    log::warn!("Failed to wait on R process (PID {pid}): {err}");
                    None
                }
            };
            inner.record_exit(pid, code, &ready);
        });

        Ok(pid)
    }

    /// Deliberately terminates the child. Returns `false` when there was
    /// nothing to stop.
    pub fn stop(&self) -> bool {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let Some(handle) = lock(&self.inner.child).take() else {
            return false;
        };
        log::info!(
            "Stopping R process (PID {}, up {:?})",
            handle.pid,
            handle.started_at.elapsed()
        );
        self.inner
            .events
            .info("supervisor", format!("Stop requested for PID {}", handle.pid));
        terminate_process_tree(handle.pid);
        true
    }
}

impl Inner {
    fn record_exit(&self, pid: u32, code: Option<i32>, ready: &ReadySignal) {
        let deliberate = self.shutting_down.load(Ordering::SeqCst);
        {
            let mut slot = lock(&self.child);
            if slot.as_ref().map(|handle| handle.pid) == Some(pid) {
                *slot = None;
            }
        }
        let exit = ChildExit {
            pid,
            code,
            deliberate,
        };
        *lock(&self.last_exit) = Some(exit);

        if deliberate {
            log::info!("R process exited with code {code:?}");
            self.events
                .info("supervisor", format!("R process exited with code {code:?}"));
            return;
        }

        log::error!("R process exited unexpectedly with code {code:?}");
        self.events
            .error("supervisor", format!("R process exited unexpectedly with code {code:?}"));
        if ready.settle(Err(LaunchError::UnexpectedChildExit { code })) {
            return;
        }
        let _ = self.exits.send(exit);
    }
}

async fn forward_stream<R>(
    stream: R,
    name: &'static str,
    markers: Vec<String>,
    ready: Option<ReadySignal>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                log::info!("[shiny {name}] {line}");
                let Some(signal) = ready.as_ref() else {
                    continue;
                };
                if !signal.is_settled()
                    && markers.iter().any(|marker| line.contains(marker.as_str()))
                    && signal.settle(Ok(ReadySource::StreamMarker))
                {
                    log::info!("Shiny server reported listening on {name}");
                }
            }
            Err(err) => {
                log::warn!("Stopped reading R {name}: {err}");
                break;
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn terminate_process_tree(pid: u32) {
    use std::os::windows::process::CommandExt;

    match std::process::Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/T", "/F"])
        .creation_flags(CREATE_NO_WINDOW)
        .output()
    {
        Ok(output) if output.status.success() => {}
        Ok(output) => log::warn!(
            "taskkill failed for PID {pid}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(err) => log::warn!("Failed to run taskkill for PID {pid}: {err}"),
    }
}

#[cfg(unix)]
fn terminate_process_tree(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // Negative pid: the whole process group led by the child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGTERM) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            log::debug!("R process group {pid} already gone");
        } else {
            log::warn!("Failed to signal R process group {pid}: {err}");
        }
    }
}
