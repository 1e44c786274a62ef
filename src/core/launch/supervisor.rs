// ─── Process Supervisor ───
// Owns the single game process slot: spawn, output forwarding, status
// polling, exit classification and group kill.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::command::LaunchCommand;
use super::platform::{configure_process_group, GroupKiller, OsGroupKiller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSender, OutputStream, ProcessEvent, ProcessEvents, ProcessOutcome};
use crate::core::instance::Instance;
use crate::core::status::{PollerConfig, StatusPoller};

/// `Idle -> Starting -> Running -> {Exited, Crashed} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    /// Only exists inside `launch`, which holds the supervisor exclusively;
    /// callers observe `Running` or a failed launch.
    Starting,
    Running,
    Exited(i32),
    Crashed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Crashed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub poller: PollerConfig,
    /// How long `kill` waits for the process to report termination.
    pub kill_timeout: Duration,
    /// How long the monitor waits for output readers after exit. Orphaned
    /// descendants can keep the pipes open indefinitely.
    pub drain_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            kill_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchAck {
    pub pid: u32,
    pub data_dir: PathBuf,
}

/// The one supervised child of this launcher session.
struct ProcessHandle {
    instance_id: String,
    pid: u32,
    working_dir: PathBuf,
    data_dir: PathBuf,
    state: watch::Receiver<ProcessState>,
    /// Asks the monitor to kill the direct child only.
    kill_child: Option<oneshot::Sender<()>>,
}

pub struct ProcessSupervisor {
    events: EventSender,
    config: SupervisorConfig,
    group_killer: Arc<dyn GroupKiller>,
    current: Option<ProcessHandle>,
}

impl ProcessSupervisor {
    pub fn new(events: EventSender, config: SupervisorConfig) -> Self {
        Self {
            events,
            config,
            group_killer: Arc::new(OsGroupKiller),
            current: None,
        }
    }

    pub fn with_group_killer(mut self, group_killer: Arc<dyn GroupKiller>) -> Self {
        self.group_killer = group_killer;
        self
    }

    pub fn state(&mut self) -> ProcessState {
        self.reap();
        match &self.current {
            Some(handle) => *handle.state.borrow(),
            None => ProcessState::Idle,
        }
    }

    pub fn is_running(&mut self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Pid, working directory and data directory of the running process.
    pub fn current(&mut self) -> Option<(u32, PathBuf, PathBuf)> {
        self.reap();
        self.current
            .as_ref()
            .map(|h| (h.pid, h.working_dir.clone(), h.data_dir.clone()))
    }

    /// Discard the handle once its terminal outcome has been reported.
    fn reap(&mut self) {
        let finished = self
            .current
            .as_ref()
            .is_some_and(|h| h.state.borrow().is_terminal());
        if finished {
            if let Some(handle) = self.current.take() {
                debug!("Released process slot of instance {}", handle.instance_id);
            }
        }
    }

    /// Spawn the instance. Returns once the process is running; exit is
    /// reported later as `ProcessEvent::Finished`.
    pub async fn launch(&mut self, instance: &Instance) -> LauncherResult<LaunchAck> {
        self.reap();
        if let Some(running) = &self.current {
            warn!(
                "Launch of {} rejected: instance {} (pid {}) is still running",
                instance.id, running.instance_id, running.pid
            );
            return Err(LauncherError::AlreadyRunning);
        }

        let events = ProcessEvents::new(instance.id.clone(), self.events.clone());
        let command = LaunchCommand::resolve(instance);
        debug!("Instance {} -> {:?}", instance.id, ProcessState::Starting);

        if !command.target.is_file() {
            return Err(failed_to_start(
                &events,
                &command,
                "executable not found".into(),
            ));
        }

        for dir in [&command.working_dir, &command.data_dir] {
            if let Err(source) = tokio::fs::create_dir_all(dir).await {
                return Err(failed_to_start(
                    &events,
                    &command,
                    format!("cannot create {:?}: {}", dir, source),
                ));
            }
        }

        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_process_group(&mut cmd);

        info!("Launching instance '{}' ({})", instance.name, instance.id);
        debug!("Command (copy/paste): {}", command.display());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return Err(failed_to_start(&events, &command, e.to_string())),
        };
        let Some(pid) = child.id() else {
            return Err(failed_to_start(
                &events,
                &command,
                "process exited before it could be tracked".into(),
            ));
        };

        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        events.emit(ProcessEvent::Started { pid });
        info!("Instance {} running (pid {})", instance.id, pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_output(stdout, OutputStream::Stdout, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_output(stderr, OutputStream::Stderr, events.clone()));
        }

        let poller_events = events.clone();
        let poller = StatusPoller::spawn(command.data_dir.clone(), self.config.poller, move |report| {
            poller_events.emit(ProcessEvent::Status { report });
        });

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(monitor(
            child,
            kill_rx,
            readers,
            poller,
            state_tx,
            events,
            self.config.drain_timeout,
        ));

        self.current = Some(ProcessHandle {
            instance_id: instance.id.clone(),
            pid,
            working_dir: command.working_dir,
            data_dir: command.data_dir.clone(),
            state: state_rx,
            kill_child: Some(kill_tx),
        });

        Ok(LaunchAck {
            pid,
            data_dir: command.data_dir,
        })
    }

    /// Kill the running process and its whole process group.
    ///
    /// Waits at most `kill_timeout` for the exit to be observed and returns
    /// regardless.
    pub async fn kill(&mut self) -> LauncherResult<()> {
        self.reap();
        let Some(handle) = self.current.as_mut() else {
            return Err(LauncherError::NotRunning);
        };
        let pid = handle.pid;

        match self.group_killer.kill_group(pid) {
            Ok(()) => info!("Sent SIGKILL to process group of pid {}", pid),
            Err(e) => {
                warn!(
                    "Process group kill for pid {} failed ({}), killing the process only",
                    pid, e
                );
                if let Some(kill_child) = handle.kill_child.take() {
                    let _ = kill_child.send(());
                }
            }
        }

        let mut state = handle.state.clone();
        let terminated =
            tokio::time::timeout(self.config.kill_timeout, state.wait_for(|s| s.is_terminal()))
                .await
                .is_ok();

        if terminated {
            info!("Pid {} terminated", pid);
            self.reap();
        } else {
            warn!(
                "Pid {} did not report termination within {:?}",
                pid, self.config.kill_timeout
            );
        }
        Ok(())
    }
}

fn failed_to_start(events: &ProcessEvents, command: &LaunchCommand, reason: String) -> LauncherError {
    error!(
        "Instance {} failed to start ({:?}): {}",
        events.instance_id(),
        command.target,
        reason
    );
    events.emit(ProcessEvent::Finished {
        outcome: ProcessOutcome::FailedToStart {
            reason: reason.clone(),
        },
    });
    LauncherError::FailedToStart {
        path: command.target.clone(),
        reason,
    }
}

/// Forward one output stream line by line. Reading never waits on the
/// consumer, so the child is never blocked on a full pipe.
fn forward_output<R>(reader: R, stream: OutputStream, events: ProcessEvents) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(&['\r', '\n'][..])
                        .to_string();
                    match stream {
                        OutputStream::Stdout => {
                            info!("[game:{}][stdout] {}", events.instance_id(), line)
                        }
                        OutputStream::Stderr => {
                            warn!("[game:{}][stderr] {}", events.instance_id(), line)
                        }
                    }
                    events.emit(ProcessEvent::Output { stream, line });
                }
                Err(e) => {
                    warn!("[game:{}] {:?} read failed: {}", events.instance_id(), stream, e);
                    break;
                }
            }
        }
    })
}

async fn monitor(
    mut child: Child,
    mut kill_child: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    poller: StatusPoller,
    state: watch::Sender<ProcessState>,
    events: ProcessEvents,
    drain_timeout: Duration,
) {
    let wait_result = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_child => {
            if let Err(e) = child.start_kill() {
                warn!("Direct kill of instance {} failed: {}", events.instance_id(), e);
            }
            child.wait().await
        }
    };

    poller.stop().await;

    for mut reader in readers {
        if tokio::time::timeout(drain_timeout, &mut reader).await.is_err() {
            debug!("Output of {} still open after exit, detaching", events.instance_id());
            reader.abort();
        }
    }

    let outcome = match wait_result {
        Ok(status) => classify_exit(status),
        Err(e) => {
            error!("Waiting on instance {} failed: {}", events.instance_id(), e);
            ProcessOutcome::CrashExit
        }
    };
    match &outcome {
        ProcessOutcome::NormalExit { code: 0 } => {
            info!("Instance {} exited normally", events.instance_id())
        }
        other => warn!("Instance {} finished: {:?}", events.instance_id(), other),
    }

    state.send_replace(match outcome {
        ProcessOutcome::NormalExit { code } => ProcessState::Exited(code),
        _ => ProcessState::Crashed,
    });
    events.emit(ProcessEvent::Finished { outcome });
}

/// A process without an exit code was terminated by a signal.
fn classify_exit(status: ExitStatus) -> ProcessOutcome {
    match status.code() {
        Some(code) => ProcessOutcome::NormalExit { code },
        None => ProcessOutcome::CrashExit,
    }
}
