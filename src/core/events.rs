// ─── Launcher Events ───
// Everything the background work reports back to the foreground caller.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::downloader::DownloadEvent;
use crate::core::status::StatusReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Terminal outcome of one launched process. Exactly one is reported per launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Killed by a signal or otherwise terminated abnormally.
    CrashExit,
    NormalExit { code: i32 },
    /// Never reached `Running`.
    FailedToStart { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started { pid: u32 },
    Output { stream: OutputStream, line: String },
    Status { report: StatusReport },
    Finished { outcome: ProcessOutcome },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LauncherEvent {
    Process {
        instance_id: String,
        event: ProcessEvent,
    },
    Download {
        task_id: String,
        event: DownloadEvent,
    },
}

pub type EventSender = mpsc::UnboundedSender<LauncherEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<LauncherEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Sender bound to a single launched instance.
#[derive(Clone)]
pub struct ProcessEvents {
    instance_id: String,
    sender: EventSender,
}

impl ProcessEvents {
    pub fn new(instance_id: impl Into<String>, sender: EventSender) -> Self {
        Self {
            instance_id: instance_id.into(),
            sender,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    // A closed receiver only means nobody is listening any more.
    pub fn emit(&self, event: ProcessEvent) {
        let _ = self.sender.send(LauncherEvent::Process {
            instance_id: self.instance_id.clone(),
            event,
        });
    }
}
