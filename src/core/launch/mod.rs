pub mod command;
pub mod platform;
pub mod supervisor;

pub use command::{Interpreter, LaunchCommand};
pub use platform::{GroupKiller, OsGroupKiller};
pub use supervisor::{LaunchAck, ProcessState, ProcessSupervisor, SupervisorConfig};
