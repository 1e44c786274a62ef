// ─── Process Groups ───
// Spawn the game as the leader of its own group so that a single kill takes
// down everything it started.

use tokio::process::Command;

pub fn configure_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                // New session: the child becomes leader of a fresh process group.
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(target_os = "windows")]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// Forceful termination of a whole process group.
///
/// Errors mean the group could not be resolved or signalled; the supervisor
/// then falls back to killing the direct child only.
pub trait GroupKiller: Send + Sync {
    fn kill_group(&self, pid: u32) -> std::io::Result<()>;
}

/// `killpg(pid, SIGKILL)` on unix, `taskkill /T /F` on Windows.
///
/// The child called `setsid` at spawn, so its pid is its group id. The group
/// id stays reserved while any member lives, even after the leader is reaped.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsGroupKiller;

impl GroupKiller for OsGroupKiller {
    fn kill_group(&self, pid: u32) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            let pgid = libc::pid_t::try_from(pid)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

            // Never signal the launcher's own group.
            if pgid == unsafe { libc::getpgrp() } {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("process {pid} leads the launcher's process group"),
                ));
            }
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
                return Err(std::io::Error::last_os_error());
            }
            return Ok(());
        }

        #[cfg(target_os = "windows")]
        {
            let status = std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .status()?;

            if !status.success() {
                return Err(std::io::Error::other(format!(
                    "taskkill for {pid} returned {:?}",
                    status.code()
                )));
            }
            return Ok(());
        }

        #[cfg(not(any(unix, target_os = "windows")))]
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("process groups unsupported for {pid}"),
            ));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn missing_process_has_no_group() {
        // pid_t max is never a live process in practice.
        let err = OsGroupKiller.kill_group(i32::MAX as u32).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    }

    #[test]
    fn refuses_to_kill_own_group() {
        let own = unsafe { libc::getpgrp() } as u32;
        let err = OsGroupKiller.kill_group(own).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn signals_the_group_named_by_pid_only() {
        use std::os::unix::process::CommandExt;

        let mut leader = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let mut member = std::process::Command::new("sleep")
            .arg("30")
            .process_group(leader.id() as i32)
            .spawn()
            .unwrap();

        // A member pid names no group; nothing is signalled.
        let err = OsGroupKiller.kill_group(member.id()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
        assert!(member.try_wait().unwrap().is_none());

        OsGroupKiller.kill_group(leader.id()).unwrap();
        assert!(leader.wait().unwrap().code().is_none());
        assert!(member.wait().unwrap().code().is_none());
    }
}
