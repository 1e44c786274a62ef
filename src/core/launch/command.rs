// ─── Launch Command ───
// Resolves how an instance's executable is invoked.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::core::instance::Instance;

/// Interpreter used when the instance path is a script rather than a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Python,
    Shell,
    #[cfg(target_os = "windows")]
    Cmd,
}

impl Interpreter {
    /// Decided once, from the extension only.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" | "pyw" => Some(Interpreter::Python),
            "sh" => Some(Interpreter::Shell),
            #[cfg(target_os = "windows")]
            "bat" | "cmd" => Some(Interpreter::Cmd),
            _ => None,
        }
    }

    pub fn program(self) -> &'static str {
        match self {
            Interpreter::Python if cfg!(target_os = "windows") => "python",
            Interpreter::Python => "python3",
            Interpreter::Shell => "sh",
            #[cfg(target_os = "windows")]
            Interpreter::Cmd => "cmd",
        }
    }

    fn leading_args(self) -> &'static [&'static str] {
        match self {
            #[cfg(target_os = "windows")]
            Interpreter::Cmd => &["/C"],
            _ => &[],
        }
    }
}

/// Fully resolved invocation:
/// `<executable_or_interpreter> [<script_path>] [game args] --data-dir <data_dir>`.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub target: PathBuf,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    pub data_dir: PathBuf,
    pub interpreter: Option<Interpreter>,
}

impl LaunchCommand {
    pub fn resolve(instance: &Instance) -> Self {
        // The child runs from its own directory, so relative paths must be
        // pinned down first.
        let mut resolved = instance.clone();
        resolved.path = safe_path(&instance.path);

        let target = resolved.path.clone();
        let working_dir = resolved.working_dir();
        let data_dir = resolved.data_dir();
        let interpreter = Interpreter::for_path(&target);

        let mut args: Vec<OsString> = Vec::new();
        let program = match interpreter {
            Some(interpreter) => {
                args.extend(interpreter.leading_args().iter().map(OsString::from));
                args.push(target.clone().into_os_string());
                PathBuf::from(interpreter.program())
            }
            None => target.clone(),
        };
        args.extend(instance.game_args.iter().map(OsString::from));
        args.push("--data-dir".into());
        args.push(data_dir.clone().into_os_string());

        Self {
            target,
            program,
            args,
            working_dir,
            data_dir,
            interpreter,
        }
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.working_dir);
        cmd
    }

    /// Copy/paste friendly rendering for debug logs.
    pub fn display(&self) -> String {
        let program = shell_escape(&self.program.to_string_lossy());
        let args = self
            .args
            .iter()
            .map(|arg| shell_escape(&arg.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ");

        if args.is_empty() {
            program
        } else {
            format!("{} {}", program, args)
        }
    }
}

/// Canonicalize when possible, keep the path untouched otherwise.
pub fn safe_path(path: &Path) -> PathBuf {
    match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(_) => path.to_path_buf(),
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &LaunchCommand) -> Vec<String> {
        cmd.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn binary_is_executed_directly_with_data_dir() {
        let instance = Instance::new("alpha", "/opt/krompir/skakavi-krompir-alpha");
        let cmd = LaunchCommand::resolve(&instance);

        assert_eq!(cmd.interpreter, None);
        assert_eq!(cmd.program, PathBuf::from("/opt/krompir/skakavi-krompir-alpha"));
        assert_eq!(cmd.working_dir, PathBuf::from("/opt/krompir"));
        assert_eq!(args_of(&cmd), vec!["--data-dir", "/opt/krompir/data"]);
    }

    #[test]
    fn python_script_goes_through_interpreter() {
        let mut instance = Instance::new("dev", "/opt/krompir/main.py");
        instance.game_args = vec!["--windowed".into()];
        let cmd = LaunchCommand::resolve(&instance);

        assert_eq!(cmd.interpreter, Some(Interpreter::Python));
        assert_eq!(cmd.program, PathBuf::from(Interpreter::Python.program()));
        assert_eq!(
            args_of(&cmd),
            vec![
                "/opt/krompir/main.py",
                "--windowed",
                "--data-dir",
                "/opt/krompir/data"
            ]
        );
    }

    #[test]
    fn interpreter_choice_is_by_extension_only() {
        assert_eq!(
            Interpreter::for_path(Path::new("run.SH")),
            Some(Interpreter::Shell)
        );
        assert_eq!(Interpreter::for_path(Path::new("game.pyw")), Some(Interpreter::Python));
        assert_eq!(Interpreter::for_path(Path::new("python")), None);
        assert_eq!(Interpreter::for_path(Path::new("krompir.x86_64")), None);
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let instance = Instance::new("spaced", "/opt/My Games/krompir");
        let cmd = LaunchCommand::resolve(&instance);
        assert_eq!(
            cmd.display(),
            "\"/opt/My Games/krompir\" --data-dir \"/opt/My Games/data\""
        );
    }
}
