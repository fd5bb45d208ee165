//! Running external commands: build steps, test commands and the few host
//! tools keg shells out to (`git`, `tar`, `sw_vers`).

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result};

/// Builder for one child process.
///
/// Environment changes are applied to the child only; the parent process
/// environment is never touched.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<OsString>,
    /// `None` removes the variable from the child's environment
    env: BTreeMap<String, Option<String>>,
    cwd: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
}

impl ProcessBuilder {
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), Some(value.clone()));
        }
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env.insert(key.into(), None);
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Feed `data` to the child's stdin.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            match value {
                Some(value) => cmd.env(key, value),
                None => cmd.env_remove(key),
            };
        }
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Run to completion with stdout and stderr captured.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.command();
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        if let (Some(data), Some(mut pipe)) = (&self.stdin, child.stdin.take()) {
            pipe.write_all(data)
                .with_context(|| format!("failed to write stdin of `{}`", self.program.display()))?;
        }

        child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))
    }

    /// Run with stdio inherited, for verbose builds.
    pub fn status(&self) -> Result<ExitStatus> {
        self.command()
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// The command line as it would be typed into a shell.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| shell_quote(&a.to_string_lossy())));
        parts.join(" ")
    }
}

fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        "''".to_string()
    } else if arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}

/// Stdout followed by stderr, for error reports.
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Look `name` up in the keg process's own PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Look `name` up in a PATH-formatted `search_path`, resolving relative
/// entries against `cwd`.
pub fn find_executable_in(name: &str, search_path: &str, cwd: &Path) -> Option<PathBuf> {
    which::which_in(name, Some(search_path), cwd).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("./configure").args(["--prefix=/opt/x", "--without-npm"]);
        assert_eq!(pb.display_command(), "./configure --prefix=/opt/x --without-npm");
    }

    #[test]
    fn test_display_command_quotes() {
        let pb = ProcessBuilder::new("sh").args(["-c", "echo 'hi'", ""]);
        assert_eq!(pb.display_command(), r"sh -c 'echo '\''hi'\''' ''");
    }

    #[cfg(unix)]
    #[test]
    fn test_env_is_scoped_to_child() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "printf %s \"$KEG_PROCESS_TEST\""])
            .env("KEG_PROCESS_TEST", "scoped")
            .exec()
            .unwrap();

        assert_eq!(String::from_utf8_lossy(&output.stdout), "scoped");
        assert!(std::env::var("KEG_PROCESS_TEST").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_env_remove_hides_variable() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "printf %s \"${HOME-unset}\""])
            .env_remove("HOME")
            .exec()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "unset");
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_and_combined_output() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "cat; echo oops >&2"])
            .stdin("piped\n")
            .exec()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(combined_output(&output), "piped\noops\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_cwd() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = ProcessBuilder::new("pwd").cwd(tmp.path()).exec().unwrap();
        let printed = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        assert_eq!(printed.canonicalize().unwrap(), tmp.path().canonicalize().unwrap());
    }
}
