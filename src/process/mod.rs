use crate::error::{BenchError, Result};
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Where the standard output of a command goes.
#[derive(Debug, Clone, Copy)]
pub enum Output<'a> {
    /// Same stream as the harness
    Inherit,
    /// Discarded
    Null,
    /// Written to a file, truncated first
    File(&'a Path),
}

/// Runs external commands given as shell-style strings.
pub trait CommandRunner {
    /// Runs `command` to completion and returns its exit code.
    ///
    /// With `fail_fast` a non-zero exit becomes `BenchError::CommandFailed`,
    /// otherwise the code is returned to the caller.
    fn run(
        &mut self,
        command: &str,
        env: &[(String, String)],
        output: Output<'_>,
        fail_fast: bool,
    ) -> Result<i32>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(
        &mut self,
        command: &str,
        env: &[(String, String)],
        output: Output<'_>,
        fail_fast: bool,
    ) -> Result<i32> {
        (**self).run(command, env, output, fail_fast)
    }
}

/// Splits a command string the way a POSIX shell would, honouring quotes.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    match shlex::split(command) {
        Some(args) if !args.is_empty() => Ok(args),
        Some(_) => Err(BenchError::CommandParse("empty command".to_string())),
        None => Err(BenchError::CommandParse(command.to_string())),
    }
}

/// Quotes a path for use inside a command string.
pub fn quote_path(path: &Path) -> Result<String> {
    let raw = path.to_string_lossy();
    shlex::try_quote(&raw)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| BenchError::CommandParse(raw.to_string()))
}

/// Runs commands as real child processes and blocks until they exit.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &mut self,
        command: &str,
        env: &[(String, String)],
        output: Output<'_>,
        fail_fast: bool,
    ) -> Result<i32> {
        let args = split_command(command)?;
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| BenchError::CommandParse(command.to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(rest);
        cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        match output {
            Output::Inherit => {}
            Output::Null => {
                cmd.stdout(Stdio::null());
            }
            Output::File(path) => {
                let file = File::create(path).map_err(|e| BenchError::io(path, e))?;
                cmd.stdout(file);
            }
        }

        debug!(command, "running");
        let status = cmd.status().map_err(|source| BenchError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Killed by a signal
        let code = status.code().unwrap_or(-1);
        if code != 0 && fail_fast {
            return Err(BenchError::CommandFailed {
                code,
                command: command.to_string(),
            });
        }
        Ok(code)
    }
}
