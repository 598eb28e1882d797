// gpkg-io/src/process.rs
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use gpkg_common::error::{GpkgError, Result};
use tracing::{debug, error};

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl CommandOutput {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Runs a command to completion, optionally streaming `stdin` into it, and
/// captures its output. A non-zero exit is returned, not treated as an error.
///
/// Output is drained on reader threads while `stdin` is fed from the calling
/// thread, so a chatty child cannot stall on a full pipe.
pub fn run_command(mut cmd: Command, stdin: Option<&mut dyn Read>) -> Result<CommandOutput> {
    debug!("Running command: {:?}", cmd);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to execute command {:?}: {}", cmd, e);
        GpkgError::from(e)
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    if let Some(input) = stdin {
        if let Err(e) = feed(&mut child, input) {
            if let Err(kill) = child.kill() {
                debug!("Could not kill command after stdin failure: {}", kill);
            }
            child.wait()?;
            return Err(e);
        }
    }

    let status = child.wait()?;
    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&collect(stdout_reader)?).to_string(),
        stderr: String::from_utf8_lossy(&collect(stderr_reader)?).to_string(),
        status,
    };
    if !result.status.success() {
        debug!("Command failed with status: {}", result.status);
        if !result.stderr.trim().is_empty() {
            debug!("Stderr:\n{}", result.stderr.trim());
        }
    }
    Ok(result)
}

/// Copies `input` into the child's stdin and closes it.
fn feed(child: &mut Child, input: &mut dyn Read) -> Result<()> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| GpkgError::Generic("child stdin was not captured".to_string()))?;
    match io::copy(input, &mut pipe) {
        Ok(n) => debug!("Streamed {} bytes to command stdin", n),
        // the child closed its end early, its exit status tells the story
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Command closed stdin early");
        }
        Err(e) => return Err(GpkgError::from(e)),
    }
    pipe.flush().ok();
    Ok(())
}

fn drain(pipe: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let bytes = reader
        .join()
        .map_err(|_| GpkgError::Generic("command output reader panicked".to_string()))??;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn captures_stdout_and_status() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'hello'; exit 7");
        let output = run_command(cmd, None).unwrap();
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.code(), Some(7));
    }

    #[test]
    fn streams_stdin() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("wc -c");
        let mut input = Cursor::new(vec![b'x'; 4096]);
        let output = run_command(cmd, Some(&mut input)).unwrap();
        assert_eq!(output.stdout.trim(), "4096");
    }

    #[test]
    fn stderr_is_drained_while_stdin_streams() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("head -c 200000 /dev/zero >&2; wc -c");
        let mut input = Cursor::new(vec![b'x'; 200_000]);
        let output = run_command(cmd, Some(&mut input)).unwrap();
        assert_eq!(output.stdout.trim(), "200000");
        assert_eq!(output.stderr.len(), 200_000);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("source went away"))
        }
    }

    #[test]
    fn stdin_failure_is_an_error() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("cat >/dev/null");
        let err = run_command(cmd, Some(&mut FailingReader)).unwrap_err();
        assert!(err.to_string().contains("source went away"), "{err}");
    }
}
