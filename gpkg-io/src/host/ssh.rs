// gpkg-io/src/host/ssh.rs
//! Remote hosts reached through the system `ssh` client.
//!
//! Each operation is a short POSIX shell script run in batch mode. Paths are
//! single-quoted; file contents travel over stdin and stdout.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{DirEntryInfo, FileStat, HostTarget};
use tracing::debug;

use crate::process::{run_command, CommandOutput};

/// Exit status the scripts below use for "no such file".
const MISSING: i32 = 3;
const CONNECT_TIMEOUT_SECS: u16 = 10;

#[derive(Debug, Clone)]
pub struct SshHost {
    name: String,
    hostname: String,
    username: Option<String>,
    port: u16,
    root: PathBuf,
}

impl SshHost {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        username: Option<String>,
        port: u16,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            username,
            port,
            root: root.into(),
        }
    }

    pub fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }

    fn ssh_command(&self, script: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p").arg(self.port.to_string());
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"));
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("--").arg(self.destination());
        cmd.arg("sh").arg("-c").arg(sh_quote(script));
        cmd
    }

    fn run(&self, script: &str, stdin: Option<&mut dyn Read>) -> Result<CommandOutput> {
        debug!("[{}] ssh: {}", self.name, script);
        run_command(self.ssh_command(script), stdin)
    }

    /// Runs `script`, mapping the `MISSING` exit code to io `NotFound` and any
    /// other failure to a command error.
    fn run_checked(&self, script: &str, path: &Path) -> Result<CommandOutput> {
        let output = self.run(script, None)?;
        self.check(output, path)
    }

    fn check(&self, output: CommandOutput, path: &Path) -> Result<CommandOutput> {
        match output.code() {
            Some(0) => Ok(output),
            Some(MISSING) => Err(GpkgError::from(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}:{}", self.name, path.display()),
            ))),
            _ => Err(GpkgError::Command {
                host: self.name.clone(),
                message: format!("{} ({})", output.stderr.trim(), output.status),
            }),
        }
    }
}

impl HostTarget for SshHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        false
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let p = sh_quote_path(path);
        let script = format!(
            "[ -d {p} ] || exit {MISSING}; cd -- {p} || exit 1; \
             for f in * .[!.]* ..?*; do \
             if [ -L \"$f\" ]; then t=l; elif [ -d \"$f\" ]; then t=d; \
             elif [ -e \"$f\" ]; then t=f; else continue; fi; \
             printf '%s/%s\\n' \"$t\" \"$f\"; done"
        );
        let output = self.run_checked(&script, path)?;
        Ok(parse_listing(&output.stdout))
    }

    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        let p = sh_quote_path(path);
        let script = format!(
            "if [ -d {p} ]; then echo d 0; elif [ -e {p} ]; then echo f $(wc -c < {p}); \
             else exit {MISSING}; fi"
        );
        match self.run_checked(&script, path) {
            Ok(output) => parse_stat(&output.stdout).map(Some),
            Err(e) if e.is_not_exist() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        let script = format!("mkdir -p -m {mode:o} -- {}", sh_quote_path(path));
        self.run_checked(&script, path).map(|_| ())
    }

    fn write_file(&self, path: &Path, mode: u32, contents: &mut dyn Read) -> Result<u64> {
        let p = sh_quote_path(path);
        let script = format!("cat > {p} && chmod {mode:o} {p}");
        let mut counter = CountingReader::new(contents);
        let output = self.run(&script, Some(&mut counter))?;
        self.check(output, path)?;
        Ok(counter.count)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let script = format!(
            "ln -s -- {} {}",
            sh_quote_path(target),
            sh_quote_path(link)
        );
        self.run_checked(&script, link).map(|_| ())
    }

    fn read_link(&self, link: &Path) -> Result<Option<PathBuf>> {
        let l = sh_quote_path(link);
        let script = format!("[ -L {l} ] || exit {MISSING}; readlink -- {l}");
        match self.run_checked(&script, link) {
            Ok(output) => Ok(Some(PathBuf::from(output.stdout.trim_end_matches('\n')))),
            Err(e) if e.is_not_exist() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let p = sh_quote_path(path);
        let script = format!("[ -e {p} ] || [ -L {p} ] || exit {MISSING}; rm -f -- {p}");
        self.run_checked(&script, path).map(|_| ())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let p = sh_quote_path(path);
        let script = format!("[ -e {p} ] || exit {MISSING}; rm -rf -- {p}");
        self.run_checked(&script, path).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        // -T so a symlink to a directory is replaced rather than entered
        let script = format!(
            "mv -f -T -- {} {}",
            sh_quote_path(from),
            sh_quote_path(to)
        );
        self.run_checked(&script, from).map(|_| ())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        if self.stat(path)?.is_none() {
            return Err(GpkgError::from(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}:{}", self.name, path.display()),
            )));
        }
        let mut cmd = self.ssh_command(&format!("cat -- {}", sh_quote_path(path)));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GpkgError::Generic("ssh stdout was not captured".to_string()))?;
        Ok(Box::new(RemoteReader { child, stdout }))
    }
}

/// Streams a remote file, reaping the ssh process when dropped.
struct RemoteReader {
    child: Child,
    stdout: ChildStdout,
}

impl Read for RemoteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for RemoteReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct CountingReader<'a> {
    inner: &'a mut dyn Read,
    count: u64,
}

impl<'a> CountingReader<'a> {
    fn new(inner: &'a mut dyn Read) -> Self {
        Self { inner, count: 0 }
    }
}

impl Read for CountingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

fn parse_listing(stdout: &str) -> Vec<DirEntryInfo> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('/'))
        .map(|(kind, name)| DirEntryInfo {
            name: name.to_string(),
            is_dir: kind == "d",
            is_symlink: kind == "l",
        })
        .collect()
}

fn parse_stat(stdout: &str) -> Result<FileStat> {
    let mut fields = stdout.split_whitespace();
    let kind = fields.next();
    let len = fields
        .next()
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| GpkgError::Generic(format!("unexpected stat output {stdout:?}")))?;
    Ok(FileStat {
        is_dir: kind == Some("d"),
        len,
    })
}

pub(crate) fn sh_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\"'\"'");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

fn sh_quote_path(path: &Path) -> String {
    sh_quote(&path.as_os_str().to_string_lossy())
}
