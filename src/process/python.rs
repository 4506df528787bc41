//! Python interpreter launch and pipe wiring.

use std::{io, path::Path, process::Stdio};

use tokio::process::{Child, Command};

use super::ProcessHandle;

/// Launches `program` with `script` as its only argument and all three
/// standard streams piped.
pub fn start_python(program: &str, script: &Path) -> io::Result<ProcessHandle> {
    let mut cmd = Command::new(program);
    cmd.arg(script)
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child: Child = cmd.spawn()?;
    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no stderr"))?;

    Ok(ProcessHandle { child, stdin, stdout, stderr })
}
