//! Interpreter process supervision: launch, live relay, timeout and cleanup.

use std::{io, sync::Arc, time::Duration};

use futures_util::StreamExt;
use tokio::{
    io::AsyncRead,
    process::{Child, ChildStderr, ChildStdin, ChildStdout},
};
use tracing::{debug, error, info, warn};

use crate::{
    execution::{
        output::{annotate_runtime, render_figures},
        Outcome,
    },
    scratch::ScriptFile,
    session::{RegistryError, ServerEvent, Session, SessionId, SessionRegistry},
};

pub mod python;
pub mod stream;

pub struct ProcessHandle {
    pub child: Child,
    pub stdin: Option<ChildStdin>,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn interpreter")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Wall-clock budget for one execution.
    pub timeout: Duration,
    /// How long to wait for a killed process to be reaped.
    pub kill_grace: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Runs one interpreter per submission. Cheap to clone; every call to `run`
/// is independent of the others.
#[derive(Clone)]
pub struct Supervisor {
    registry: SessionRegistry,
    program: Arc<str>,
    limits: Limits,
}

impl Supervisor {
    pub fn new(registry: SessionRegistry, program: impl Into<String>, limits: Limits) -> Self {
        Self { registry, program: program.into().into(), limits }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Executes `script` as session `id` and returns its single terminal
    /// outcome. The script file is removed on every path.
    pub async fn run(&self, id: SessionId, script: ScriptFile) -> Result<Outcome, ExecError> {
        let handle = match python::start_python(&self.program, script.path()) {
            Ok(h) => h,
            Err(e) => {
                error!(session = %id, program = %self.program, error = %e, "error spawning python process");
                script.remove();
                return Err(ExecError::Spawn(e));
            }
        };
        let ProcessHandle { mut child, stdin, stdout, stderr } = handle;

        let session = Arc::new(Session::new(id.clone(), child.id(), stdin));
        if let Err(e) = self.registry.insert(Arc::clone(&session)) {
            reap(&mut child, self.limits.kill_grace).await;
            script.remove();
            return Err(e.into());
        }
        info!(session = %id, pid = ?session.pid(), "python process started");

        Ok(self.supervise(session, child, stdout, stderr, script).await)
    }

    /// Drives a registered session to its terminal outcome and tears it down.
    async fn supervise<O, E>(
        &self,
        session: Arc<Session>,
        mut child: Child,
        stdout: O,
        stderr: E,
        script: ScriptFile,
    ) -> Outcome
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let relayed = tokio::time::timeout(
            self.limits.timeout,
            self.relay(&session, &mut child, stdout, stderr),
        )
        .await;

        let outcome = match relayed {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(session = %session.id(), timeout_secs = self.limits.timeout.as_secs(), "execution timed out, killing process");
                Outcome::timed_out(self.limits.timeout)
            }
        };
        if matches!(outcome, Outcome::TimedOut { .. } | Outcome::Crashed { .. }) {
            reap(&mut child, self.limits.kill_grace).await;
        }

        self.finish(&session, &outcome);
        script.remove();
        self.registry.remove(session.id());
        outcome
    }

    /// Streams both pipes to tagged clients until EOF, then waits for exit.
    async fn relay<O, E>(&self, session: &Session, child: &mut Child, stdout: O, stderr: E) -> Outcome
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let id = session.id();
        let out = Box::pin(stream::text_chunks(stdout)).map(|c| (Pipe::Stdout, c));
        let err = Box::pin(stream::text_chunks(stderr)).map(|c| (Pipe::Stderr, c));
        let mut chunks = futures_util::stream::select(out, err);

        let mut stdout_text = String::new();
        let mut stderr_text = String::new();
        while let Some((pipe, chunk)) = chunks.next().await {
            let text = match chunk {
                Ok(text) => text,
                Err(e) => {
                    error!(session = %id, error = %e, "python process pipe failed");
                    return Outcome::Crashed { output: e.to_string() };
                }
            };
            match pipe {
                Pipe::Stdout => {
                    stdout_text.push_str(&text);
                    self.registry.publish(id, &ServerEvent::Output(text));
                }
                Pipe::Stderr => {
                    stderr_text.push_str(&text);
                    self.registry.publish(id, &ServerEvent::Error(text));
                }
            }
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                error!(session = %id, error = %e, "python process error");
                return Outcome::Crashed { output: e.to_string() };
            }
        };
        let execution_time = session.started().elapsed().as_secs_f64();
        debug!(session = %id, ?status, elapsed_ms = (execution_time * 1000.0) as u64, "python process exited");

        if status.success() {
            let rendered = render_figures(&stdout_text);
            Outcome::Succeeded {
                output: annotate_runtime(&rendered, execution_time),
                execution_time,
            }
        } else {
            Outcome::Failed { output: stderr_text, execution_time, exit_code: status.code() }
        }
    }

    fn finish(&self, session: &Session, outcome: &Outcome) {
        if !session.mark_terminal() {
            return;
        }
        session.close_stdin();
        let delivered = self.registry.complete(session.id(), outcome.output());
        info!(
            session = %session.id(),
            outcome = outcome.label(),
            exit_code = ?outcome.exit_code(),
            delivered,
            "session finished"
        );
    }
}

/// Kills the child and waits briefly so it does not linger as a zombie.
async fn reap(child: &mut Child, grace: Duration) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill skipped");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "killed process reaped"),
        Ok(Err(e)) => warn!(error = %e, "waiting for killed process failed"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "killed process did not exit in time"),
    }
}
