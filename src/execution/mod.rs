//! Execution engine: source preparation, output rendering and result types.

use std::time::Duration;

pub mod output;
pub mod python;

/// Terminal state of one session. Exactly one is produced per execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Exit code 0. `output` is rendered stdout plus the timing annotation.
    Succeeded { output: String, execution_time: f64 },
    /// Non-zero exit. `output` is stderr verbatim.
    Failed {
        output: String,
        execution_time: f64,
        exit_code: Option<i32>,
    },
    /// Killed by the wall-clock limit.
    TimedOut { output: String, execution_time: f64 },
    /// Pipe or wait failure after launch.
    Crashed { output: String },
}

impl Outcome {
    pub fn timed_out(limit: Duration) -> Self {
        Outcome::TimedOut {
            output: format!(
                "Execution timed out after {} seconds. Try reducing the complexity of your code.",
                limit.as_secs()
            ),
            execution_time: limit.as_secs_f64(),
        }
    }

    /// Text delivered to duplex clients in the `completed` event.
    pub fn output(&self) -> &str {
        match self {
            Outcome::Succeeded { output, .. }
            | Outcome::Failed { output, .. }
            | Outcome::TimedOut { output, .. }
            | Outcome::Crashed { output } => output,
        }
    }

    pub fn execution_time(&self) -> Option<f64> {
        match self {
            Outcome::Succeeded { execution_time, .. }
            | Outcome::Failed { execution_time, .. }
            | Outcome::TimedOut { execution_time, .. } => Some(*execution_time),
            Outcome::Crashed { .. } => None,
        }
    }

    /// Interpreter exit code, known only for a non-zero exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Outcome::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded { .. } => "succeeded",
            Outcome::Failed { .. } => "failed",
            Outcome::TimedOut { .. } => "timed_out",
            Outcome::Crashed { .. } => "crashed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_outcome_reports_the_limit() {
        let outcome = Outcome::timed_out(Duration::from_secs(60));
        assert_eq!(
            outcome.output(),
            "Execution timed out after 60 seconds. Try reducing the complexity of your code."
        );
        assert_eq!(outcome.execution_time(), Some(60.0));
        assert_eq!(outcome.label(), "timed_out");
    }

    #[test]
    fn crashed_outcome_has_no_timing() {
        let outcome = Outcome::Crashed { output: "broken pipe".into() };
        assert_eq!(outcome.execution_time(), None);
        assert_eq!(outcome.output(), "broken pipe");
        assert_eq!(outcome.exit_code(), None);
    }

    #[test]
    fn failed_outcome_keeps_the_exit_code() {
        let outcome = Outcome::Failed {
            output: "Traceback".into(),
            execution_time: 0.1,
            exit_code: Some(1),
        };
        assert_eq!(outcome.exit_code(), Some(1));
        assert_eq!(outcome.label(), "failed");
    }
}
