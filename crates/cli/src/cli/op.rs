use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::prelude::{Config, Messenger, NostrRelayClient, StatusTracker};

use crate::state::{AppState, StateError};

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Optional custom config path (defaults to ~/.pulse)
    pub config_path: Option<PathBuf>,
    /// Print progress, relay status and timings to stderr
    pub verbose: bool,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            config_path,
            verbose,
        }
    }

    /// Settings from the config file, or the defaults if there is none
    pub fn config(&self) -> Result<Config, StateError> {
        AppState::load_config(self.config_path.clone())
    }

    pub fn messenger(&self) -> Result<Messenger<NostrRelayClient>, StateError> {
        Ok(Messenger::from_config(&self.config()?))
    }

    /// A tracker that records only in verbose mode
    pub fn tracker(&self) -> StatusTracker {
        StatusTracker::new(self.verbose)
    }

    /// Progress line, verbose mode only
    pub fn note(&self, message: &str) {
        if self.verbose {
            eprintln!("{}", message);
        }
    }

    /// Relay table and timings, verbose mode only
    pub fn report(&self, tracker: &StatusTracker, started: Instant) {
        if self.verbose {
            eprintln!("{}", verbose_report(tracker, started.elapsed()));
        }
    }
}

/// Relay table, time to first result and total time
pub fn verbose_report(tracker: &StatusTracker, total: Duration) -> String {
    let mut lines = Vec::new();
    let table = tracker.render();
    if !table.is_empty() {
        lines.push(table);
    }
    lines.push(format!(
        "First result after: {}ms",
        tracker.first_success_latency().as_millis()
    ));
    lines.push(format!("Total operation time: {}ms", total.as_millis()));
    lines.join("\n")
}

/// `Some(0)` waits forever, `None` falls back to the configured timeout
pub fn listen_timeout(requested: Option<u64>, config: &Config) -> Option<Duration> {
    match requested {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.listen_timeout(),
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::prelude::RelayEndpoint;
    use common::status::RelayStatus;

    #[test]
    fn test_listen_timeout_flag_wins() {
        let config = Config::default();
        assert_eq!(
            listen_timeout(Some(3), &config),
            Some(Duration::from_secs(3))
        );
        assert_eq!(listen_timeout(Some(0), &config), None);
    }

    #[test]
    fn test_listen_timeout_falls_back_to_config() {
        let config = Config {
            listen_timeout: 0,
            ..Config::default()
        };
        assert_eq!(listen_timeout(None, &config), None);
        assert_eq!(
            listen_timeout(None, &Config::default()),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_verbose_report_shows_first_result_latency() {
        let fast: RelayEndpoint = "wss://fast.test".parse().unwrap();
        let slow: RelayEndpoint = "wss://slow.test".parse().unwrap();
        let tracker = StatusTracker::new(true);
        tracker.register(&fast);
        tracker.register(&slow);

        tokio::time::advance(Duration::from_millis(120)).await;
        tracker.update(&fast, RelayStatus::Success, None);
        tokio::time::advance(Duration::from_millis(300)).await;
        tracker.finalize();

        let report = verbose_report(&tracker, Duration::from_millis(420));
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("wss://fast.test"));
        assert!(lines[1].contains("(cancelled by first result)"));
        assert_eq!(lines[2], "First result after: 120ms");
        assert_eq!(lines[3], "Total operation time: 420ms");
    }

    #[test]
    fn test_context_without_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("missing")), false);
        assert_eq!(ctx.config().unwrap(), Config::default());
        assert!(!ctx.tracker().is_enabled());
    }
}
