//! Options accepted on the command line but only supported by the
//! enterprise edition.
//!
//! Whether asking for one is an error or a warning is up to the
//! operator (`--edition-options reject|ignore`).

use clap::{Args, ValueEnum};
use tracing::warn;

use crate::error::CliError;

/// Treatment of edition-only options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EditionPolicy {
    /// Refuse to start.
    #[default]
    Reject,
    /// Log a warning and carry on without the option.
    Ignore,
}

/// Edition-only options of `start`.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct EditionOnlyOptions {
    /// Concurrency model (enterprise edition)
    #[arg(long)]
    pub concurrency_model: Option<String>,

    /// Threads per worker (enterprise edition)
    #[arg(long)]
    pub thread_count: Option<u32>,

    /// Restart workers one at a time (enterprise edition)
    #[arg(long)]
    pub rolling_restarts: bool,

    /// Keep old workers when a deploy fails to load (enterprise edition)
    #[arg(long)]
    pub resist_deployment_errors: bool,
}

impl EditionOnlyOptions {
    /// Names of the options that were given, in command-line spelling.
    pub fn requested(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.concurrency_model.is_some() {
            names.push("--concurrency-model");
        }
        if self.thread_count.is_some() {
            names.push("--thread-count");
        }
        if self.rolling_restarts {
            names.push("--rolling-restarts");
        }
        if self.resist_deployment_errors {
            names.push("--resist-deployment-errors");
        }
        names
    }

    /// Apply `policy` to whatever was requested.
    ///
    /// # Errors
    ///
    /// [`CliError::EditionOnly`] naming the first requested option when
    /// the policy is [`EditionPolicy::Reject`].
    pub fn enforce(&self, policy: EditionPolicy) -> Result<(), CliError> {
        let requested = self.requested();
        match policy {
            EditionPolicy::Reject => match requested.first().copied() {
                Some(option) => Err(CliError::EditionOnly { option }),
                None => Ok(()),
            },
            EditionPolicy::Ignore => {
                for option in requested {
                    warn!(option, "Ignoring option that is only available in the enterprise edition");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_requested_passes_either_policy() {
        let none = EditionOnlyOptions::default();
        assert!(none.enforce(EditionPolicy::Reject).is_ok());
        assert!(none.enforce(EditionPolicy::Ignore).is_ok());
    }

    #[test]
    fn reject_names_the_first_option() {
        let options = EditionOnlyOptions {
            thread_count: Some(4),
            rolling_restarts: true,
            ..Default::default()
        };
        assert_eq!(options.requested(), ["--thread-count", "--rolling-restarts"]);

        let err = options.enforce(EditionPolicy::Reject).unwrap_err();
        assert!(matches!(err, CliError::EditionOnly { option: "--thread-count" }));
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn ignore_drops_options() {
        let options = EditionOnlyOptions {
            concurrency_model: Some("thread".to_string()),
            resist_deployment_errors: true,
            ..Default::default()
        };
        assert!(options.enforce(EditionPolicy::Ignore).is_ok());
    }
}
