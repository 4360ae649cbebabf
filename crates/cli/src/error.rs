use crate::commands::ArgsError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("invalid arg(s)")]
    Args(#[from] ArgsError),

    #[error("chain config error")]
    Chains(#[from] tpsbench_chains::Error),

    #[error("core error")]
    Core(#[from] tpsbench_core::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("report error")]
    Report(#[from] tpsbench_report::Error),

    #[error("failed to set up logging")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
}

impl CliError {
    /// True when a retried call gave up because ctrl-c was pressed.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Core(tpsbench_core::Error::Cancelled { .. })
                | Self::Report(tpsbench_report::Error::Core(
                    tpsbench_core::Error::Cancelled { .. }
                ))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_recognised_through_report_errors() {
        let cancelled = || tpsbench_core::Error::Cancelled {
            label: "eth_getBlockByNumber".to_owned(),
        };
        assert!(CliError::Core(cancelled()).is_cancelled());
        assert!(CliError::Report(cancelled().into()).is_cancelled());
        assert!(!CliError::Core(tpsbench_core::Error::Config("x".to_owned())).is_cancelled());
    }
}
