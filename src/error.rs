use std::{error::Error, fmt, io};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, RegressionErr>;

/// The stage of a run an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Config,
    Load,
    Distribute,
    Reduce,
    Solve,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Config => "config",
            Phase::Load => "load",
            Phase::Distribute => "distribute",
            Phase::Reduce => "reduce",
            Phase::Solve => "solve",
        };

        f.write_str(name)
    }
}

/// Failures of a regression run.
#[derive(Debug)]
pub enum RegressionErr {
    /// Partition requested for zero points, zero workers or an unknown worker.
    InvalidPartition {
        points: usize,
        workers: usize,
        worker_id: usize,
    },
    /// The dataset file could not be read.
    Io(io::Error),
    MalformedDataset(String),
    /// The coordinator was started without a dataset source.
    MissingDataset,
    /// A send or receive failed; the run cannot continue.
    Transmission { phase: Phase, source: io::Error },
    /// `Σx·Σx − n·Σx²` is zero, every `x` is the same value.
    DegenerateModel { denominator: f64 },
    InvalidConfig(String),
    WorkerPanicked { rank: usize },
    /// Every worker finished but the coordinator produced no report.
    MissingReport,
}

impl RegressionErr {
    /// Builds a `map_err` adapter tagging transmission failures with `phase`.
    pub fn transmission(phase: Phase) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Transmission { phase, source }
    }

    /// The phase of the run this error stopped, unknown for panics.
    pub fn phase(&self) -> Option<Phase> {
        let phase = match self {
            Self::InvalidPartition { .. } => Phase::Distribute,
            Self::Io(_) | Self::MalformedDataset(_) | Self::MissingDataset => Phase::Load,
            Self::Transmission { phase, .. } => *phase,
            Self::DegenerateModel { .. } => Phase::Solve,
            Self::InvalidConfig(_) => Phase::Config,
            Self::WorkerPanicked { .. } | Self::MissingReport => return None,
        };

        Some(phase)
    }

    /// Whether this worker failed only because another worker aborted the run.
    pub fn is_peer_abort(&self) -> bool {
        matches!(
            self,
            Self::Transmission { source, .. } if source.kind() == io::ErrorKind::ConnectionAborted
        )
    }
}

impl fmt::Display for RegressionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPartition {
                points,
                workers,
                worker_id,
            } => write!(
                f,
                "invalid partition: worker {worker_id} of {workers} over {points} point(s)"
            ),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::MalformedDataset(msg) => write!(f, "malformed dataset: {msg}"),
            Self::MissingDataset => f.write_str("the coordinator has no dataset to load"),
            Self::Transmission { phase, source } => {
                write!(f, "transmission failed during {phase}: {source}")
            }
            Self::DegenerateModel { denominator } => write!(
                f,
                "undefined model: every x is identical (denominator {denominator:e})"
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::WorkerPanicked { rank } => write!(f, "worker {rank} panicked"),
            Self::MissingReport => f.write_str("worker 0 finished without a report"),
        }
    }
}

impl Error for RegressionErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Transmission { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for RegressionErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmission_errors_name_their_phase() {
        let err = RegressionErr::transmission(Phase::Reduce)(io::Error::from(
            io::ErrorKind::BrokenPipe,
        ));

        assert_eq!(err.phase(), Some(Phase::Reduce));
        assert!(err.to_string().contains("during reduce"));
        assert!(!err.is_peer_abort());
    }

    #[test]
    fn phases_display_in_lowercase() {
        let names: Vec<_> = [
            Phase::Config,
            Phase::Load,
            Phase::Distribute,
            Phase::Reduce,
            Phase::Solve,
        ]
        .iter()
        .map(Phase::to_string)
        .collect();

        assert_eq!(names, ["config", "load", "distribute", "reduce", "solve"]);
    }

    #[test]
    fn missing_report_has_no_phase() {
        let err = RegressionErr::MissingReport;

        assert_eq!(err.phase(), None);
        assert!(!err.is_peer_abort());
        assert!(err.to_string().contains("without a report"));
    }

    #[test]
    fn aborted_transmissions_are_peer_aborts() {
        let err = RegressionErr::transmission(Phase::Distribute)(io::Error::from(
            io::ErrorKind::ConnectionAborted,
        ));

        assert!(err.is_peer_abort());
    }
}
