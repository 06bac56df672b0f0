use std::{fmt, time::Duration};

/// Lowest HTTP status code counted as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(u16);

impl Threshold {
    pub const ACCEPT_4XX: Threshold = Threshold(500);
    pub const REJECT_4XX: Threshold = Threshold(400);

    pub fn from_accept_4xx(accept_4xx: bool) -> Self {
        if accept_4xx {
            Self::ACCEPT_4XX
        } else {
            Self::REJECT_4XX
        }
    }

    pub fn boundary(self) -> u16 {
        self.0
    }

    pub fn is_failure(self, status: u16) -> bool {
        status >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::ACCEPT_4XX
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NotAllowedTld,
    Transport(String),
    Status(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotAllowedTld => f.write_str("not available top level domain"),
            FailureReason::Transport(details) => write!(f, "error while get url: {}", details),
            FailureReason::Status(status) => write!(f, "error status code {}", status),
        }
    }
}

/// Classified result of probing one domain.
///
/// `Display` renders the output line without its trailing newline, e.g.
/// `example.com - status code 200 OK;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { domain: String, status: String },
    Failure { domain: String, reason: FailureReason },
}

impl ProbeOutcome {
    pub fn domain(&self) -> &str {
        match self {
            ProbeOutcome::Success { domain, .. } | ProbeOutcome::Failure { domain, .. } => domain,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Failure { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success { domain, status } => {
                write!(f, "{} - status code {};", domain, status)
            }
            ProbeOutcome::Failure { domain, reason } => write!(f, "{} - {};", domain, reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbeConfig {
    pub threshold: Threshold,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}
