use crate::{autoscaling, aws, eks, kubernetes};
use std::fmt;
use tracing_error::SpanTrace;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub struct Error {
    source: ErrorKind,
    span_trace: SpanTrace,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Timed out after {elapsed_secs}s waiting for Auto Scaling Group {group} to become healthy.")]
    Timeout { group: String, elapsed_secs: u64 },
    #[error(
        "Timed out after {elapsed_secs}s waiting for Kubernetes nodes in group {node_group} to become Ready. Last seen error: {}",
        .last_error.as_deref().unwrap_or("none")
    )]
    KubernetesTimeout {
        node_group: String,
        elapsed_secs: u64,
        last_error: Option<String>,
    },
    #[error("Unable to find AWS credentials")]
    MissingCredentials,
    #[error("Invalid readiness configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Fatal(anyhow::Error),
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.source
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// Transient errors are logged and retried on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self.source, ErrorKind::Transient(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, fmt)
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(source: E) -> Self {
        Self {
            source: ErrorKind::from(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<aws::error::Error> for ErrorKind {
    fn from(e: aws::error::Error) -> Self {
        match e {
            aws::error::Error::MissingCredentials => ErrorKind::MissingCredentials,
            e => ErrorKind::Fatal(e.into()),
        }
    }
}

impl From<autoscaling::error::Error> for ErrorKind {
    fn from(e: autoscaling::error::Error) -> Self {
        match e {
            autoscaling::error::Error::Credentials(e) => e.into(),
            e => ErrorKind::Transient(e.into()),
        }
    }
}

impl From<eks::error::Error> for ErrorKind {
    fn from(e: eks::error::Error) -> Self {
        match e {
            eks::error::Error::Credentials(e) => e.into(),
            e => ErrorKind::Fatal(e.into()),
        }
    }
}

impl From<kubernetes::error::Error> for ErrorKind {
    fn from(e: kubernetes::error::Error) -> Self {
        if e.is_transient() {
            ErrorKind::Transient(e.into())
        } else {
            ErrorKind::Fatal(e.into())
        }
    }
}
