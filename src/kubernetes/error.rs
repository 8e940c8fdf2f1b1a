use http::{HeaderMap, StatusCode};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Missing config key {0}")]
    MissingConfig(&'static str),
    #[error("Failed to generate url {url} caused by {source:?}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("Cluster CA data is not valid base64")]
    InvalidCaData(#[from] base64::DecodeError),
    #[error("Cluster CA data does not contain a usable certificate")]
    InvalidCertificate(#[source] Option<reqwest::Error>),
    #[error("Failed to materialize cluster CA file")]
    CaFileIo(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("HTTP {}", .status.as_u16())]
    BadResponse {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },
    #[error("Failed to deserialize response")]
    Deserialization {
        content: String,
        source: serde_json::Error,
    },
}

impl Error {
    /// Errors that may resolve on their own while nodes join the cluster.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Reqwest(_) | Error::BadResponse { .. } | Error::Deserialization { .. }
        )
    }
}
