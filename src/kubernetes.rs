mod ca;
pub mod error;
pub mod nodes;
mod request;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::ClientBuilder;
use std::time::Duration;
use url::Url;

pub use ca::CaFile;

pub type Result<T> = std::result::Result<T, error::Error>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct Client {
    config: Config,
    http_client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct Config {
    endpoint: Url,
}

impl Client {
    pub fn builder() -> Builder {
        Builder::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Builder {
    endpoint: Option<String>,
    ca_data: Option<String>,
    request_timeout: Option<Duration>,
}

impl Builder {
    pub fn endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Base64 encoded PEM bundle; the server certificate is verified against it exclusively.
    pub fn ca_data(mut self, ca_data: String) -> Self {
        self.ca_data = Some(ca_data);
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    pub fn build(self) -> Result<Client> {
        use error::Error::*;

        let endpoint = self.endpoint.ok_or(MissingConfig("endpoint"))?;
        let endpoint = Url::parse(&endpoint).map_err(|source| InvalidUrl {
            url: endpoint.clone(),
            source,
        })?;

        let pem = STANDARD.decode(self.ca_data.ok_or(MissingConfig("ca_data"))?.trim())?;
        let certificates = {
            let ca_file = CaFile::write(&pem)?;
            ca_file.certificates()?
        };

        let mut http_client = ClientBuilder::new()
            .tls_built_in_root_certs(false)
            .timeout(self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT));
        for certificate in certificates {
            http_client = http_client.add_root_certificate(certificate);
        }

        Ok(Client {
            config: Config { endpoint },
            http_client: http_client.build()?,
        })
    }
}
