pub mod clusters;
pub mod error;
mod request;
pub mod token;

use crate::aws::CredentialSource;
use reqwest::ClientBuilder;
use std::sync::Arc;
use url::Url;

pub type Result<T> = std::result::Result<T, error::Error>;

#[derive(Debug)]
pub struct Client {
    config: Config,
    http_client: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
}

#[derive(Debug, Clone)]
pub struct Config {
    address: Url,
    region: String,
}

impl Client {
    pub fn builder() -> Builder {
        Builder::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Builder {
    address: Option<String>,
    region: Option<String>,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl Builder {
    /// Overrides the regional endpoint `https://eks.<region>.amazonaws.com`.
    pub fn address(mut self, address: String) -> Self {
        self.address = Some(address);
        self
    }

    pub fn region(mut self, region: String) -> Self {
        self.region = Some(region);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> Result<Client> {
        use error::Error::*;

        let region = self.region.ok_or(MissingConfig("region"))?;
        let address = self
            .address
            .unwrap_or_else(|| format!("https://eks.{}.amazonaws.com", region));
        let address = Url::parse(&address).map_err(|source| InvalidUrl {
            url: address.clone(),
            source,
        })?;

        Ok(Client {
            config: Config { address, region },
            http_client: ClientBuilder::new().build()?,
            credentials: self.credentials.ok_or(MissingConfig("credentials"))?,
        })
    }
}
