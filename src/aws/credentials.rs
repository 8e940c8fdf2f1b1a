use super::error::Error;
use super::Result;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use std::fmt::Debug;
use tracing::debug;

#[async_trait]
pub trait CredentialSource: Debug + Send + Sync {
    async fn credentials(&self) -> Result<Credentials>;
}

/// Credentials resolved through the standard AWS provider chain (environment, profiles, SSO,
/// container and instance metadata).
#[derive(Debug, Clone)]
pub struct AmbientCredentials {
    provider: Option<SharedCredentialsProvider>,
}

impl AmbientCredentials {
    pub async fn load(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;

        Self {
            provider: sdk_config.credentials_provider(),
        }
    }
}

#[async_trait]
impl CredentialSource for AmbientCredentials {
    #[tracing::instrument(name = "AmbientCredentials::credentials", skip(self))]
    async fn credentials(&self) -> Result<Credentials> {
        let provider = self.provider.as_ref().ok_or(Error::MissingCredentials)?;

        match provider.provide_credentials().await {
            Ok(credentials) => {
                debug!(access_key_id = credentials.access_key_id(), "Resolved AWS credentials");
                Ok(credentials)
            }
            Err(CredentialsError::CredentialsNotLoaded(_)) => Err(Error::MissingCredentials),
            Err(e) => Err(Error::Provider(e)),
        }
    }
}

#[async_trait]
impl CredentialSource for Credentials {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.clone())
    }
}
