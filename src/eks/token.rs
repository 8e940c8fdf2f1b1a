//! Bearer tokens for the EKS API server, derived from a presigned STS `GetCallerIdentity` url.

use super::error::Error;
use super::Result;
use crate::aws::sigv4::{self, Scope};
use crate::aws::CredentialSource;
use aws_credential_types::Credentials;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const TOKEN_PREFIX: &str = "k8s-aws-v1.";
pub const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";

const PRESIGN_EXPIRY: Duration = Duration::from_secs(60);

/// The api server accepts tokens for 15 minutes after signing.
const TOKEN_LIFETIME_SECS: i64 = 14 * 60;

#[derive(Clone)]
pub struct BearerToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn to_exec_credential(&self) -> ExecCredential {
        ExecCredential {
            kind: "ExecCredential",
            api_version: "client.authentication.k8s.io/v1beta1",
            spec: BTreeMap::new(),
            status: ExecCredentialStatus {
                expiration_timestamp: self.expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                token: self.token.clone(),
            },
        }
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Output format of kubeconfig `exec` credential plugins.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential {
    kind: &'static str,
    api_version: &'static str,
    spec: BTreeMap<String, String>,
    status: ExecCredentialStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredentialStatus {
    expiration_timestamp: String,
    token: String,
}

pub fn mint(
    cluster_name: &str,
    region: &str,
    credentials: &Credentials,
    time: DateTime<Utc>,
) -> Result<BearerToken> {
    let sts_url = format!(
        "https://sts.{}.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15",
        region
    );
    let sts_url = Url::parse(&sts_url).map_err(|source| Error::InvalidUrl {
        url: sts_url.clone(),
        source,
    })?;

    let presigned = sigv4::presign_url(
        &sts_url,
        &[(CLUSTER_ID_HEADER, cluster_name)],
        credentials,
        &Scope {
            region,
            service: "sts",
            time,
        },
        PRESIGN_EXPIRY,
    );

    Ok(BearerToken {
        token: format!(
            "{}{}",
            TOKEN_PREFIX,
            URL_SAFE_NO_PAD.encode(presigned.as_str())
        ),
        expires_at: time + chrono::Duration::seconds(TOKEN_LIFETIME_SECS),
    })
}

/// Mints a fresh token per call from the ambient credentials.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    credentials: Arc<dyn CredentialSource>,
}

impl TokenGenerator {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self { credentials }
    }

    #[tracing::instrument(name = "TokenGenerator::generate", skip(self))]
    pub async fn generate(&self, cluster_name: &str, region: &str) -> Result<BearerToken> {
        let credentials = self.credentials.credentials().await?;

        mint(cluster_name, region, &credentials, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::sigv4::tests::{credentials, signing_time};

    #[test]
    fn test_mint_token() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let token = mint("infra-cluster", "eu-west-2", &credentials(None), signing_time())?;

        assert_eq!(
            "k8s-aws-v1.aHR0cHM6Ly9zdHMuZXUtd2VzdC0yLmFtYXpvbmF3cy5jb20vP0FjdGlvbj1HZXRDYWxsZXJJZGVudGl0eSZWZXJzaW9uPTIwMTEtMDYtMTUmWC1BbXotQWxnb3JpdGhtPUFXUzQtSE1BQy1TSEEyNTYmWC1BbXotQ3JlZGVudGlhbD1BS0lERVhBTVBMRSUyRjIwMjQwMTE1JTJGZXUtd2VzdC0yJTJGc3RzJTJGYXdzNF9yZXF1ZXN0JlgtQW16LURhdGU9MjAyNDAxMTVUMTIzMDQ1WiZYLUFtei1FeHBpcmVzPTYwJlgtQW16LVNpZ25lZEhlYWRlcnM9aG9zdCUzQngtazhzLWF3cy1pZCZYLUFtei1TaWduYXR1cmU9MTBhNzJmODk2MzY0MGUyNzJkMzA0NzEyNDY2N2ZkZTc3MDJmZGExM2IxYzA2YmQ4M2RiMDFjNWE1NGUwY2U4Yg",
            token.as_str()
        );

        Ok(())
    }

    #[test]
    fn test_token_is_unpadded_and_decodes_to_presigned_url(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let token = mint(
            "infra-cluster",
            "us-east-1",
            &credentials(Some("FwoGZXIvYXdzEXAMPLE/session+token==")),
            signing_time(),
        )?;

        let encoded = token.as_str().strip_prefix(TOKEN_PREFIX).unwrap();
        assert!(!encoded.contains('='));

        let url = String::from_utf8(URL_SAFE_NO_PAD.decode(encoded)?)?;
        assert!(url.starts_with("https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity"));
        assert!(url.contains("X-Amz-Expires=60"));
        assert!(url.contains("X-Amz-SignedHeaders=host%3Bx-k8s-aws-id"));
        assert!(url.contains("X-Amz-Security-Token="));

        Ok(())
    }

    #[test]
    fn test_exec_credential_format() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let token = mint("infra-cluster", "eu-west-2", &credentials(None), signing_time())?;

        let json = serde_json::to_value(token.to_exec_credential())?;

        assert_eq!("ExecCredential", json["kind"]);
        assert_eq!("client.authentication.k8s.io/v1beta1", json["apiVersion"]);
        assert_eq!(serde_json::json!({}), json["spec"]);
        assert_eq!("2024-01-15T12:44:45Z", json["status"]["expirationTimestamp"]);
        assert_eq!(token.as_str(), json["status"]["token"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_generator_uses_credential_source(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let generator = TokenGenerator::new(Arc::new(credentials(None)));

        let token = generator.generate("infra-cluster", "eu-west-2").await?;

        assert!(token.as_str().starts_with(TOKEN_PREFIX));
        assert!(token.expires_at() > Utc::now());

        Ok(())
    }
}
