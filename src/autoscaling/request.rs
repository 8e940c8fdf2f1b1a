use crate::autoscaling::{error::Error, Client, Result};
use crate::aws::sigv4::{self, Scope};
use chrono::Utc;
use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;

const SERVICE: &str = "autoscaling";
const API_VERSION: &str = "2011-01-01";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Calls a Query API action and decodes the XML response.
pub(super) async fn post_action<R: DeserializeOwned>(
    client: &Client,
    action: &str,
    params: &[(&str, &str)],
) -> Result<R> {
    let body = encode_body(action, params);
    let credentials = client.credentials.credentials().await?;
    let signed_headers = sigv4::sign_request(
        "POST",
        &client.config.address,
        &[(CONTENT_TYPE.as_str(), FORM_CONTENT_TYPE)],
        body.as_bytes(),
        &credentials,
        &Scope {
            region: &client.config.region,
            service: SERVICE,
            time: Utc::now(),
        },
    );

    let mut request_builder = client
        .http_client
        .post(client.config.address.clone())
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(body);
    for (name, value) in signed_headers {
        request_builder = request_builder.header(name, value);
    }

    let response = request_builder.send().await?;

    if !response.status().is_success() {
        return Err(Error::BadResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.text().await?,
        });
    }

    let content = response.text().await?;
    quick_xml::de::from_str(&content).map_err(|source| Error::Deserialization { content, source })
}

fn encode_body(action: &str, params: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("Action", action);
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("Version", API_VERSION);

    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_body() {
        assert_eq!(
            "Action=DescribeAutoScalingGroups&AutoScalingGroupNames.member.1=infra-cluster-workers&Version=2011-01-01",
            encode_body(
                "DescribeAutoScalingGroups",
                &[("AutoScalingGroupNames.member.1", "infra-cluster-workers")]
            )
        );
    }
}
