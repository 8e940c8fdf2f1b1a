use crate::aws::sigv4::{self, Scope};
use crate::eks::{error::Error, Client, Result};
use chrono::Utc;
use http::header::ACCEPT;
use serde::de::DeserializeOwned;
use url::Url;

const SERVICE: &str = "eks";

pub(super) async fn get<R: DeserializeOwned>(client: &Client, path: &str) -> Result<R> {
    let url = gen_url(&client.config.address, path)?;
    let credentials = client.credentials.credentials().await?;
    let signed_headers = sigv4::sign_request(
        "GET",
        &url,
        &[],
        b"",
        &credentials,
        &Scope {
            region: &client.config.region,
            service: SERVICE,
            time: Utc::now(),
        },
    );

    let mut request_builder = client
        .http_client
        .get(url)
        .header(ACCEPT, "application/json");
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

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| Error::Deserialization {
        content: body,
        source,
    })
}

fn gen_url(address: &Url, path: &str) -> Result<Url> {
    address.join(path).map_err(|source| Error::InvalidUrl {
        url: format!("{}{}", address, path),
        source,
    })
}
