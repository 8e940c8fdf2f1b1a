use crate::kubernetes::{error::Error, Client, Result};
use http::header::ACCEPT;
use serde::de::DeserializeOwned;
use url::Url;

pub(super) async fn get<R: DeserializeOwned>(
    client: &Client,
    path: &str,
    params: &[(&str, &str)],
    bearer_token: &str,
) -> Result<R> {
    let url = gen_url(&client.config.endpoint, path, params)?;
    let response = client
        .http_client
        .get(url)
        .bearer_auth(bearer_token)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::BadResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.text().await?,
        });
    }

    let content = response.text().await?;
    serde_json::from_str(&content).map_err(|source| Error::Deserialization { content, source })
}

fn gen_url(endpoint: &Url, path: &str, params: &[(&str, &str)]) -> Result<Url> {
    let mut url = endpoint.join(path).map_err(|source| Error::InvalidUrl {
        url: format!("{}{}", endpoint, path),
        source,
    })?;
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }

    Ok(url)
}
