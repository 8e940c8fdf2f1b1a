//! AWS Signature Version 4, for both `Authorization` header signing and query presigning.

use aws_credential_types::Credentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Everything except RFC 3986 unreserved characters gets percent encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

impl Scope<'_> {
    fn date(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    pub fn amz_date(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date(),
            self.region,
            self.service
        )
    }
}

/// Presigns a GET request by moving the signature into the query string. The extra `headers`
/// are signed as well and have to be sent along with the presigned url.
pub fn presign_url(
    url: &Url,
    headers: &[(&str, &str)],
    credentials: &Credentials,
    scope: &Scope<'_>,
    expires_in: Duration,
) -> Url {
    let mut header_entries = vec![(String::from("host"), host_header(url))];
    header_entries.extend(headers.iter().map(|(k, v)| (k.to_lowercase(), v.trim().to_owned())));
    header_entries.sort();
    let (canonical_headers, signed_headers) = canonical_headers(&header_entries);

    let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    params.push(("X-Amz-Algorithm".into(), ALGORITHM.into()));
    params.push((
        "X-Amz-Credential".into(),
        format!(
            "{}/{}",
            credentials.access_key_id(),
            scope.credential_scope()
        ),
    ));
    params.push(("X-Amz-Date".into(), scope.amz_date()));
    params.push(("X-Amz-Expires".into(), expires_in.as_secs().to_string()));
    params.push(("X-Amz-SignedHeaders".into(), signed_headers.clone()));
    if let Some(token) = credentials.session_token() {
        params.push(("X-Amz-Security-Token".into(), token.to_owned()));
    }

    let canonical_query = canonical_query(params);
    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        canonical_uri(url),
        canonical_query,
        canonical_headers,
        signed_headers,
        EMPTY_PAYLOAD_SHA256
    );
    let signature = signature(credentials, scope, &canonical_request);

    let mut presigned = url.clone();
    presigned.set_query(Some(&format!(
        "{}&X-Amz-Signature={}",
        canonical_query, signature
    )));

    presigned
}

/// Signs a request and returns the headers (`x-amz-date`, optionally `x-amz-security-token`,
/// and `authorization`) that have to be added to it. `headers` must contain every other
/// header that should be covered by the signature; `host` is derived from the url.
pub fn sign_request(
    method: &str,
    url: &Url,
    headers: &[(&str, &str)],
    body: &[u8],
    credentials: &Credentials,
    scope: &Scope<'_>,
) -> Vec<(&'static str, String)> {
    let mut added = vec![("x-amz-date", scope.amz_date())];
    if let Some(token) = credentials.session_token() {
        added.push(("x-amz-security-token", token.to_owned()));
    }

    let mut header_entries = vec![(String::from("host"), host_header(url))];
    header_entries.extend(headers.iter().map(|(k, v)| (k.to_lowercase(), v.trim().to_owned())));
    header_entries.extend(added.iter().map(|(k, v)| ((*k).to_owned(), v.clone())));
    header_entries.sort();
    let (canonical_headers, signed_headers) = canonical_headers(&header_entries);

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri(url),
        canonical_query(url.query_pairs().into_owned().collect()),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(body))
    );
    let signature = signature(credentials, scope, &canonical_request);

    added.push((
        "authorization",
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            credentials.access_key_id(),
            scope.credential_scope(),
            signed_headers,
            signature
        ),
    ));

    added
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_owned(),
    }
}

/// Non-S3 services expect every path segment encoded a second time.
fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return String::from("/");
    }

    path.split('/')
        .map(|segment| utf8_percent_encode(segment, URI_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(params: Vec<(String, String)>) -> String {
    let mut encoded: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, URI_ENCODE_SET).to_string(),
                utf8_percent_encode(&v, URI_ENCODE_SET).to_string(),
            )
        })
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Expects `headers` sorted by lowercase name.
fn canonical_headers(headers: &[(String, String)]) -> (String, String) {
    let canonical = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect::<String>();
    let signed = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    (canonical, signed)
}

fn signature(credentials: &Credentials, scope: &Scope<'_>, canonical_request: &str) -> String {
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        scope.amz_date(),
        scope.credential_scope(),
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", credentials.secret_access_key());
    let key = hmac_sha256(secret.as_bytes(), scope.date().as_bytes());
    let key = hmac_sha256(&key, scope.region.as_bytes());
    let key = hmac_sha256(&key, scope.service.as_bytes());
    let key = hmac_sha256(&key, b"aws4_request");

    hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any length"));
    mac.update(data);

    mac.finalize().into_bytes().to_vec()
}
