use std::{error::Error, fmt};

use anyhow::anyhow;
use hyper::{
    client::HttpConnector,
    http::{header::CONTENT_TYPE, StatusCode},
    Body, Client, Method, Request,
};
use log::trace;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::{timeout, Duration};
use url::Url;

use keyquorum_core::{anyhow, hyper, log, serde, serde_json, tokio, url};

/// `base` followed by `segments`, each percent-encoded as exactly one path segment
pub fn endpoint_url(base: &str, segments: &[&str]) -> anyhow::Result<Url> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("{} cannot be a base url", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Failure of a single outbound call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Unreachable(String),
    Status(u16, String),
    InvalidResponse(String),
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status(code, _) => StatusCode::from_u16(*code).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::Unreachable(reason) => write!(f, "unreachable: {}", reason),
            TransportError::Status(code, body) => write!(f, "status {}: {}", code, body),
            TransportError::InvalidResponse(reason) => write!(f, "invalid response: {}", reason),
        }
    }
}

impl Error for TransportError {}

/// JSON over HTTP with one bounded attempt per call
#[derive(Clone)]
pub struct JsonClient {
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl JsonClient {
    pub fn new(timeout: Duration) -> Self {
        JsonClient {
            client: Client::new(),
            timeout,
        }
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let json_bytes =
            serde_json::to_vec(body).map_err(|err| TransportError::Unreachable(err.to_string()))?;
        self.send(Method::POST, url, Body::from(json_bytes)).await
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        self.send(Method::GET, url, Body::empty()).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Body,
    ) -> Result<T, TransportError> {
        let req = Request::builder()
            .method(method.clone())
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;

        let (status, bytes) = timeout(self.timeout, async {
            let res = self.client.request(req).await?;
            let status = res.status();
            let bytes = hyper::body::to_bytes(res.into_body()).await?;
            Ok::<_, hyper::Error>((status, bytes))
        })
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|err| TransportError::Unreachable(err.to_string()))?;
        trace!("{} {} {}", method, url, status);

        if !status.is_success() {
            return Err(TransportError::Status(
                status.as_u16(),
                String::from_utf8_lossy(&bytes).to_string(),
            ));
        }
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(bytes).map_err(|err| TransportError::InvalidResponse(err.to_string()))
    }
}
