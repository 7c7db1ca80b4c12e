//! reqwest-backed request producer

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::debug;
use reqwest::Client;
use std::io;
use tokio_util::io::StreamReader;
use userstream_ports::{
    Identity, RequestProducer, StreamBody, StreamRequest, TransportError, TransportResult,
};

pub const DEFAULT_ENDPOINT: &str = "https://userstream.twitter.com/1.1/user.json";

/// Opens user streams over HTTP GET with a bearer credential
#[derive(Clone)]
pub struct HttpRequestProducer {
    client: Client,
    endpoint: String,
}

impl HttpRequestProducer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        HttpRequestProducer {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for HttpRequestProducer {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl RequestProducer for HttpRequestProducer {
    async fn open_stream(
        &self,
        identity: &Identity,
        request: &StreamRequest,
    ) -> TransportResult<StreamBody> {
        debug!("GET {} for {}", self.endpoint, identity);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&request.query_pairs())
            .bearer_auth(identity.credential.expose())
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::http(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        // Dropping the reader drops the response, which aborts the request
        let bytes = response.bytes_stream().map_err(io::Error::other);
        Ok(StreamBody::new(StreamReader::new(bytes)))
    }
}
