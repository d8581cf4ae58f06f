//! Remote catalog client.
//!
//! [`CatalogClient`] is the seam the merge service consumes. The concrete
//! [`HttpCatalogClient`] builds validated requests and interprets responses;
//! the socket-level transport behind it is an injected collaborator. Every
//! call is a single attempt, no retries.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::model::{RawDetail, RawItem};

/// Failure of a single remote fetch attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request URL")]
    InvalidRequest,

    #[error("error response with code {status}: {message}")]
    InvalidResponse { status: u16, message: String },

    #[error("parsing response error: {message}")]
    Parsing { message: String },

    #[error("unknown transport error")]
    Unknown,
}

/// Fetches pages of raw items and raw detail for single items.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Vec<RawItem>, TransportError>;

    async fn fetch_detail(&self, id: &str) -> Result<RawDetail, TransportError>;
}

/// A GET request ready for the transport to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    url: Url,
}

impl HttpRequest {
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// The transport's view of a completed exchange: status and body, nothing
/// interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The socket-level collaborator. Implementations map their own failures
/// (DNS, connect, timeout) onto [`TransportError`] as they see fit.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Error body the catalog API attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorDescription {
    #[serde(default)]
    errors: Option<Vec<String>>,
}

/// Catalog client over an injected HTTP transport.
///
/// Endpoints: `GET {base}/photos?page={n}&per_page={size}` for a listing
/// page and `GET {base}/photos/{id}` for detail.
pub struct HttpCatalogClient<T> {
    transport: T,
    base_url: Url,
}

impl<T: HttpTransport> HttpCatalogClient<T> {
    pub fn new(transport: T, base_url: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url).map_err(|_| TransportError::InvalidRequest)?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidRequest);
        }
        Ok(Self {
            transport,
            base_url,
        })
    }

    fn page_request(&self, page: u32, size: u32) -> Result<HttpRequest, TransportError> {
        if page == 0 || size == 0 {
            return Err(TransportError::InvalidRequest);
        }
        let mut url = self
            .base_url
            .join("photos")
            .map_err(|_| TransportError::InvalidRequest)?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &size.to_string());
        Ok(HttpRequest { url })
    }

    fn detail_request(&self, id: &str) -> Result<HttpRequest, TransportError> {
        if id.is_empty() {
            return Err(TransportError::InvalidRequest);
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidRequest)?
            .pop_if_empty()
            .push("photos")
            .push(id);
        Ok(HttpRequest { url })
    }

    /// Interprets a completed exchange.
    ///
    /// Non-2xx bodies are probed for the API's `{ "errors": [..] }` shape;
    /// when it parses, the joined entries become the message. A body that
    /// does not even parse as that shape yields [`TransportError::Unknown`].
    fn decode<D: DeserializeOwned>(response: &HttpResponse) -> Result<D, TransportError> {
        if !response.is_success() {
            return match serde_json::from_slice::<ErrorDescription>(response.body()) {
                Ok(description) => Err(TransportError::InvalidResponse {
                    status: response.status(),
                    message: description
                        .errors
                        .map(|errors| errors.join(", "))
                        .unwrap_or_default(),
                }),
                Err(_) => Err(TransportError::Unknown),
            };
        }

        serde_json::from_slice(response.body()).map_err(|e| TransportError::Parsing {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl<T: HttpTransport> CatalogClient for HttpCatalogClient<T> {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Vec<RawItem>, TransportError> {
        let request = self.page_request(page, size)?;
        debug!(page, size, url = %request.url(), "fetching listing page");
        let response = self.transport.execute(request).await?;
        Self::decode(&response)
    }

    async fn fetch_detail(&self, id: &str) -> Result<RawDetail, TransportError> {
        let request = self.detail_request(id)?;
        debug!(id, url = %request.url(), "fetching item detail");
        let response = self.transport.execute(request).await?;
        Self::decode(&response)
    }
}
