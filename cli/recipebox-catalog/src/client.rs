//! HTTP transport for the catalog API.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use reqwest::header::{self, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::TransportConfig;
use crate::error::{TransportError, parse_error_message};

/// The transport's view of the signed-in session.
///
/// The session layer implements this so the transport can attach the current
/// credential and report a credential the server refused.
pub trait SessionHandle: Send + Sync {
    /// The credential to send as `Authorization: Bearer <credential>`.
    ///
    /// Returns `None` when there is no valid session.
    fn bearer_token(&self) -> Option<String>;

    /// Called after the server answered with 401.
    ///
    /// Implementations clear the persisted session and tell whoever is
    /// listening that the user has to log in again.
    fn invalidate(&self);
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters, appended in order.
    pub query: Vec<(String, String)>,
    /// Headers for this request only.
    pub headers: BTreeMap<String, String>,
}

impl RequestOptions {
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// A request/response pipeline against the catalog API.
///
/// Every call runs through the same three stages:
/// - attach the bearer credential (if the session has a valid one)
/// - send
/// - translate the response, invalidating the session on 401
///
/// Apart from the immutable HTTP client and the session handle the transport
/// holds no state.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    session: Option<Arc<dyn SessionHandle>>,
}

impl Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a new transport from configuration.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|source| TransportError::InvalidBaseUrl {
                url: config.base_url.clone(),
                source,
            })?;
        let http = build_http_client(&config)?;

        Ok(Self {
            http,
            base_url,
            session: None,
        })
    }

    /// Attach the session whose credential is sent with every request.
    pub fn with_session(mut self, session: Arc<dyn SessionHandle>) -> Self {
        self.session = Some(session);
        self
    }

    /// Get the configured base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve `path` relative to the base URL.
    ///
    /// An empty path addresses the base URL itself.
    fn endpoint(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        let mut url = self.base_url.clone();
        if path.is_empty() {
            return url;
        }
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    /// Send a request and decode the JSON response body.
    #[instrument(skip(self, method, body, options), fields(method = %method))]
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path);
        let mut request = self.http.request(method.clone(), url.clone());

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }

        for (key, value) in &options.headers {
            request = request.header(
                header::HeaderName::from_str(key)
                    .map_err(|e| TransportError::InvalidHeader(e.to_string()))?,
                header::HeaderValue::from_str(value)
                    .map_err(|e| TransportError::InvalidHeader(e.to_string()))?,
            );
        }

        let token = self.session.as_ref().and_then(|session| session.bearer_token());
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }

        if let Some(body) = body {
            let body = serde_json::to_vec(body).map_err(TransportError::Encode)?;
            request = request.body(body);
        }

        debug!(%url, has_credential = token.is_some(), "sending catalog request");

        let response = request.send().await.map_err(TransportError::Network)?;
        let status = response.status();
        let text = response.text().await.map_err(TransportError::Network)?;

        if status == StatusCode::UNAUTHORIZED {
            warn!(%url, "catalog rejected credential, invalidating session");
            if let Some(session) = &self.session {
                session.invalidate();
            }
            return Err(TransportError::SessionExpired);
        }

        if !status.is_success() {
            let message = parse_error_message(&text);
            debug!(%status, ?message, "catalog request failed");
            return Err(TransportError::Status { status, message });
        }

        serde_json::from_str(&text).map_err(TransportError::Decode)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, TransportError> {
        self.request::<T, ()>(Method::GET, path, None, options).await
    }

    pub async fn post<T, B>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.request(Method::POST, path, Some(body), options).await
    }

    pub async fn put<T, B>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.request(Method::PUT, path, Some(body), options).await
    }

    pub async fn patch<T, B>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.request(Method::PATCH, path, Some(body), options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, TransportError> {
        self.request::<T, ()>(Method::DELETE, path, None, options)
            .await
    }
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

/// Build the HTTP client shared by all requests.
///
/// The credential is not a default header: it changes over the lifetime of
/// the client and is attached per request instead.
fn build_http_client(config: &TransportConfig) -> Result<reqwest::Client, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(
                |e: reqwest::header::InvalidHeaderName| TransportError::InvalidHeader(e.to_string()),
            )?,
            header::HeaderValue::from_str(value).map_err(
                |e: reqwest::header::InvalidHeaderValue| {
                    TransportError::InvalidHeader(e.to_string())
                },
            )?,
        );
    }

    debug!(
        base_url = %config.base_url,
        extra_headers = config.extra_headers.len(),
        "building catalog HTTP client"
    );

    let client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(std::time::Duration::from_secs(15))
        .timeout(config.request_timeout);

    let client_builder = if let Some(ref user_agent) = config.user_agent {
        client_builder.user_agent(user_agent)
    } else {
        client_builder.user_agent(concat!("recipebox/", env!("CARGO_PKG_VERSION")))
    };

    client_builder.build().map_err(TransportError::Build)
}
