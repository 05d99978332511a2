//! Access to the remote recipe catalog.
//!
//! [ClientTrait] describes the catalog endpoints. [CatalogClient] talks to the
//! catalog over HTTP, [MockClient] replays canned responses for tests and
//! offline use.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use recipebox_catalog::{
    NewRecipe,
    Recipe,
    RecipeId,
    RecipePage,
    RequestOptions,
    SessionHandle,
    StatusCode,
    Transport,
    TransportConfig,
    TransportError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("mock client has no response left for {0:?}")]
    MockExhausted(MockRequest),
    #[error("mock client expected a {expected} response, found {found:?}")]
    UnexpectedMockResponse {
        expected: &'static str,
        found: Box<Response>,
    },
}

impl CatalogError {
    /// The message reported by the catalog, if any.
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            CatalogError::Transport(err) => err.upstream_message(),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, CatalogError::Transport(err) if err.is_session_expired())
    }
}

#[derive(Debug, Error)]
pub enum MockDataError {
    /// Failed to read the file with mock responses
    #[error("failed to read mock response file")]
    ReadMockFile(#[source] std::io::Error),
    /// Failed to parse the contents of the mock data file as JSON
    #[error("failed to parse mock data as JSON")]
    ParseJson(#[source] serde_json::Error),
}

/// The catalog endpoints.
pub trait ClientTrait: Send + Sync {
    /// A page of all recipes. A `limit` of 0 asks for everything.
    fn list(
        &self,
        limit: u32,
        skip: u64,
    ) -> impl Future<Output = Result<RecipePage, CatalogError>> + Send;

    /// Full text search.
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<RecipePage, CatalogError>> + Send;

    /// Recipes carrying `tag`.
    fn by_tag(&self, tag: &str)
    -> impl Future<Output = Result<RecipePage, CatalogError>> + Send;

    fn get(&self, id: RecipeId) -> impl Future<Output = Result<Recipe, CatalogError>> + Send;

    /// All category labels.
    fn tags(&self) -> impl Future<Output = Result<Vec<String>, CatalogError>> + Send;

    /// Submit a new recipe. The catalog echoes it back with an id but does
    /// not store it.
    fn add(
        &self,
        recipe: &NewRecipe,
    ) -> impl Future<Output = Result<Recipe, CatalogError>> + Send;
}

/// Either a client for the actual catalog,
/// or a mock client for testing.
#[derive(Debug)]
pub enum Client {
    Catalog(CatalogClient),
    Mock(MockClient),
}

impl ClientTrait for Client {
    async fn list(&self, limit: u32, skip: u64) -> Result<RecipePage, CatalogError> {
        match self {
            Client::Catalog(client) => client.list(limit, skip).await,
            Client::Mock(client) => client.list(limit, skip).await,
        }
    }

    async fn search(&self, query: &str) -> Result<RecipePage, CatalogError> {
        match self {
            Client::Catalog(client) => client.search(query).await,
            Client::Mock(client) => client.search(query).await,
        }
    }

    async fn by_tag(&self, tag: &str) -> Result<RecipePage, CatalogError> {
        match self {
            Client::Catalog(client) => client.by_tag(tag).await,
            Client::Mock(client) => client.by_tag(tag).await,
        }
    }

    async fn get(&self, id: RecipeId) -> Result<Recipe, CatalogError> {
        match self {
            Client::Catalog(client) => client.get(id).await,
            Client::Mock(client) => client.get(id).await,
        }
    }

    async fn tags(&self) -> Result<Vec<String>, CatalogError> {
        match self {
            Client::Catalog(client) => client.tags().await,
            Client::Mock(client) => client.tags().await,
        }
    }

    async fn add(&self, recipe: &NewRecipe) -> Result<Recipe, CatalogError> {
        match self {
            Client::Catalog(client) => client.add(recipe).await,
            Client::Mock(client) => client.add(recipe).await,
        }
    }
}

/// A client for the catalog service.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    transport: Transport,
}

impl CatalogClient {
    pub fn new(
        config: TransportConfig,
        session: Option<Arc<dyn SessionHandle>>,
    ) -> Result<Self, TransportError> {
        let transport = Transport::new(config)?;
        let transport = match session {
            Some(session) => transport.with_session(session),
            None => transport,
        };
        Ok(Self { transport })
    }

    pub fn from_transport(transport: Transport) -> Self {
        Self { transport }
    }
}

/// Path of the tag endpoint, with `tag` kept as a single path segment.
fn tag_path(tag: &str) -> String {
    format!("tag/{}", url_escape::encode_component(tag))
}

impl ClientTrait for CatalogClient {
    #[instrument(skip(self))]
    async fn list(&self, limit: u32, skip: u64) -> Result<RecipePage, CatalogError> {
        let options = RequestOptions::default()
            .with_query("limit", limit)
            .with_query("skip", skip);
        let page: RecipePage = self.transport.get("", options).await?;
        debug!(total = page.total, received = page.recipes.len(), "listed recipes");
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<RecipePage, CatalogError> {
        let options = RequestOptions::default().with_query("q", query);
        let page: RecipePage = self.transport.get("search", options).await?;
        debug!(total = page.total, "searched recipes");
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn by_tag(&self, tag: &str) -> Result<RecipePage, CatalogError> {
        let page: RecipePage = self
            .transport
            .get(&tag_path(tag), RequestOptions::default())
            .await?;
        debug!(total = page.total, "listed recipes by tag");
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: RecipeId) -> Result<Recipe, CatalogError> {
        Ok(self
            .transport
            .get(&id.to_string(), RequestOptions::default())
            .await?)
    }

    #[instrument(skip(self))]
    async fn tags(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.transport.get("tags", RequestOptions::default()).await?)
    }

    #[instrument(skip_all, fields(name = %recipe.name))]
    async fn add(&self, recipe: &NewRecipe) -> Result<Recipe, CatalogError> {
        let echo: Recipe = self
            .transport
            .post("add", recipe, RequestOptions::default())
            .await?;
        debug!(id = echo.id, "catalog accepted recipe");
        Ok(echo)
    }
}

/// A canned catalog response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Page(RecipePage),
    Recipe(Recipe),
    Tags(Vec<String>),
    Error { status: u16, message: Option<String> },
}

/// A request received by a [MockClient].
#[derive(Debug, Clone, PartialEq)]
pub enum MockRequest {
    List { limit: u32, skip: u64 },
    Search(String),
    ByTag(String),
    Get(RecipeId),
    Tags,
    Add(NewRecipe),
}

/// A response and how long to wait before handing it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockResponse {
    #[serde(flatten)]
    pub response: Response,
    #[serde(default, with = "millis")]
    pub delay: Duration,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(delay.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Reads a list of mock responses from disk.
fn read_mock_responses(path: impl AsRef<Path>) -> Result<VecDeque<MockResponse>, MockDataError> {
    let contents = std::fs::read_to_string(path).map_err(MockDataError::ReadMockFile)?;
    let deserialized: Vec<MockResponse> =
        serde_json::from_str(&contents).map_err(MockDataError::ParseJson)?;
    Ok(deserialized.into())
}

/// A catalog client that can be seeded with mock responses.
///
/// Responses are handed out in the order they were pushed, regardless of
/// which endpoint is called. Clones share the same queue.
#[derive(Debug, Default, Clone)]
pub struct MockClient {
    pub mock_responses: Arc<Mutex<VecDeque<MockResponse>>>,
    pub received: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockClient {
    /// Create a new mock client, potentially reading mock responses from disk
    pub fn new(mock_data_path: Option<impl AsRef<Path>>) -> Result<Self, MockDataError> {
        let mock_responses = match mock_data_path {
            Some(path) => read_mock_responses(path)?,
            None => VecDeque::new(),
        };
        Ok(Self {
            mock_responses: Arc::new(Mutex::new(mock_responses)),
            received: Default::default(),
        })
    }

    /// Push a response that is handed out after `delay`.
    pub fn push_delayed(&self, response: Response, delay: Duration) {
        self.mock_responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(MockResponse { response, delay });
    }

    pub fn push_page_response(&self, page: RecipePage) {
        self.push_delayed(Response::Page(page), Duration::ZERO);
    }

    pub fn push_recipe_response(&self, recipe: Recipe) {
        self.push_delayed(Response::Recipe(recipe), Duration::ZERO);
    }

    pub fn push_tags_response(&self, tags: Vec<String>) {
        self.push_delayed(Response::Tags(tags), Duration::ZERO);
    }

    /// Push an API error into the list of mock responses
    pub fn push_error_response(&self, status: u16, message: Option<&str>) {
        self.push_delayed(
            Response::Error {
                status,
                message: message.map(ToString::to_string),
            },
            Duration::ZERO,
        );
    }

    /// Requests received so far, oldest first.
    pub fn received(&self) -> Vec<MockRequest> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Record `request` and take the next response.
    ///
    /// The locks are released before the caller awaits the delay.
    fn next_response(&self, request: MockRequest) -> Result<MockResponse, CatalogError> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        self.mock_responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or(CatalogError::MockExhausted(request))
    }

    async fn respond(&self, request: MockRequest) -> Result<Response, CatalogError> {
        let MockResponse { response, delay } = self.next_response(request)?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match response {
            Response::Error { status, message } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let err = if status == StatusCode::UNAUTHORIZED {
                    TransportError::SessionExpired
                } else {
                    TransportError::Status { status, message }
                };
                Err(err.into())
            },
            response => Ok(response),
        }
    }

    async fn respond_page(&self, request: MockRequest) -> Result<RecipePage, CatalogError> {
        match self.respond(request).await? {
            Response::Page(page) => Ok(page),
            found => Err(CatalogError::UnexpectedMockResponse {
                expected: "page",
                found: Box::new(found),
            }),
        }
    }

    async fn respond_recipe(&self, request: MockRequest) -> Result<Recipe, CatalogError> {
        match self.respond(request).await? {
            Response::Recipe(recipe) => Ok(recipe),
            found => Err(CatalogError::UnexpectedMockResponse {
                expected: "recipe",
                found: Box::new(found),
            }),
        }
    }
}

impl ClientTrait for MockClient {
    async fn list(&self, limit: u32, skip: u64) -> Result<RecipePage, CatalogError> {
        self.respond_page(MockRequest::List { limit, skip }).await
    }

    async fn search(&self, query: &str) -> Result<RecipePage, CatalogError> {
        self.respond_page(MockRequest::Search(query.to_string()))
            .await
    }

    async fn by_tag(&self, tag: &str) -> Result<RecipePage, CatalogError> {
        self.respond_page(MockRequest::ByTag(tag.to_string())).await
    }

    async fn get(&self, id: RecipeId) -> Result<Recipe, CatalogError> {
        self.respond_recipe(MockRequest::Get(id)).await
    }

    async fn tags(&self) -> Result<Vec<String>, CatalogError> {
        match self.respond(MockRequest::Tags).await? {
            Response::Tags(tags) => Ok(tags),
            found => Err(CatalogError::UnexpectedMockResponse {
                expected: "tags",
                found: Box::new(found),
            }),
        }
    }

    async fn add(&self, recipe: &NewRecipe) -> Result<Recipe, CatalogError> {
        self.respond_recipe(MockRequest::Add(recipe.clone())).await
    }
}
