use std::sync::Arc;

use anyhow::{Context, bail};
use recipebox_catalog::SessionHandle;
use recipebox_sdk::providers::catalog::{CatalogClient, Client, MockClient};
use recipebox_sdk::storage::traceable_path;
use tracing::debug;

use crate::config::Config;

/// Initialize the catalog client
///
/// - Initialize a mock client if `catalog_mock` points to a file of canned responses
/// - Initialize a real client otherwise
pub fn init_catalog_client(
    config: &Config,
    session: Arc<dyn SessionHandle>,
) -> Result<Client, anyhow::Error> {
    if let Some(path) = &config.catalog_mock {
        if !path.exists() {
            bail!("path to mock data file doesn't exist: {}", path.display());
        }

        debug!(
            mock_data_path = traceable_path(path),
            "using mock catalog client"
        );
        return Ok(Client::Mock(MockClient::new(Some(path))?));
    }

    debug!("using catalog client with url: {}", config.catalog_url);
    let client = CatalogClient::new(config.transport_config(), Some(session))
        .context("Could not create catalog client")?;
    Ok(Client::Catalog(client))
}
