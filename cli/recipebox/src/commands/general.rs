use anyhow::Result;
use bpaf::Bpaf;
use tracing::instrument;

use super::Output;
use crate::config::Config;

#[derive(Debug, Bpaf, Clone)]
pub struct ConfigArgs {}

impl ConfigArgs {
    /// Show the effective configuration
    #[instrument(name = "config", skip_all)]
    pub fn handle(self, config: Config, output: Output) -> Result<()> {
        let rendered = config.to_toml()?;
        output.print(&config, || rendered.trim_end().to_string())
    }
}
