use anyhow::{Context, Result};
use bpaf::Bpaf;
use futures::future::join_all;
use recipebox_catalog::{Recipe, RecipeId};
use recipebox_sdk::providers::catalog::ClientTrait;
use tracing::{instrument, warn};

use super::browse::{ensure_resolved, recipe_line};
use super::{App, Output};
use crate::config::Config;
use crate::utils::message;

#[derive(Debug, Bpaf, Clone)]
pub struct Like {
    /// Id of the recipe
    #[bpaf(positional("id"))]
    pub(super) id: RecipeId,
}

impl Like {
    #[instrument(name = "like", skip_all, fields(id = self.id))]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let user = app.require_user()?;
        let likes = app.likes(&user);

        // Make sure the recipe exists before remembering it
        let controller = app.controller()?;
        controller.fetch_item(self.id).await;
        let state = controller.snapshot();
        ensure_resolved(&app, &state.detail_status)?;
        let name = state
            .current_item
            .map(|recipe| recipe.name)
            .unwrap_or_else(|| format!("recipe {}", self.id));

        let liked = likes
            .toggle(self.id)
            .context("Could not save your likes")?;

        if output.json {
            let value = serde_json::json!({ "id": self.id, "liked": liked });
            return output.print(&value, String::new);
        }
        if liked {
            message::updated(format!("Liked '{name}'"));
        } else {
            message::deleted(format!("Unliked '{name}'"));
        }
        Ok(())
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Liked {}

impl Liked {
    #[instrument(name = "liked", skip_all)]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let user = app.require_user()?;
        let likes = app.likes(&user);
        if likes.is_empty() {
            return output.print(&Vec::<Recipe>::new(), || {
                "You haven't liked any recipes yet".to_string()
            });
        }

        let controller = app.controller()?;
        let client = controller.client();
        let ids = likes.ids();
        let results = join_all(ids.iter().map(|id| client.get(*id))).await;

        let mut recipes = Vec::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(recipe) => recipes.push(recipe),
                Err(err) if err.is_session_expired() => {
                    app.report_session();
                    return Err(err).context("Could not load your liked recipes");
                },
                Err(err) => {
                    warn!(id, error = %err, "couldn't load liked recipe");
                    message::warning(format!("Could not load recipe {id}"));
                },
            }
        }

        output.print(&recipes, || {
            recipes
                .iter()
                .map(|recipe| recipe_line(recipe, &likes))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}
