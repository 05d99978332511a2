use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bpaf::Bpaf;
use itertools::Itertools;
use recipebox_catalog::{NewRecipe, Recipe, RecipeId};
use recipebox_sdk::models::catalog::{CatalogState, QueryStatus};
use recipebox_sdk::models::likes::LikeStore;
use recipebox_sdk::models::view::derive_view;
use serde::Serialize;
use tracing::instrument;

use super::{App, Output};
use crate::config::Config;
use crate::utils::message;

/// Fail with the recorded error message, if there is one.
pub(super) fn ensure_resolved(app: &App, status: &QueryStatus) -> Result<()> {
    if let Some(error) = status.error() {
        app.report_session();
        bail!("{error}");
    }
    Ok(())
}

/// One line per recipe
pub(super) fn recipe_line(recipe: &Recipe, likes: &LikeStore) -> String {
    let heart = if likes.is_liked(recipe.id) { "♥" } else { " " };
    let mut details = Vec::new();
    if !recipe.cuisine.is_empty() {
        details.push(recipe.cuisine.clone());
    }
    if !recipe.difficulty.is_empty() {
        details.push(recipe.difficulty.clone());
    }
    if recipe.total_time_minutes() > 0 {
        details.push(format!("{} min", recipe.total_time_minutes()));
    }
    if recipe.rating > 0.0 {
        details.push(format!("★ {:.1}", recipe.rating));
    }

    if details.is_empty() {
        format!("{heart} {:>4}  {}", recipe.id, recipe.name)
    } else {
        format!(
            "{heart} {:>4}  {} ({})",
            recipe.id,
            recipe.name,
            details.join(", ")
        )
    }
}

fn render_recipes(recipes: &[&Recipe], likes: &LikeStore) -> String {
    if recipes.is_empty() {
        return "No recipes found".to_string();
    }
    recipes
        .iter()
        .map(|recipe| recipe_line(recipe, likes))
        .join("\n")
}

fn page_footer(state: &CatalogState, shown: usize) -> Option<String> {
    if state.limit == 0 || state.total == 0 {
        return None;
    }
    let first = state.skip + 1;
    let last = state.skip + shown as u64;
    let page = state.skip / u64::from(state.limit) + 1;
    let mut footer = format!("Showing {first}-{last} of {} (page {page})", state.total);
    if state.has_next_page() {
        footer.push_str(&format!(", next: --page {}", page + 1));
    }
    Some(footer)
}

#[derive(Debug, Serialize)]
struct PageOutput<'a> {
    recipes: Vec<&'a Recipe>,
    total: u64,
    skip: u64,
    limit: u32,
}

impl<'a> PageOutput<'a> {
    fn new(state: &CatalogState, recipes: Vec<&'a Recipe>) -> Self {
        Self {
            recipes,
            total: state.total,
            skip: state.skip,
            limit: state.limit,
        }
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct List {
    /// Recipes per page, 0 shows all (default: 'page_size' from the config)
    #[bpaf(long, short, argument("n"))]
    pub(super) limit: Option<u32>,

    /// Page to show, starting at 1
    #[bpaf(long, short, argument("n"))]
    pub(super) page: Option<u64>,

    /// Only show recipes in this category
    #[bpaf(long, short, argument("tag"))]
    pub(super) tag: Option<String>,

    /// Only show liked recipes
    #[bpaf(long)]
    pub(super) liked: bool,
}

/// Recipes to skip to reach `page` (starting at 1) of `limit` recipes.
fn page_skip(page: u64, limit: u32) -> Result<u64> {
    if page == 0 {
        bail!("Pages start at 1");
    }
    if limit == 0 && page > 1 {
        bail!("With '--limit 0' all recipes are on page 1");
    }
    (page - 1)
        .checked_mul(u64::from(limit))
        .with_context(|| format!("Page {page} is out of range"))
}

impl List {
    #[instrument(name = "list", skip_all, fields(page = ?self.page))]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        if self.tag.is_some() && (self.page.is_some() || self.limit.is_some()) {
            bail!("'--page' and '--limit' can't be combined with '--tag', a category is listed in full");
        }

        let app = App::new(config)?;
        let limit = self.limit.unwrap_or(app.config.page_size);
        let page = self.page.unwrap_or(1);
        let skip = page_skip(page, limit)?;

        let user = app.require_user()?;
        let likes = app.likes(&user);
        let controller = app.controller()?;

        match &self.tag {
            Some(tag) => {
                controller.set_tag(tag).await;
            },
            None => {
                controller.fetch_all(limit, skip).await;
                let state = controller.snapshot();
                ensure_resolved(&app, &state.status)?;
                if skip > 0 && skip >= state.total {
                    let last = state.total.div_ceil(u64::from(limit)).max(1);
                    bail!("Page {page} is past the last page ({last})");
                }
            },
        }

        let state = controller.snapshot();
        ensure_resolved(&app, &state.status)?;
        let recipes = derive_view(&state.items, &state.selected_tag, &likes, self.liked);

        output.print(&PageOutput::new(&state, recipes.clone()), || {
            let mut rendered = render_recipes(&recipes, &likes);
            if self.tag.is_none() {
                if let Some(footer) = page_footer(&state, state.items.len()) {
                    rendered.push_str("\n\n");
                    rendered.push_str(&footer);
                }
            }
            rendered
        })
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Search {
    /// Only show liked recipes
    #[bpaf(long)]
    pub(super) liked: bool,

    /// Text to search for in recipe names, tags and cuisines
    #[bpaf(positional("query"))]
    query: String,
}

impl Search {
    #[instrument(name = "search", skip_all, fields(query = %self.query))]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let user = app.require_user()?;
        let likes = app.likes(&user);
        let controller = app.controller()?;

        controller.search(&self.query).await;

        let state = controller.snapshot();
        ensure_resolved(&app, &state.status)?;
        let recipes = derive_view(&state.items, "", &likes, self.liked);
        output.print(&PageOutput::new(&state, recipes.clone()), || {
            render_recipes(&recipes, &likes)
        })
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Tags {}

impl Tags {
    #[instrument(name = "tags", skip_all)]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        app.require_user()?;
        let controller = app.controller()?;

        controller.fetch_tags().await;

        let state = controller.snapshot();
        ensure_resolved(&app, &state.tags_status)?;
        output.print(&state.tags, || state.tags.join("\n"))
    }
}

fn render_recipe(recipe: &Recipe, liked: bool) -> String {
    let mut lines = vec![recipe.name.clone()];
    if liked {
        lines[0].push_str(" ♥");
    }
    let facts = [
        ("Cuisine", recipe.cuisine.clone()),
        ("Difficulty", recipe.difficulty.clone()),
        ("Prep time", format!("{} min", recipe.prep_time_minutes)),
        ("Cook time", format!("{} min", recipe.cook_time_minutes)),
        ("Servings", recipe.servings.to_string()),
        ("Calories", format!("{} per serving", recipe.calories_per_serving)),
        (
            "Rating",
            format!("{:.1} ({} reviews)", recipe.rating, recipe.review_count),
        ),
        ("Tags", recipe.tags.join(", ")),
        ("Meal", recipe.meal_type.join(", ")),
    ];
    lines.extend(
        facts
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(label, value)| format!("{label}: {value}")),
    );

    if !recipe.ingredients.is_empty() {
        lines.push(String::new());
        lines.push("Ingredients:".to_string());
        lines.extend(recipe.ingredients.iter().map(|item| format!("  - {item}")));
    }
    if !recipe.instructions.is_empty() {
        lines.push(String::new());
        lines.push("Instructions:".to_string());
        lines.extend(
            recipe
                .instructions
                .iter()
                .enumerate()
                .map(|(n, step)| format!("  {}. {step}", n + 1)),
        );
    }
    lines.join("\n")
}

#[derive(Debug, Bpaf, Clone)]
pub struct Show {
    /// Id of the recipe
    #[bpaf(positional("id"))]
    pub(super) id: RecipeId,
}

impl Show {
    #[instrument(name = "show", skip_all, fields(id = self.id))]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let app = App::new(config)?;
        let user = app.require_user()?;
        let likes = app.likes(&user);
        let controller = app.controller()?;

        controller.fetch_item(self.id).await;

        let state = controller.snapshot();
        ensure_resolved(&app, &state.detail_status)?;
        let Some(recipe) = state.current_item else {
            bail!("Recipe {} not found", self.id);
        };
        output.print(&recipe, || render_recipe(&recipe, likes.is_liked(recipe.id)))
    }
}

#[derive(Debug, Bpaf, Clone)]
pub struct Add {
    /// JSON file describing the recipe
    #[bpaf(long, short, argument("path"))]
    file: PathBuf,
}

impl Add {
    #[instrument(name = "add", skip_all)]
    pub async fn handle(self, config: Config, output: Output) -> Result<()> {
        let contents = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Could not read {}", self.file.display()))?;
        let new_recipe: NewRecipe = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a valid recipe", self.file.display()))?;
        if new_recipe.name.trim().is_empty() {
            bail!("A recipe needs a name");
        }

        let app = App::new(config)?;
        app.require_user()?;
        let controller = app.controller()?;

        let echo = match controller.add_item(&new_recipe).await {
            Ok(echo) => echo,
            Err(err) => {
                ensure_resolved(&app, &controller.snapshot().add_status)?;
                return Err(err).context("Failed to add recipe");
            },
        };

        if !output.json {
            message::created(format!("Added '{}' with id {}", echo.name, echo.id));
            return Ok(());
        }
        output.print(&echo, String::new)
    }
}
