//! Catalog wire types.
//!
//! The catalog speaks camelCase JSON. Every display attribute is optional on
//! the wire: the echo of an added recipe only carries what was submitted, so
//! missing fields decode to their defaults.

use serde::{Deserialize, Serialize};

/// Identifier assigned by the upstream catalog.
pub type RecipeId = u64;

/// A single catalog item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub prep_time_minutes: u32,
    pub cook_time_minutes: u32,
    pub servings: u32,
    pub difficulty: String,
    pub cuisine: String,
    pub calories_per_serving: u32,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    pub image: String,
    /// 0 to 5
    pub rating: f64,
    pub review_count: u32,
    pub meal_type: Vec<String>,
}

impl Recipe {
    /// Whether any of the recipe's tags equals `tag`, ignoring case.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == tag)
    }

    /// Whether the cuisine equals `cuisine`, ignoring case.
    pub fn has_cuisine(&self, cuisine: &str) -> bool {
        self.cuisine.to_lowercase() == cuisine.to_lowercase()
    }

    /// Total time in the kitchen.
    pub fn total_time_minutes(&self) -> u32 {
        self.prep_time_minutes + self.cook_time_minutes
    }
}

/// One page of results as returned by the list, search and tag endpoints.
///
/// `total` is the number of recipes matching the query on the server, not the
/// number of recipes in this page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipePage {
    pub recipes: Vec<Recipe>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}

/// Payload for the add endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewRecipe {
    pub name: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_time_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cook_time_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_per_serving: Option<u32>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub meal_type: Vec<String>,
}
