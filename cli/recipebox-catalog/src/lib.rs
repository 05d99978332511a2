//! Shared HTTP transport for the recipe catalog API.
//!
//! This crate provides:
//! - HTTP client construction with per-request bearer credential injection
//! - Unauthorized-session recovery (401 handling) via [`SessionHandle`]
//! - Common error translation for catalog requests
//! - The catalog wire types ([`Recipe`], [`RecipePage`], [`NewRecipe`])
//!
//! ## Usage
//!
//! ```ignore
//! use recipebox_catalog::{RequestOptions, Transport, TransportConfig};
//!
//! let config = TransportConfig {
//!     base_url: "https://dummyjson.com/recipes".to_string(),
//!     ..Default::default()
//! };
//!
//! let transport = Transport::new(config)?.with_session(session);
//! let tags: Vec<String> = transport.get("tags", RequestOptions::default()).await?;
//! ```

mod client;
mod config;
mod error;
pub mod types;

pub use client::{RequestOptions, SessionHandle, Transport};
pub use config::{DEFAULT_CATALOG_URL, TransportConfig};
pub use error::TransportError;
pub use reqwest::{Method, StatusCode};
pub use types::{NewRecipe, Recipe, RecipeId, RecipePage};
