//! Client data synchronization for the recipe catalog.
//!
//! - [models::session]: the locally issued session credential
//! - [models::likes]: the persisted set of liked recipes
//! - [models::catalog]: fetch, search, filter and pagination state
//! - [models::view]: what to show for the current filters
//! - [providers::catalog]: the catalog endpoints, over HTTP or mocked

pub mod models;
pub mod providers;
pub mod storage;

pub use recipebox_catalog as catalog;
