//! Restaurant data crawler
//!
//! Renders listing, detail and review pages, applies declarative CSS
//! selector schemas to them and normalizes the results into typed
//! [`models::Restaurant`] records.

pub mod config;
pub mod discord;
pub mod error;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod renderer;
pub mod restaurant_finder;
pub mod schema;
pub mod sites;
pub mod traits;
