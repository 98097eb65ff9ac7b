//! HTTP API handlers for diet-api

pub mod health;
pub mod recipes;

pub use health::health_routes;
pub use recipes::recipe_routes;
