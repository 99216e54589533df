//! HTTP surface: routing, extractors, and wire types

pub mod health;
pub mod middleware;
pub mod router;
pub mod state;
pub mod types;
pub mod v2;

pub use router::create_router;
pub use state::AppState;
