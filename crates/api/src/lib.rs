//! HTTP surface of the knowledge service: webhook intake, hybrid query
//! endpoints, graph browsing, and the dependency registry behind them.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod signature;
pub mod state;
pub mod types;

pub use server::{build_router, GraphragServer};
pub use state::AppState;
