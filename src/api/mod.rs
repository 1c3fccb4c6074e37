pub mod auth;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{create_router, ApiServer, AppState};
