pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod schema;
pub mod state;
pub mod status;
pub mod workers;

pub use workers::{default_handlers, Worker};
