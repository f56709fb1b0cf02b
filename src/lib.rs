pub mod audit;
pub mod auth;
pub mod config;
pub mod http;
pub mod state;
pub mod version;
