pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod persist;
pub mod store;
pub mod tmdb;
