pub mod auth;
pub mod booking;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod reminder;
pub mod routes;
pub mod store;
