pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod flash;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
