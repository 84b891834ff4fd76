pub mod auth;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod kintone;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod state;
pub mod utils;
