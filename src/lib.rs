pub mod auth;
pub mod config;
pub mod error;
pub mod meetings;
pub mod notify;
pub mod store;
pub mod web;
