//! Quillboard - An authenticated dashboard for generating articles
//!
//! Users keep a list of article titles and generate each article's body
//! through an LLM provider chain. Administrators manage the provider keys.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod views;
