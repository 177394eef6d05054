//! Image generation job service
//!
//! Accepts natural-language prompts, turns each into an asynchronous
//! generation job against a remote image model, and exposes the job
//! lifecycle (pending, completed, failed) to any number of polling clients.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
