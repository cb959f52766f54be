pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod git;
pub mod manifest;
pub mod output;
pub mod store;
