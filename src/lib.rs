#![forbid(unsafe_code)]

pub mod auth;
pub mod browser;
pub mod capture;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod formats;
pub mod image_store;
pub mod logging;
pub mod output;
pub mod pdf;
pub mod prompt;
pub mod run;
pub mod viewer;
