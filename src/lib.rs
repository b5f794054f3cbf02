pub mod client;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod extent;
pub mod humanize;
pub mod observability;

pub use error::{PrintError, Result};
