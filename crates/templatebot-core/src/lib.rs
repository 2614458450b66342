pub mod author;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event;
pub mod git;
pub mod identity;
pub mod io;
pub mod paths;
pub mod render;
pub mod repo_cache;
pub mod serial;
pub mod service;
pub mod variables;
pub mod workflow;

pub use error::{ErrorCategory, Result, TemplatebotError};
