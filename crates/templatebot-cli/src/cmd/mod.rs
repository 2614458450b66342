pub mod config;
pub mod resolve;
pub mod serial;
pub mod serve;
pub mod source;
pub mod templates;
