pub mod index;
pub mod interactions;
pub mod templates;
