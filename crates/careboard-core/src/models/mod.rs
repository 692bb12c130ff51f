//! Domain models for the careboard system.

mod document;
mod drug;
mod geocode;
mod identity;
mod patient;
mod query;

pub use document::*;
pub use drug::*;
pub use geocode::*;
pub use identity::*;
pub use patient::*;
pub use query::*;
