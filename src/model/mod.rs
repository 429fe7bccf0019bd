pub mod common;
pub mod content_model;
pub mod criteria;
pub mod entry;
pub mod projection;
pub mod query;
pub mod schema;

pub use common::*;
pub use content_model::*;
pub use criteria::*;
pub use entry::*;
pub use projection::*;
pub use query::*;
pub use schema::*;
