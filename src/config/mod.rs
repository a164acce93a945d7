//! Tree configuration: table naming, ordering, and traversal limits.

pub mod schema;

pub use schema::TreeConfig;
