//! Database layer: connection setup, tree table DDL, row conversion.

pub mod converters;
pub mod schema;
