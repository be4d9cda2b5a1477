//! Structural validator that turns loosely-typed input (maps, strings,
//! numbers) into strictly-typed request trees with defaults filled in
//! (§4.2).

pub mod coercion;
pub mod error;
pub mod schema;

pub use error::SchemaError;
pub use schema::{optional, optional_no_default, required, parse, parse_enum, parse_node_type, SchemaNode};

#[cfg(test)]
mod tests;
