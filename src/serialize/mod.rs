//! JSON serialisation and schema introspection
//!
//! Wire form:
//! - nested instances are JSON objects
//! - sequences, sets and tuples are arrays
//! - datetimes and dates are ISO-8601 strings
//! - bytes are `base64:<urlsafe>` unless a field encoder overrides it

mod decode;
mod encode;
mod introspect;

pub use decode::{decode_instance, decode_many, decode_value};
pub use encode::{encode_instance, value_to_json};
pub use introspect::schema_for;
