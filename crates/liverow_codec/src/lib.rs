//! # LiveRow Codec
//!
//! Primitive value model and canonical text codec for LiveRow.
//!
//! This crate provides:
//! - The [`Value`] sum type covering every primitive the engine supports
//! - The [`Kind`] tag used by column descriptors
//! - Canonical text encoding shared by the cache tier and change-feed payloads
//! - The inverse decoding, driven by a column's declared [`Kind`]
//!
//! ## Round-trip guarantees
//!
//! For every supported primitive `v`: `decode_text(v.kind(), encode_text(v))`
//! yields `v` again. `Value::Null` encodes to `None` and `None` decodes to
//! `Value::Null` for every kind - absence is the canonical representation of
//! SQL `NULL` and of "key not present" in the cache tier.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode_text;
pub use encode::encode_text;
pub use error::{CodecError, CodecResult};
pub use value::{Kind, Value};
