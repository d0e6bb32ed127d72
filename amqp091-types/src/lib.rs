#![deny(missing_docs, missing_debug_implementations)]

//! Implements AMQP 0-9-1 wire types and the methods of the `connection` and `channel` classes as defined in
//! the [specification](https://www.rabbitmq.com/resources/specs/amqp0-9-1.pdf).
//!
//! Only the control plane is covered. Methods of the `exchange`, `queue`, `basic`, `tx` and `confirm` classes
//! are not defined here and fail to decode with [`DecodeError::UnknownMethod`].

pub mod definitions;
pub mod error;
pub mod methods;
pub mod primitives;
pub mod states;

pub use error::{DecodeError, EncodeError};
