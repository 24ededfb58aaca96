//! Core types for fcstack
//!
//! This crate provides the primitives shared by the invocation engine and the
//! command-line front end.

pub mod credentials;
pub mod request_id;
pub mod value;

pub use credentials::{AccountRegion, Credentials};
pub use request_id::RequestId;
pub use value::is_true_value;
