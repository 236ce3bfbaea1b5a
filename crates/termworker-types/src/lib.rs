//! Terminal worker types - pure protocol definitions
//!
//! This crate contains only the data shapes exchanged between the controlling
//! process and the terminal worker, with no async runtime or PTY dependencies.

pub mod message;
pub mod session;

pub use message::*;
pub use session::*;
