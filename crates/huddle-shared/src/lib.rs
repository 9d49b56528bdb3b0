//! # huddle-shared
//!
//! Vocabulary shared by the Huddle store and server: identifier newtypes,
//! chat and task enums, and the realtime wire events.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ParseError;
