#![forbid(unsafe_code)]

//! Domain model for the certification coach: questions, personas,
//! explanations and the serializable shape of a learning session.

pub mod digest;
pub mod error;
pub mod model;
pub mod registry;
pub mod time;

pub use error::Error;
pub use registry::CharacterRegistry;
pub use time::Clock;
