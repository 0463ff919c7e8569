//! Pieces shared by the simulator, analyzer and monitor processes: topic
//! administration, the reading wire format and the module repository.

pub mod admin;
pub mod consumer;
pub mod db;
pub mod errors;
pub mod modules;
pub mod reading;

pub use errors::{Error, Result};
