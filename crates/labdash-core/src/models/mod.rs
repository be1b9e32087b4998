//! Domain models for the laboratory dashboard.

mod appointment;
mod status;

pub use appointment::*;
pub use status::*;
