//! API request handlers

mod commands;
mod health;
mod offenders;

pub use commands::*;
pub use health::*;
pub use offenders::*;
