//! The declarative command catalog.
//!
//! Every function here returns a plain [`ObdCommand`](crate::command::ObdCommand)
//! value describing one request and its decoder; nothing is sent until the
//! command is handed to a connection.

pub mod at;
pub mod control;
pub mod egr;
pub mod engine;
pub mod fuel;
pub mod pressure;
pub mod temperature;
