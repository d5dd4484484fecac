#![cfg_attr(docsrs, feature(doc_cfg))]
//! # elm327_lib
//!
//! This crate provides a library for talking to vehicles over ELM327-compatible
//! OBD-II adapters. It ships a catalog of ready-made commands covering the
//! common mode 01 sensors, trouble code handling, VIN readout and adapter
//! (AT) control, together with blocking and asynchronous connections that run
//! them over any byte transport.
//!
//! ## Features
//!
//! This crate uses a feature-based system to keep dependencies minimal.
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `elm327` command-line tool and pulls in `serialport` and the daemon stack.
//!
//! ### Client Features
//! - `serialport`: Lets the **blocking** connection open serial ports directly via the `serialport` crate.
//! - `tokio-async`: Enables the **asynchronous** connection for Tokio applications.
//! - `tokio-serial-async`: Additionally lets the asynchronous connection open serial ports via `tokio-serial`.
//!
//! ### Utility Features
//! - `bin-dependencies`: Enables all features required by the `elm327` binary executable.

/// Blocking connection over any `Read + Write` transport.
pub mod blocking;
/// The command type and the decode helpers shared by the catalog.
pub mod command;
/// Ready-made commands, grouped by vehicle subsystem.
pub mod commands;
/// Contains error types for the library.
mod error;
/// Raw and decoded response types.
pub mod response;

pub use error::{Error, Result};

/// Asynchronous connection for Tokio-based applications.
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-async")))]
#[cfg(feature = "tokio-async")]
pub mod connection;
