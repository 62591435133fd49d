//! logfix command-line front end.
//!
//! The `logfix` binary is a thin clap layer over [`commands`]; the library
//! target exists so integration tests can reach the config loader and the
//! command implementations.

pub mod commands;
pub mod config;
