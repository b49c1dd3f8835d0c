//! plx CLI internals: argument parsing, model resolution, and subcommands.

pub mod classify;
pub mod cli;
pub mod codec;
pub mod compare;
pub mod config;
pub mod convert;
pub mod fetch;
