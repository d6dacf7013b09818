//! Bulk IP address and network lookups against MaxMind DB files.
//!
//! Keys flow from an [`input::KeyLines`] sequence into a
//! [`engine::LookupEngine`], which resolves each key on its own task through a
//! shared [`lookup::NetworkLookup`] and collects every matched
//! [`lookup::RecordForNetwork`].

#[macro_use]
extern crate tracing;

pub mod cli;
pub mod config;
pub mod engine;
mod error;
pub mod input;
pub mod lookup;
pub mod output;
pub mod trace;

pub use config::Config;
pub use engine::{Callback, ErrorHook, LookupEngine, LookupStats, run_lookups};
pub use error::Error;
pub use lookup::{MmdbReader, NetworkLookup, Record, RecordForNetwork};
