//! dcollector Core - Shared types for distributed-computing fleet polling
//!
//! This crate provides the domain types shared between the wire codecs
//! (dc-protocol) and the polling daemon (dcollectord).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod boinc;
pub mod client;
pub mod config;
pub mod duration;
pub mod error;
pub mod fah;
pub mod snapshot;

// Re-exports for convenience
pub use boinc::{
    compare_results, sort_results, work_unit_span, ActiveTask, App, AppVersion, BoincState, HostInfo, NetStats,
    Project, TimeStats, WorkResult, WorkUnit, WorkUnitSpan,
};
pub use client::{
    ClientConfig, ClientId, ProtocolFamily, DEFAULT_REFRESH, MIN_CLIENT_PORT,
};
pub use config::{FamilySection, FleetConfig, RawClientEntry};
pub use duration::{format_dhms, Dhms};
pub use error::{ConfigError, ConfigResult, PollError, PollErrorKind};
pub use fah::{FahState, Slot, Unit};
pub use snapshot::{ClientView, ConnectionState, StateSnapshot};
