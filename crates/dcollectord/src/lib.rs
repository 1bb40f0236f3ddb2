//! dcollector daemon - client registry and polling scheduler
//!
//! This crate provides the runtime of the collector:
//! - `registry` - Client registry actor owning connection state and snapshots
//! - `adapter` - BOINC and Folding@home connect/fetch adapters
//! - `scheduler` - Per-family scan loops and per-client polling tasks
//! - `summary` - Periodic fleet summary in the daemon log
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     dcollectord daemon                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐  claim   ┌─────────────────────────┐   │
//! │  │  Scheduler      │─────────▶│     RegistryActor       │   │
//! │  │ (per family)    │◀─────────│  (client state owner)   │   │
//! │  └────────┬────────┘  events  └────────────▲────────────┘   │
//! │           │ spawn                          │ publish        │
//! │           ▼                                │                │
//! │  ┌─────────────────┐   TCP    ┌────────────┴────────────┐   │
//! │  │ ProtocolAdapter │─────────▶│  polling task           │   │
//! │  │ (connect/auth)  │          │  (one per live client)  │   │
//! │  └─────────────────┘          └─────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate does not `.unwrap()` or `.expect()`.
//! Channel operations handle closure gracefully.

pub mod adapter;
pub mod registry;
pub mod scheduler;
pub mod summary;
