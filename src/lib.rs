//! AEMET weather warning service.
//!
//! Polls the AEMET OpenData warning feeds, classifies every bulletin into a
//! per-province risk level and keeps a single flat-file snapshot as the
//! state the lookup API answers from. See `sync::SyncOrchestrator` for the
//! lifecycle and `ingest` for the three feed formats.

pub mod alert;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod provinces;
pub mod snapshot;
pub mod sync;
pub mod verify;
