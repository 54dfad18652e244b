//! cairn: a censorship-resistant record store.
//!
//! Records are content-addressed files plus metadata on an append-only
//! two-branch commit log (`unvetted`/`vetted`). Activity on the vetted
//! branch is periodically batched under Merkle roots and checkpointed with
//! an external timestamp oracle, giving every published commit a
//! blockchain-backed existence proof. A referendum mechanism can overturn
//! administrative censorship and freeze the record in a terminal status.
//!
//! The crate exposes the record service facade (`service`), the commit log
//! store behind it (`store`), and the anchor machinery (`anchor`); the
//! transport layer lives elsewhere and consumes the facade.

#![warn(missing_docs)]

/// Anchor batching, derived index, oracle seam, and background engine.
pub mod anchor;
/// In-memory per-branch record index.
pub mod catalog;
/// Daemon configuration.
pub mod config;
/// Policy and engine bounds.
pub mod constants;
/// The store's ed25519 signing identity.
pub mod identity;
/// Binary SHA-256 Merkle tree over 32-byte leaves.
pub mod merkle;
/// Referendum tabulator.
pub mod referendum;
/// Record state machine.
pub mod rsm;
/// The record service facade consumed by the transport layer.
pub mod service;
/// Append-only two-branch commit log store.
pub mod store;
/// Wall-clock seam.
pub mod time;

pub use cairn_types as types;
