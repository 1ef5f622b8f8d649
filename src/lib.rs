//! Redstring - knowledge-graph data layer
//!
//! Prototype/instance graph store with copy-on-write transactions, universe
//! and storage-slot federation, session persistence, and a channel-based
//! bridge that lets an external agent observe and edit the store.

pub mod ai;
pub mod bridge;
pub mod config;
pub mod graph;
pub mod persistence;
pub mod universe;
