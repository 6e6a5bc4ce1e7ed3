//! The traversal engine: a hierarchical state machine over a forest of
//! file-system entities, advanced by a selector that picks the next
//! eligible entity each step.
//!
//! This crate has no knowledge of HTTP; it consumes nothing but plain data
//! and returns plain data. The driver (`davstress-cli`) wires it to the
//! transport (`davstress-transport`).

pub mod entity;
pub mod lifecycle;
pub mod selector;
pub mod stats;
pub mod url;

pub use entity::{advance_entity, EnableMask, Entity, Forest, Kind, StatsMethod};
pub use lifecycle::{Advance, Method, State};
pub use selector::{select_depth_first, select_random_walk, resolve, resolve_mut, EntityPath};
pub use stats::{Bucket, Field, Snapshot, Stats, Timings};
pub use url::compose as compose_url;
