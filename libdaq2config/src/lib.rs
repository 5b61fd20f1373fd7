//! Configuration synthesis and inspection for the XDAQ event-builder test
//! farm. The crate generates complete partition files from a handful of
//! topology parameters and reads existing ones back into a [Topology]
//! description, checking them against the farm conventions on the way.
//!
//! [Topology]: topology::Topology

pub mod configurator;
pub mod constants;
pub mod error;
pub mod fed_assignment;
pub mod fragments;
pub mod host;
pub mod ibv;
pub mod reader;
pub mod symbol_map;
pub mod topology;
pub mod xmlutil;
