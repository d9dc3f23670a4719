//! Minimal WebM parsing
//!
//! Splits into a stateless byte scanner ([`find_marker`], [`parse_varint`])
//! and the handful of format helpers built on top of it.

pub mod format;
pub mod scanner;

pub use format::{
    CLUSTER_ID, CLUSTER_TIMESTAMP, TIMESTAMP_SCALE, build_init_segment, cluster_meta, cluster_timestamp,
    find_cluster, read_unsigned_element, timestamp_scale_seconds,
};
pub use scanner::{VarInt, find_marker, find_marker_from, parse_varint};
