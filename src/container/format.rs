//! WebM structural markers and the few fields playback needs
//!
//! Only enough of the container is parsed to splice an initialization
//! segment together and to read two scalars: the segment timestamp scale
//! and the timestamp of a cluster.

use tracing::{debug, trace};

use super::scanner::{find_marker, find_marker_from, parse_varint};
use crate::types::ClusterMeta;
use crate::{PlayerError, Result};

/// Cluster element ID; every cluster starts with it.
pub const CLUSTER_ID: [u8; 4] = [0x1f, 0x43, 0xb6, 0x75];

/// Cluster timestamp element ID.
pub const CLUSTER_TIMESTAMP: [u8; 1] = [0xe7];

/// Segment info timestamp scale element ID.
pub const TIMESTAMP_SCALE: [u8; 3] = [0x2a, 0xd7, 0xb1];

/// Matroska default timestamp scale, in nanoseconds per tick.
pub const DEFAULT_TIMESTAMP_SCALE_NS: u64 = 1_000_000;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Offset of the first cluster boundary in a payload.
pub fn find_cluster(bytes: &[u8]) -> Option<usize> {
    find_marker(bytes, &CLUSTER_ID)
}

/// Read an unsigned integer element identified by `marker`.
///
/// The element is searched at or after `from`. Its size VarInt follows the
/// marker and its value is `size` big-endian bytes. Returns `Ok(None)` when
/// the marker does not occur.
pub fn read_unsigned_element(bytes: &[u8], marker: &[u8], from: usize) -> Result<Option<u64>> {
    let Some(position) = find_marker_from(bytes, marker, from) else {
        return Ok(None);
    };

    let size_offset = position + marker.len();
    let size = parse_varint(bytes, size_offset)?;
    let data_offset = size_offset + size.length as usize;

    if size.value == 0 || size.value > 8 {
        return Err(PlayerError::malformed(
            "unsigned element",
            format!("element at {} has unsupported size {}", position, size.value),
        ));
    }

    let data = bytes.get(data_offset..data_offset + size.value as usize).ok_or_else(|| {
        PlayerError::malformed(
            "unsigned element",
            format!("element at {} is truncated ({} bytes declared)", position, size.value),
        )
    })?;

    let value = data.iter().fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
    trace!("Element {:02x?} at {} = {}", marker, position, value);
    Ok(Some(value))
}

/// Timestamp scale of the segment described by `metadata`, in seconds per tick.
pub fn timestamp_scale_seconds(metadata: &[u8]) -> Result<f64> {
    let scale_ns = match read_unsigned_element(metadata, &TIMESTAMP_SCALE, 0)? {
        Some(0) => {
            return Err(PlayerError::malformed("timestamp scale", "scale must not be zero"));
        }
        Some(scale) => scale,
        None => {
            debug!("No timestamp scale in metadata, using {}ns", DEFAULT_TIMESTAMP_SCALE_NS);
            DEFAULT_TIMESTAMP_SCALE_NS
        }
    };
    Ok(scale_ns as f64 / NANOS_PER_SECOND)
}

/// Timestamp, in ticks, of the cluster starting at `cluster_offset`.
pub fn cluster_timestamp(payload: &[u8], cluster_offset: usize) -> Result<u64> {
    if payload.get(cluster_offset..cluster_offset + CLUSTER_ID.len()) != Some(&CLUSTER_ID[..]) {
        return Err(PlayerError::malformed(
            "cluster timestamp",
            format!("no cluster ID at offset {}", cluster_offset),
        ));
    }

    // The cluster size VarInt may contain 0xE7 bytes of its own
    let size_offset = cluster_offset + CLUSTER_ID.len();
    let size = parse_varint(payload, size_offset)?;
    let body = size_offset + size.length as usize;

    read_unsigned_element(payload, &CLUSTER_TIMESTAMP, body)?.ok_or_else(|| {
        PlayerError::malformed(
            "cluster timestamp",
            format!("cluster at offset {} has no timestamp element", cluster_offset),
        )
    })
}

/// Read both timing values needed to position the sink clock.
pub fn cluster_meta(time_scale_seconds: f64, payload: &[u8], cluster_offset: usize) -> Result<ClusterMeta> {
    let ticks = cluster_timestamp(payload, cluster_offset)?;
    Ok(ClusterMeta { time_scale_seconds, cluster_timestamp_seconds: ticks as f64 * time_scale_seconds })
}

/// Metadata bytes followed by the payload from its cluster boundary onward.
pub fn build_init_segment(metadata: &[u8], payload: &[u8], cluster_offset: usize) -> Result<Vec<u8>> {
    let cluster = payload.get(cluster_offset..).ok_or_else(|| {
        PlayerError::malformed(
            "init segment",
            format!("cluster offset {} exceeds payload of {} bytes", cluster_offset, payload.len()),
        )
    })?;

    let mut init = Vec::with_capacity(metadata.len() + cluster.len());
    init.extend_from_slice(metadata);
    init.extend_from_slice(cluster);
    Ok(init)
}
