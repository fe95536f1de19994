//! Shared primitive types used across every report.

/// A stable, globally unique identifier for a storage entity (Gratia UniqueID).
pub type EntityId = String;

/// A fully qualified host or endpoint name, used as a reconciliation key.
pub type Hostname = String;

/// Seconds since the Unix epoch, UTC.
pub type EpochSecs = i64;

/// Bytes per reported gigabyte (decimal, as storage vendors report).
pub const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Convert a byte count to whole gigabytes, rounding half away from zero.
pub fn gb(bytes: i64) -> i64 {
    (bytes as f64 / BYTES_PER_GB).round() as i64
}
