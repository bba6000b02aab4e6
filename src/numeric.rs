//! Checked narrowing/widening helpers used at the persistence boundary.
//!
//! `sqlx`'s `Any` driver only speaks `i64`/`f64` cleanly across SQLite and
//! Postgres, while the domain works in `u32`/`u64`/unsigned areas. These
//! helpers make overflow explicit and non-silent instead of relying on `as`.

use anyhow::anyhow;

pub fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    if v < 0 || v > u32::MAX as i64 {
        return Err(anyhow!("out of range for u32: {v}"));
    }
    Ok(v as u32)
}

pub fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

pub fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}

pub fn u32_to_i64(v: u32) -> i64 {
    v as i64
}

/// Waste areas/percentages are modeled as `f64`; this guards the one place
/// a negative value would indicate a bug in the converters upstream.
pub fn checked_non_negative_f64(field: &'static str, v: f64) -> anyhow::Result<f64> {
    if v.is_nan() || v < 0.0 {
        return Err(anyhow!("{field} must be non-negative, got {v}"));
    }
    Ok(v)
}
