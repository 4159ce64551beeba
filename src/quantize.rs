//! Per-tensor symmetric int8 quantization and the hardware-exact int32→int8
//! requantization path used on GEMV accumulators.
//!
//! Both operations here are pure functions of their arguments: no `Config`,
//! no I/O, no shared state. They are the one place in the crate where
//! floating point arithmetic is still permitted (quantizing a trained
//! tensor); everything downstream of them is integer-only.

/// Picks the symmetric quantization scale for a tensor: `max(|x|) / 127`,
/// or `1.0` for an all-zero tensor (otherwise the scale would divide by
/// zero).
pub fn pick_scale(tensor: &[f32]) -> f32 {
    let max_abs = tensor.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if max_abs == 0.0 {
        1.0
    } else {
        max_abs / 127.0
    }
}

/// Quantizes `tensor` to signed 8-bit values using the given per-tensor
/// `scale`: `clip(round(x / scale), -128, 127)`, half-away-from-zero
/// rounding, zero-point implicitly 0.
pub fn quantize_f32_to_i8(tensor: &[f32], scale: f32) -> Vec<i8> {
    tensor
        .iter()
        .map(|&x| {
            let scaled = x / scale;
            let rounded = round_half_away_from_zero(scaled);
            rounded.clamp(-128.0, 127.0) as i8
        })
        .collect()
}

/// IEEE/Python-style round-half-away-from-zero. `f32::round` already rounds
/// halves away from zero in Rust, but we spell it out so the rounding rule
/// stays a named, testable invariant rather than an implicit stdlib detail.
fn round_half_away_from_zero(x: f32) -> f32 {
    x.round()
}

/// The hardware-exact requantization used on GEMV accumulator vectors
/// (§4.1). `max_abs` must be the maximum absolute value across the whole
/// accumulator vector; passing a smaller value than the true max would
/// desynchronize this function from the RTL it mirrors, so it is an
/// explicit argument rather than recomputed here.
///
/// # Panics
/// Panics if `max_abs` is negative; a negative magnitude can never arise
/// from `|acc_i|` and indicates a caller bug, not a data condition to
/// recover from.
pub fn requantize_i32_to_i8_exact(acc: &[i32], max_abs: i64) -> Vec<i8> {
    assert!(max_abs >= 0, "max_abs must be non-negative, got {max_abs}");

    if max_abs == 0 {
        return vec![0; acc.len()];
    }

    // r = (127 << 24) / max_abs, truncating integer division.
    let reciprocal_scale: i64 = (127i64 << 24) / max_abs;

    acc.iter()
        .map(|&a| {
            let product = i64::from(a) * reciprocal_scale;
            let rounded = (product + (1 << 23)) >> 24;
            rounded.clamp(-128, 127) as i8
        })
        .collect()
}
