//! Inline lowering of the exponential function.
//!
//! The input is split as `x = n*ln(2) + r` with |r| <= ln(2)/2. `exp(r)` comes from a
//! degree-6 polynomial and the result is scaled by `2^n` by building the exponent bits
//! directly. The scale is applied in two halves so that results reach the subnormal
//! range and overflow to +inf the same way `expf` does.

use cranelift::prelude::*;

use crate::lanes::Lanes;

const LOG2_E: f32 = std::f32::consts::LOG2_E;
// ln(2) split so that n * LN2_HI is exact for the clamped range
const LN2_HI: f32 = 0.693_359_375;
const LN2_LO: f32 = -2.121_944_4e-4;

/// Below this exp(x) rounds to zero, above it to +inf.
const MIN_INPUT: f32 = -104.0;
const MAX_INPUT: f32 = 88.8;
/// Same bound for exp(x)/2, which stays finite up to about 89.41.
const MAX_HALF_INPUT: f32 = 89.5;

const COEFFS: [f32; 6] = [
    1.987_569_1e-4,
    1.398_199_9e-3,
    8.333_452e-3,
    4.166_579_6e-2,
    1.666_666_5e-1,
    5.000_000_1e-1,
];

/// Generates IR computing `exp(x)` on every lane of `x`.
///
/// # Arguments
/// * `builder` - The function builder to emit into
/// * `lanes` - Whether `x` is a scalar or a vector
/// * `x` - The argument
///
/// # Returns
/// The value holding the result, of the same type as `x`. NaN lanes stay NaN.
pub(crate) fn exp(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    scaled_exp(builder, lanes, x, MAX_INPUT, 0)
}

/// Generates IR computing `exp(x) / 2`.
///
/// The halving is folded into the exponent, so the result is finite wherever
/// `exp(x) / 2` is representable even though `exp(x)` alone would overflow.
pub(crate) fn half_exp(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    scaled_exp(builder, lanes, x, MAX_HALF_INPUT, 1)
}

/// `exp(x) * 2^-shift`, with `x` clamped to `[MIN_INPUT, max_input]`.
fn scaled_exp(
    builder: &mut FunctionBuilder,
    lanes: Lanes,
    x: Value,
    max_input: f32,
    shift: i32,
) -> Value {
    let lo = lanes.fconst(builder, MIN_INPUT);
    let hi = lanes.fconst(builder, max_input);
    let x = builder.ins().fmax(x, lo);
    let x = builder.ins().fmin(x, hi);

    let log2e = lanes.fconst(builder, LOG2_E);
    let t = builder.ins().fmul(x, log2e);
    let (nf, ni) = lanes.round(builder, t);

    // r = x - n*ln(2), in two steps
    let ln2_hi = lanes.fconst(builder, LN2_HI);
    let ln2_lo = lanes.fconst(builder, LN2_LO);
    let hi_part = builder.ins().fmul(nf, ln2_hi);
    let r = builder.ins().fsub(x, hi_part);
    let lo_part = builder.ins().fmul(nf, ln2_lo);
    let r = builder.ins().fsub(r, lo_part);
    let z = builder.ins().fmul(r, r);

    // exp(r) = 1 + r + z*P(r)
    let p = lanes.polynomial(builder, r, &COEFFS);
    let y = builder.ins().fmul(p, z);
    let y = builder.ins().fadd(y, r);
    let one = lanes.fconst(builder, 1.0);
    let y = builder.ins().fadd(y, one);

    let ni = if shift == 0 {
        ni
    } else {
        let shift = lanes.iconst(builder, shift);
        builder.ins().isub(ni, shift)
    };
    let n1 = lanes.sshr(builder, ni, 1);
    let n2 = builder.ins().isub(ni, n1);
    let s1 = pow2(builder, lanes, n1);
    let s2 = pow2(builder, lanes, n2);
    let y = builder.ins().fmul(y, s1);
    builder.ins().fmul(y, s2)
}

/// Builds `2^n` from integer lanes with -126 <= n <= 127.
fn pow2(builder: &mut FunctionBuilder, lanes: Lanes, n: Value) -> Value {
    let bias = lanes.iconst(builder, 127);
    let biased = builder.ins().iadd(n, bias);
    let bits = lanes.shl(builder, biased, 23);
    lanes.as_float(builder, bits)
}
