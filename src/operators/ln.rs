//! Inline lowering of the natural logarithm.
//!
//! `x = 2^e * m` with `m` in [sqrt(1/2), sqrt(2)), so `f = m - 1` stays small and
//! `log(1 + f)` is approximated by `f - f²/2 + f³*P(f)`. The exponent is folded back in
//! with the split constant `ln(2) = LN2_HI + LN2_LO`.

use cranelift::prelude::*;

use crate::lanes::Lanes;

const LN2_HI: f32 = 0.693_359_375;
const LN2_LO: f32 = -2.121_944_4e-4;
/// Bits of sqrt(1/2); mantissas above it belong to the next binade.
const SQRT_HALF_BITS: i32 = 0x3f35_04f3;
const MANTISSA_MASK: i32 = 0x007f_ffff;

const COEFFS: [f32; 9] = [
    7.037_683_6e-2,
    -1.151_461e-1,
    1.167_699_9e-1,
    -1.242_014_1e-1,
    1.424_932_3e-1,
    -1.666_805_8e-1,
    2.000_071_4e-1,
    -2.499_999_4e-1,
    3.333_333_1e-1,
];

/// Generates IR computing `log(x)` on every lane of `x`.
///
/// `log(+inf) = +inf`, `log(±0) = -inf`, negative lanes and NaN give NaN. Subnormal
/// inputs are treated as having the minimum exponent and lose accuracy.
pub(crate) fn log(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    let bits = lanes.as_int(builder, x);
    let sqrt_half = lanes.iconst(builder, SQRT_HALF_BITS);
    let t = builder.ins().isub(bits, sqrt_half);
    let e = lanes.sshr(builder, t, 23);

    let mask = lanes.iconst(builder, MANTISSA_MASK);
    let mantissa = builder.ins().band(t, mask);
    let mantissa = builder.ins().iadd(mantissa, sqrt_half);
    let m = lanes.as_float(builder, mantissa);

    let one = lanes.fconst(builder, 1.0);
    let f = builder.ins().fsub(m, one);
    let ef = builder.ins().fcvt_from_sint(lanes.float, e);
    let z = builder.ins().fmul(f, f);

    let p = lanes.polynomial(builder, f, &COEFFS);
    let y = builder.ins().fmul(p, f);
    let y = builder.ins().fmul(y, z);

    let ln2_lo = lanes.fconst(builder, LN2_LO);
    let lo_part = builder.ins().fmul(ef, ln2_lo);
    let y = builder.ins().fadd(y, lo_part);

    let half = lanes.fconst(builder, 0.5);
    let half_z = builder.ins().fmul(half, z);
    let y = builder.ins().fsub(y, half_z);

    let ln2_hi = lanes.fconst(builder, LN2_HI);
    let hi_part = builder.ins().fmul(ef, ln2_hi);
    let res = builder.ins().fadd(f, y);
    let res = builder.ins().fadd(res, hi_part);

    special_values(builder, lanes, x, res)
}

fn special_values(builder: &mut FunctionBuilder, lanes: Lanes, x: Value, res: Value) -> Value {
    let inf = lanes.fconst(builder, f32::INFINITY);
    let neg_inf = lanes.fconst(builder, f32::NEG_INFINITY);
    let zero = lanes.fconst(builder, 0.0);
    let nan = lanes.fconst(builder, f32::NAN);

    let res = lanes.select(builder, FloatCC::Equal, (x, inf), inf, res);
    let res = lanes.select(builder, FloatCC::Equal, (x, zero), neg_inf, res);
    let res = lanes.select(builder, FloatCC::LessThan, (x, zero), nan, res);
    lanes.select(builder, FloatCC::Unordered, (x, x), nan, res)
}
