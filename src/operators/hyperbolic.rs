//! Inline lowerings of the hyperbolic functions, built on the exponential.

use cranelift::prelude::*;

use super::exp::{exp, half_exp};
use crate::lanes::Lanes;

const SIGN_MASK: i32 = i32::MIN;
/// Below this |x| tanh uses its odd polynomial.
const TANH_SMALL: f32 = 0.625;

const TANH_COEFFS: [f32; 5] = [
    -5.704_988_7e-3,
    2.063_908_9e-2,
    -5.373_971_6e-2,
    1.333_144_2e-1,
    -3.333_328_2e-1,
];

/// Generates IR computing `cosh(x) = h + 1/(4h)` with `h = exp(|x|) / 2`.
///
/// Halving inside the exponential keeps the result finite up to |x| of about 89.41,
/// past the point where `exp(|x|)` itself overflows.
pub(crate) fn cosh(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    let abs = builder.ins().fabs(x);
    let h = half_exp(builder, lanes, abs);
    let quarter = lanes.fconst(builder, 0.25);
    let recip = builder.ins().fdiv(quarter, h);
    builder.ins().fadd(h, recip)
}

/// Generates IR computing `tanh(x)`.
///
/// Both branches are computed and blended per lane: an odd polynomial near zero and
/// `1 - 2/(exp(2|x|) + 1)` with the sign of `x` elsewhere.
pub(crate) fn tanh(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    let abs = builder.ins().fabs(x);

    let z = builder.ins().fmul(x, x);
    let p = lanes.polynomial(builder, z, &TANH_COEFFS);
    let xz = builder.ins().fmul(x, z);
    let small = builder.ins().fmul(xz, p);
    let small = builder.ins().fadd(x, small);

    let two = lanes.fconst(builder, 2.0);
    let one = lanes.fconst(builder, 1.0);
    let doubled = builder.ins().fmul(abs, two);
    let e = exp(builder, lanes, doubled);
    let denom = builder.ins().fadd(e, one);
    let frac = builder.ins().fdiv(two, denom);
    let q = builder.ins().fsub(one, frac);

    let sign_mask = lanes.iconst(builder, SIGN_MASK);
    let x_bits = lanes.as_int(builder, x);
    let sign = builder.ins().band(x_bits, sign_mask);
    let q_bits = lanes.as_int(builder, q);
    let large = builder.ins().bor(q_bits, sign);
    let large = lanes.as_float(builder, large);

    let limit = lanes.fconst(builder, TANH_SMALL);
    lanes.select(builder, FloatCC::LessThan, (abs, limit), small, large)
}
