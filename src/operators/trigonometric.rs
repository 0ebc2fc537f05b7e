//! Inline lowering of the sine function.
//!
//! The argument is reduced by the nearest multiple of π, `x = n*π + r`, with π split into
//! three parts so the reduction stays exact for |x| up to about 1e5. `sin(r)` is an odd
//! polynomial and the sign flips for odd `n`.

use cranelift::prelude::*;

use crate::lanes::Lanes;

const FRAC_1_PI: f32 = std::f32::consts::FRAC_1_PI;
const PI_A: f32 = 3.140_625;
const PI_B: f32 = 9.675_026e-4;
const PI_C: f32 = 1.509_958e-7;

const COEFFS: [f32; 5] = [
    -2.505_210_8e-8,
    2.755_732e-6,
    -1.984_127e-4,
    8.333_333e-3,
    -1.666_666_7e-1,
];

/// Generates IR computing `sin(x)` on every lane of `x` (radians).
///
/// # Returns
/// The result value. Infinite and NaN lanes give NaN.
pub(crate) fn sin(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    let inv_pi = lanes.fconst(builder, FRAC_1_PI);
    let t = builder.ins().fmul(x, inv_pi);
    let (nf, ni) = lanes.round(builder, t);

    let mut r = x;
    for part in [PI_A, PI_B, PI_C] {
        let c = lanes.fconst(builder, part);
        let step = builder.ins().fmul(nf, c);
        r = builder.ins().fsub(r, step);
    }
    let z = builder.ins().fmul(r, r);

    // sin(r) = r + r*z*P(z)
    let p = lanes.polynomial(builder, z, &COEFFS);
    let rz = builder.ins().fmul(r, z);
    let y = builder.ins().fmul(rz, p);
    let y = builder.ins().fadd(r, y);

    // sin(r + n*π) = (-1)^n sin(r)
    let sign = lanes.shl(builder, ni, 31);
    let bits = lanes.as_int(builder, y);
    let bits = builder.ins().bxor(bits, sign);
    lanes.as_float(builder, bits)
}
