//! Lowerings that map to a single instruction.

use cranelift::prelude::*;

use crate::lanes::Lanes;

pub(crate) fn sqrt(builder: &mut FunctionBuilder, x: Value) -> Value {
    builder.ins().sqrt(x)
}

/// Reciprocal `1/x`; gives ±inf for ±0.
pub(crate) fn inv(builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    let one = lanes.fconst(builder, 1.0);
    builder.ins().fdiv(one, x)
}

pub(crate) fn abs(builder: &mut FunctionBuilder, x: Value) -> Value {
    builder.ins().fabs(x)
}
