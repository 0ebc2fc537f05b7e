//! Lane-shape helpers for emitting the same computation as scalar or vector IR.
//!
//! Every lowering is written once against [`Lanes`] and instantiated twice per kernel:
//! with `Lanes::VECTOR` for the 4-wide bulk loop and with `Lanes::SCALAR` for the tail.
//! Constants are splatted and comparisons are turned into bit masks as needed, so the two
//! instantiations compute bit-identical results lane for lane.

use cranelift::prelude::*;

/// The float and matching integer type of one instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lanes {
    pub float: Type,
    pub int: Type,
}

impl Lanes {
    pub const SCALAR: Lanes = Lanes {
        float: types::F32,
        int: types::I32,
    };

    pub const VECTOR: Lanes = Lanes {
        float: types::F32X4,
        int: types::I32X4,
    };

    /// Number of f32 lanes in `VECTOR`.
    pub const WIDTH: usize = 4;

    pub fn is_vector(self) -> bool {
        self.float.is_vector()
    }

    pub fn fconst(self, builder: &mut FunctionBuilder, value: f32) -> Value {
        let scalar = builder.ins().f32const(value);
        self.splat(builder, self.float, scalar)
    }

    pub fn iconst(self, builder: &mut FunctionBuilder, value: i32) -> Value {
        let scalar = builder
            .ins()
            .iconst(types::I32, i64::from(value as u32));
        self.splat(builder, self.int, scalar)
    }

    fn splat(self, builder: &mut FunctionBuilder, ty: Type, scalar: Value) -> Value {
        if self.is_vector() {
            builder.ins().splat(ty, scalar)
        } else {
            scalar
        }
    }

    /// Reinterprets float lanes as integer lanes.
    pub fn as_int(self, builder: &mut FunctionBuilder, value: Value) -> Value {
        builder.ins().bitcast(self.int, MemFlags::new(), value)
    }

    /// Reinterprets integer lanes as float lanes.
    pub fn as_float(self, builder: &mut FunctionBuilder, value: Value) -> Value {
        builder.ins().bitcast(self.float, MemFlags::new(), value)
    }

    pub fn shl(self, builder: &mut FunctionBuilder, value: Value, amount: i32) -> Value {
        let amount = builder.ins().iconst(types::I32, i64::from(amount));
        builder.ins().ishl(value, amount)
    }

    /// Arithmetic shift right.
    pub fn sshr(self, builder: &mut FunctionBuilder, value: Value, amount: i32) -> Value {
        let amount = builder.ins().iconst(types::I32, i64::from(amount));
        builder.ins().sshr(value, amount)
    }

    /// Picks `then` where `lhs cond rhs` holds and `otherwise` elsewhere, per lane.
    pub fn select(
        self,
        builder: &mut FunctionBuilder,
        cond: FloatCC,
        (lhs, rhs): (Value, Value),
        then: Value,
        otherwise: Value,
    ) -> Value {
        let mask = builder.ins().fcmp(cond, lhs, rhs);
        if self.is_vector() {
            let mask = self.as_float(builder, mask);
            builder.ins().bitselect(mask, then, otherwise)
        } else {
            builder.ins().select(mask, then, otherwise)
        }
    }

    /// Evaluates a polynomial in `x` by Horner's rule, coefficients highest degree first.
    pub fn polynomial(self, builder: &mut FunctionBuilder, x: Value, coeffs: &[f32]) -> Value {
        let Some((&leading, rest)) = coeffs.split_first() else {
            return self.fconst(builder, 0.0);
        };
        let mut acc = self.fconst(builder, leading);
        for &coeff in rest {
            let c = self.fconst(builder, coeff);
            let scaled = builder.ins().fmul(acc, x);
            acc = builder.ins().fadd(scaled, c);
        }
        acc
    }

    /// Rounds `x` to the nearest integer, ties to even, for |x| < 2^22.
    ///
    /// Returns the rounded value as float lanes and as integer lanes.
    pub fn round(self, builder: &mut FunctionBuilder, x: Value) -> (Value, Value) {
        // adding 1.5 * 2^23 pushes the fraction bits out of the mantissa
        const MAGIC: f32 = 12_582_912.0;
        const MAGIC_BITS: i32 = 0x4b40_0000;

        let magic = self.fconst(builder, MAGIC);
        let shifted = builder.ins().fadd(x, magic);
        let rounded = builder.ins().fsub(shifted, magic);

        let bits = self.as_int(builder, shifted);
        let magic_bits = self.iconst(builder, MAGIC_BITS);
        let integer = builder.ins().isub(bits, magic_bits);
        (rounded, integer)
    }
}
