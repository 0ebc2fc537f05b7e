//! Lowering of checked programs to native machine code with Cranelift.
//!
//! Each program becomes one function with one of two signatures:
//!
//! - elementwise map: `fn(dst: *mut f32, src: *const f32, n: usize)`
//! - reduce-sum: `fn(src: *const f32, n: usize) -> f32`
//!
//! Both process the bulk of the range `4 * unroll` elements per iteration with F32X4
//! vectors and finish the remaining `n mod (4 * unroll)` elements one at a time. The
//! expression is emitted twice, once per lane shape, from the same lowering code.
//!
//! Reductions keep `unroll` vector accumulators. After the bulk loop the accumulators
//! are added in order, the four lanes are summed left to right, and the scalar tail is
//! accumulated onto that sum. This order is fixed, so results are reproducible.
//!
//! The emitted code is position independent and self-contained: every function is
//! lowered inline and constants live in the code buffer. Code that would need
//! relocations is rejected.

use std::sync::Arc;

use cranelift::prelude::*;
use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir::{Block, UserFuncName};
use cranelift_codegen::Context as CodegenContext;
use isa::TargetIsa;
use tracing::{error, trace};

use crate::check::Program;
use crate::config::CompileOptions;
use crate::errors::CodegenError;
use crate::expr::{Expr, FuncKind, OpKind};
use crate::kernel::Convention;
use crate::lanes::Lanes;
use crate::operators::{exp, hyperbolic, ln, sqrt, trigonometric};

/// Machine code for one program, ready to be copied into an executable region.
#[derive(Debug, Clone)]
pub(crate) struct CompiledCode {
    pub bytes: Vec<u8>,
    pub convention: Convention,
}

/// Compiles `program` for the host machine.
///
/// # Errors
/// Returns a `CodegenError` if the host is not supported, a setting is rejected, the IR
/// fails verification, or the code needs relocations. None of these are expected for a
/// checked program on a supported host; each is logged at error level.
pub(crate) fn compile_program(
    program: &Program,
    options: &CompileOptions,
) -> Result<CompiledCode, CodegenError> {
    compile_inner(program, options).inspect_err(|err| {
        error!(
            event = "codegen_failed",
            program = %program,
            error = %err,
            "code generation failed for a checked program"
        );
    })
}

fn compile_inner(
    program: &Program,
    options: &CompileOptions,
) -> Result<CompiledCode, CodegenError> {
    let isa = create_isa(options)?;
    let mut ctx = CodegenContext::new();
    build_function(&mut ctx, isa.as_ref(), program, options)?;
    trace!(ir = %ctx.func.display(), "generated kernel IR");

    let compiled = ctx
        .compile(isa.as_ref(), &mut ControlPlane::default())
        .map_err(|err| CodegenError::Cranelift(err.inner))?;

    let relocs = compiled.buffer.relocs().len();
    if relocs > 0 {
        return Err(CodegenError::UnexpectedRelocations(relocs));
    }

    Ok(CompiledCode {
        bytes: compiled.code_buffer().to_vec(),
        convention: program.convention(),
    })
}

/// Returns the Cranelift IR of `program` as text, before optimization.
///
/// # Errors
/// Returns a `CodegenError` if the host ISA cannot be created or the program has a
/// shape the generator does not accept.
pub fn clif_ir(program: &Program, options: &CompileOptions) -> Result<String, CodegenError> {
    let isa = create_isa(options)?;
    let mut ctx = CodegenContext::new();
    build_function(&mut ctx, isa.as_ref(), program, options)?;
    Ok(ctx.func.display().to_string())
}

/// Creates an Instruction Set Architecture (ISA) target for the host machine.
///
/// The flags follow `options`: optimization level and verifier. Code is generated
/// without PIC relocations since it never links against anything.
///
/// # Errors
/// Returns a CodegenError if:
/// - The host machine architecture is not supported
/// - A flag is rejected
pub(crate) fn create_isa(options: &CompileOptions) -> Result<Arc<dyn TargetIsa>, CodegenError> {
    let mut flag_builder = settings::builder();
    flag_builder.set("opt_level", options.opt_level.as_str())?;
    flag_builder.set(
        "enable_verifier",
        if options.verify { "true" } else { "false" },
    )?;
    flag_builder.set("is_pic", "false")?;

    let isa_builder = cranelift_native::builder()
        .map_err(|msg| CodegenError::HostMachineNotSupported(msg.to_string()))?;

    Ok(isa_builder.finish(settings::Flags::new(flag_builder))?)
}

fn signature(isa: &dyn TargetIsa, convention: Convention) -> Signature {
    let ptr = isa.pointer_type();
    let mut sig = Signature::new(isa.default_call_conv());
    match convention {
        Convention::ElementwiseMap => {
            sig.params.push(AbiParam::new(ptr)); // dst
            sig.params.push(AbiParam::new(ptr)); // src
            sig.params.push(AbiParam::new(ptr)); // n
        }
        Convention::ReduceSum => {
            sig.params.push(AbiParam::new(ptr)); // src
            sig.params.push(AbiParam::new(ptr)); // n
            sig.returns.push(AbiParam::new(types::F32));
        }
    }
    sig
}

/// Fills `ctx.func` with the loop nest for `program`.
fn build_function(
    ctx: &mut CodegenContext,
    isa: &dyn TargetIsa,
    program: &Program,
    options: &CompileOptions,
) -> Result<(), CodegenError> {
    let convention = program.convention();
    ctx.func.signature = signature(isa, convention);
    ctx.func.name = UserFuncName::testcase(convention.symbol());

    let mut builder_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
    let mut kernel = KernelBuilder {
        builder: &mut builder,
        program,
        ptr: isa.pointer_type(),
        unroll: options.unroll.max(1),
    };

    match convention {
        Convention::ElementwiseMap => kernel.build_map()?,
        Convention::ReduceSum => kernel.build_reduce()?,
    }

    builder.seal_all_blocks();
    builder.finalize();
    Ok(())
}

/// Converts block arguments to whatever the `jump`/`brif` builders expect.
fn block_args<T: From<Value>>(values: &[Value]) -> Vec<T> {
    values.iter().copied().map(T::from).collect()
}

struct KernelBuilder<'a, 'b> {
    builder: &'a mut FunctionBuilder<'b>,
    program: &'a Program,
    ptr: Type,
    unroll: usize,
}

impl KernelBuilder<'_, '_> {
    /// Elements handled per bulk iteration.
    fn step(&self) -> i64 {
        (Lanes::WIDTH * self.unroll) as i64
    }

    /// Returns `n` rounded down to a multiple of the step.
    fn bulk_len(&mut self, n: Value) -> Value {
        let step = self.step();
        let step = self.builder.ins().iconst(self.ptr, step);
        let iterations = self.builder.ins().udiv(n, step);
        self.builder.ins().imul(iterations, step)
    }

    /// Address of element `index` in `base`.
    fn element_addr(&mut self, base: Value, index: Value) -> Value {
        let offset = self.builder.ins().ishl_imm(index, 2);
        self.builder.ins().iadd(base, offset)
    }

    /// Loads `lanes` at `addr + offset` and evaluates the expression on them.
    fn eval_at(&mut self, lanes: Lanes, addr: Value, offset: i32) -> Result<Value, CodegenError> {
        let x = self
            .builder
            .ins()
            .load(lanes.float, MemFlags::new(), addr, offset);
        emit(self.program.body(), self.builder, lanes, self.program.variable(), x)
    }

    fn build_map(&mut self) -> Result<(), CodegenError> {
        let entry = self.builder.create_block();
        let vec_header = self.builder.create_block();
        let vec_body = self.builder.create_block();
        let tail_header = self.builder.create_block();
        let tail_body = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.append_block_params_for_function_params(entry);
        for block in [vec_header, vec_body, tail_header, tail_body] {
            self.builder.append_block_param(block, self.ptr);
        }

        // entry: i = 0
        self.builder.switch_to_block(entry);
        let [dst, src, n] = self.params::<3>(entry)?;
        let bulk = self.bulk_len(n);
        let zero = self.builder.ins().iconst(self.ptr, 0);
        self.builder.ins().jump(vec_header, &block_args(&[zero]));

        // while i < bulk
        self.builder.switch_to_block(vec_header);
        let i = self.builder.block_params(vec_header)[0];
        let more = self.builder.ins().icmp(IntCC::UnsignedLessThan, i, bulk);
        self.builder.ins().brif(
            more,
            vec_body,
            &block_args(&[i]),
            tail_header,
            &block_args(&[i]),
        );

        self.builder.switch_to_block(vec_body);
        let i = self.builder.block_params(vec_body)[0];
        let src_addr = self.element_addr(src, i);
        let dst_addr = self.element_addr(dst, i);
        for k in 0..self.unroll {
            let offset = (k * Lanes::WIDTH * 4) as i32;
            let y = self.eval_at(Lanes::VECTOR, src_addr, offset)?;
            self.builder
                .ins()
                .store(MemFlags::new(), y, dst_addr, offset);
        }
        let step = self.step();
        let next = self.builder.ins().iadd_imm(i, step);
        self.builder.ins().jump(vec_header, &block_args(&[next]));

        // while i < n, one element at a time
        self.builder.switch_to_block(tail_header);
        let i = self.builder.block_params(tail_header)[0];
        let more = self.builder.ins().icmp(IntCC::UnsignedLessThan, i, n);
        self.builder
            .ins()
            .brif(more, tail_body, &block_args(&[i]), exit, &[]);

        self.builder.switch_to_block(tail_body);
        let i = self.builder.block_params(tail_body)[0];
        let src_addr = self.element_addr(src, i);
        let dst_addr = self.element_addr(dst, i);
        let y = self.eval_at(Lanes::SCALAR, src_addr, 0)?;
        self.builder.ins().store(MemFlags::new(), y, dst_addr, 0);
        let next = self.builder.ins().iadd_imm(i, 1);
        self.builder.ins().jump(tail_header, &block_args(&[next]));

        self.builder.switch_to_block(exit);
        self.builder.ins().return_(&[]);
        Ok(())
    }

    fn build_reduce(&mut self) -> Result<(), CodegenError> {
        let entry = self.builder.create_block();
        let vec_header = self.builder.create_block();
        let vec_body = self.builder.create_block();
        let combine = self.builder.create_block();
        let tail_header = self.builder.create_block();
        let tail_body = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.append_block_params_for_function_params(entry);
        // (i, acc_0 .. acc_{unroll-1})
        for block in [vec_header, vec_body, combine] {
            self.builder.append_block_param(block, self.ptr);
            for _ in 0..self.unroll {
                self.builder.append_block_param(block, Lanes::VECTOR.float);
            }
        }
        // (i, sum)
        for block in [tail_header, tail_body] {
            self.builder.append_block_param(block, self.ptr);
            self.builder.append_block_param(block, types::F32);
        }
        self.builder.append_block_param(exit, types::F32);

        self.builder.switch_to_block(entry);
        let [src, n] = self.params::<2>(entry)?;
        let bulk = self.bulk_len(n);
        let zero = self.builder.ins().iconst(self.ptr, 0);
        let acc = Lanes::VECTOR.fconst(self.builder, 0.0);
        let mut args = vec![zero];
        args.extend(std::iter::repeat_n(acc, self.unroll));
        self.builder.ins().jump(vec_header, &block_args(&args));

        self.builder.switch_to_block(vec_header);
        let state = self.builder.block_params(vec_header).to_vec();
        let more = self
            .builder
            .ins()
            .icmp(IntCC::UnsignedLessThan, state[0], bulk);
        self.builder.ins().brif(
            more,
            vec_body,
            &block_args(&state),
            combine,
            &block_args(&state),
        );

        self.builder.switch_to_block(vec_body);
        let state = self.builder.block_params(vec_body).to_vec();
        let (i, accs) = (state[0], &state[1..]);
        let src_addr = self.element_addr(src, i);
        let step = self.step();
        let mut args = Vec::with_capacity(state.len());
        args.push(self.builder.ins().iadd_imm(i, step));
        for (k, &acc) in accs.iter().enumerate() {
            let offset = (k * Lanes::WIDTH * 4) as i32;
            let y = self.eval_at(Lanes::VECTOR, src_addr, offset)?;
            args.push(self.builder.ins().fadd(acc, y));
        }
        self.builder.ins().jump(vec_header, &block_args(&args));

        // fold the accumulators, then the lanes
        self.builder.switch_to_block(combine);
        let state = self.builder.block_params(combine).to_vec();
        let (i, accs) = (state[0], &state[1..]);
        let mut total = accs[0];
        for &acc in &accs[1..] {
            total = self.builder.ins().fadd(total, acc);
        }
        let mut sum = self.builder.ins().extractlane(total, 0);
        for lane in 1..Lanes::WIDTH as u8 {
            let value = self.builder.ins().extractlane(total, lane);
            sum = self.builder.ins().fadd(sum, value);
        }
        self.builder.ins().jump(tail_header, &block_args(&[i, sum]));

        self.builder.switch_to_block(tail_header);
        let state = self.builder.block_params(tail_header).to_vec();
        let more = self
            .builder
            .ins()
            .icmp(IntCC::UnsignedLessThan, state[0], n);
        self.builder.ins().brif(
            more,
            tail_body,
            &block_args(&state),
            exit,
            &block_args(&state[1..]),
        );

        self.builder.switch_to_block(tail_body);
        let state = self.builder.block_params(tail_body).to_vec();
        let (i, sum) = (state[0], state[1]);
        let src_addr = self.element_addr(src, i);
        let y = self.eval_at(Lanes::SCALAR, src_addr, 0)?;
        let sum = self.builder.ins().fadd(sum, y);
        let next = self.builder.ins().iadd_imm(i, 1);
        self.builder.ins().jump(tail_header, &block_args(&[next, sum]));

        self.builder.switch_to_block(exit);
        let result = self.builder.block_params(exit)[0];
        self.builder.ins().return_(&[result]);
        Ok(())
    }

    fn params<const N: usize>(&self, block: Block) -> Result<[Value; N], CodegenError> {
        self.builder
            .block_params(block)
            .try_into()
            .map_err(|_| CodegenError::UnsupportedShape(format!("entry block needs {N} parameters")))
    }
}

/// Generates IR for `expr` with the variable bound to `x`.
///
/// # Errors
/// Returns `UnsupportedShape` for a foreign variable or a call with the wrong number of
/// arguments. The checker rejects both, so this only fires on a checker/generator mismatch.
pub(crate) fn emit(
    expr: &Expr,
    builder: &mut FunctionBuilder,
    lanes: Lanes,
    variable: &str,
    x: Value,
) -> Result<Value, CodegenError> {
    match expr {
        Expr::Literal(value) => Ok(lanes.fconst(builder, *value as f32)),
        Expr::Variable(name) if name == variable => Ok(x),
        Expr::Variable(name) => Err(CodegenError::UnsupportedShape(format!(
            "reference to undeclared variable `{name}`"
        ))),
        Expr::Call(func, args) => match args.as_slice() {
            [arg] => {
                let value = emit(arg, builder, lanes, variable, x)?;
                Ok(lower_call(*func, builder, lanes, value))
            }
            _ => Err(CodegenError::UnsupportedShape(format!(
                "`{func}` called with {} arguments",
                args.len()
            ))),
        },
        Expr::Binary(op, lhs, rhs) => {
            let lhs = emit(lhs, builder, lanes, variable, x)?;
            let rhs = emit(rhs, builder, lanes, variable, x)?;
            Ok(match op {
                OpKind::Add => builder.ins().fadd(lhs, rhs),
                OpKind::Sub => builder.ins().fsub(lhs, rhs),
                OpKind::Mul => builder.ins().fmul(lhs, rhs),
                OpKind::Div => builder.ins().fdiv(lhs, rhs),
            })
        }
    }
}

fn lower_call(func: FuncKind, builder: &mut FunctionBuilder, lanes: Lanes, x: Value) -> Value {
    match func {
        FuncKind::Exp => exp::exp(builder, lanes, x),
        FuncKind::Log => ln::log(builder, lanes, x),
        FuncKind::Cosh => hyperbolic::cosh(builder, lanes, x),
        FuncKind::Sin => trigonometric::sin(builder, lanes, x),
        FuncKind::Tanh => hyperbolic::tanh(builder, lanes, x),
        FuncKind::Inv => sqrt::inv(builder, lanes, x),
        FuncKind::Sqrt => sqrt::sqrt(builder, x),
        FuncKind::Abs => sqrt::abs(builder, x),
    }
}
