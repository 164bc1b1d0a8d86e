//! Software sequences for ALU operations the target lacks.
//!
//! Each lowering is gated by its [`CompilerOptions`] switch:
//!
//! | Opcode                  | Switch                      | Sequence                          |
//! |-------------------------|-----------------------------|-----------------------------------|
//! | `bitfield_reverse`      | `lower_bitfield_reverse`    | swap bits, pairs, nibbles, ...    |
//! | `bit_count`             | `lower_bit_count`           | SWAR sum, multiply, shift         |
//! | `imul_high`/`umul_high` | `lower_mul_high`            | widen, or 4-way split with carries|
//! | `fmin`/`fmax`           | `lower_fminmax_signed_zero` | `bcsel(a == b, imin/imax, fmin)`  |
//!
//! The min/max rewrite only applies to instructions that must preserve the
//! sign of zero. The float min/max it emits has that requirement cleared, so
//! running the pass again finds nothing to do.
//!
//! [`CompilerOptions`]: crate::compiler::CompilerOptions

use crate::{
    compiler::{pass::ShaderPass, CompilerContext, CompilerOptions, EventKind, EventLog},
    ir::{AluOp, Builder, Cursor, FloatControls, InstrId, Shader, ValueId},
    utils::{low_mask, replicate_byte},
    Result,
};

/// All three signed-zero preservation bits.
const SIGNED_ZERO_PRESERVE: FloatControls = FloatControls::SIGNED_ZERO_PRESERVE_FP16
    .union(FloatControls::SIGNED_ZERO_PRESERVE_FP32)
    .union(FloatControls::SIGNED_ZERO_PRESERVE_FP64);

fn replicate(byte: u8, bits: u8) -> u64 {
    replicate_byte(byte, u32::from(bits))
}

/// `((x >> shift) & mask) | ((x & mask) << shift)`
fn swap_masked(b: &mut Builder<'_>, x: ValueId, shift: u32, mask: u64) -> ValueId {
    let hi = b.ushr_imm(x, shift);
    let hi = b.iand_imm(hi, mask);
    let lo = b.iand_imm(x, mask);
    let lo = b.ishl_imm(lo, shift);
    b.ior(hi, lo)
}

/// Emits a parallel bit reversal of `x`.
///
/// # Panics
///
/// Panics if `x` is narrower than 8 bits.
pub fn lowered_bitfield_reverse(b: &mut Builder<'_>, x: ValueId) -> ValueId {
    let bits = b.shader().value(x).bit_size();
    assert!(bits >= 8, "no bit reversal sequence for {bits}-bit values");

    let masks = [(1, 0x55), (2, 0x33), (4, 0x0f)];
    let mut out = x;
    for (shift, byte) in masks {
        out = swap_masked(b, out, shift, replicate(byte, bits));
    }
    let mut shift = 8;
    while shift < u32::from(bits) / 2 {
        let mask = replicate_width(shift, bits);
        out = swap_masked(b, out, shift, mask);
        shift *= 2;
    }

    if bits > 8 {
        let half = u32::from(bits) / 2;
        let hi = b.ushr_imm(out, half);
        let lo = b.ishl_imm(out, half);
        out = b.ior(hi, lo);
    }
    out
}

/// Mask selecting the low `width` bits of every `2 * width` bit group.
fn replicate_width(width: u32, bits: u8) -> u64 {
    let group = low_mask(width);
    let mut mask = 0u64;
    let mut at = 0;
    while at < u32::from(bits) {
        mask |= group << at;
        at += 2 * width;
    }
    mask
}

/// Emits a SWAR population count of `x` as a 32-bit value.
///
/// # Panics
///
/// Panics if `x` is narrower than 8 bits.
pub fn lowered_bit_count(b: &mut Builder<'_>, x: ValueId) -> ValueId {
    let bits = b.shader().value(x).bit_size();
    assert!(bits >= 8, "no population count sequence for {bits}-bit values");

    let pairs = b.ushr_imm(x, 1);
    let pairs = b.iand_imm(pairs, replicate(0x55, bits));
    let out = b.isub(x, pairs);

    let lo = b.iand_imm(out, replicate(0x33, bits));
    let hi = b.ushr_imm(out, 2);
    let hi = b.iand_imm(hi, replicate(0x33, bits));
    let out = b.iadd(lo, hi);

    let nibbles = b.ushr_imm(out, 4);
    let out = b.iadd(out, nibbles);
    let out = b.iand_imm(out, replicate(0x0f, bits));
    let out = b.imul_imm(out, replicate(0x01, bits));
    let out = b.ushr_imm(out, u32::from(bits) - 8);
    b.u2u(out, 32)
}

/// Emits the high half of `a * b`, signed when `signed` is set.
pub fn lowered_mul_high(b: &mut Builder<'_>, x: ValueId, y: ValueId, signed: bool) -> ValueId {
    let bits = b.shader().value(x).bit_size();

    if bits < 32 {
        // The full product fits in 32 bits.
        let widen = |b: &mut Builder<'_>, v: ValueId| if signed { b.i2i(v, 32) } else { b.u2u(v, 32) };
        let x32 = widen(b, x);
        let y32 = widen(b, y);
        let product = b.imul(x32, y32);
        let high = if signed {
            b.ishr_imm(product, u32::from(bits))
        } else {
            b.ushr_imm(product, u32::from(bits))
        };
        return if signed { b.i2i(high, bits) } else { b.u2u(high, bits) };
    }

    let half = u32::from(bits) / 2;
    let half_mask = low_mask(half);

    let (mut x, mut y) = (x, y);
    let mut different_signs = None;
    if signed {
        let zero = b.imm_int(0, bits);
        let x_neg = b.ilt(x, zero);
        let y_neg = b.ilt(y, zero);
        different_signs = Some(b.ixor(x_neg, y_neg));
        x = b.iabs(x);
        y = b.iabs(y);
    }

    //   ABCD
    // * EFGH
    // = GH*CD + (GH*AB << h) + (EF*CD << h) + (EF*AB << 2h)
    let xl = b.iand_imm(x, half_mask);
    let yl = b.iand_imm(y, half_mask);
    let xh = b.ushr_imm(x, half);
    let yh = b.ushr_imm(y, half);

    let mut lo = b.imul(xl, yl);
    let m1 = b.imul(xl, yh);
    let m2 = b.imul(xh, yl);
    let mut hi = b.imul(xh, yh);

    for m in [m1, m2] {
        let shifted = b.ishl_imm(m, half);
        let carry = b.uadd_carry(lo, shifted);
        hi = b.iadd(hi, carry);
        lo = b.iadd(lo, shifted);
        let top = b.ushr_imm(m, half);
        hi = b.iadd(hi, top);
    }

    if let Some(different_signs) = different_signs {
        // Negating the double-width product is not the same as negating its
        // high half: -(~hi:~lo + 1) carries out of the low half.
        let not_hi = b.inot(hi);
        let not_lo = b.inot(lo);
        let one = b.imm_int(1, bits);
        let carry = b.uadd_carry(not_lo, one);
        let negated = b.iadd(not_hi, carry);
        hi = b.bcsel(different_signs, negated, hi);
    }
    hi
}

/// Emits a min/max that orders `-0.0` below `+0.0`.
///
/// Equal operands are either the same number or a pair of zeros, and for
/// those the integer min/max of the bit patterns picks the right sign.
pub fn lowered_fminmax_signed_zero(
    b: &mut Builder<'_>,
    x: ValueId,
    y: ValueId,
    max: bool,
) -> ValueId {
    let int_minmax = if max { b.imax(x, y) } else { b.imin(x, y) };

    let saved = b.fast_math;
    b.fast_math = saved.difference(SIGNED_ZERO_PRESERVE);
    let float_minmax = if max { b.fmax(x, y) } else { b.fmin(x, y) };
    b.fast_math = saved;

    let equal = b.feq(x, y);
    b.bcsel(equal, int_minmax, float_minmax)
}

/// Lowers bit tricks, wide multiplies and signed-zero min/max.
pub struct LowerAluPass;

impl Default for LowerAluPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LowerAluPass {
    /// Creates a new ALU lowering pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether `id` has a lowering enabled by `options`.
    fn wants(shader: &Shader, id: InstrId, op: AluOp, options: &CompilerOptions) -> bool {
        let instr = shader.instr(id);
        let Some(dest) = instr.def() else {
            return false;
        };
        let src_bits = instr
            .src(0)
            .as_value()
            .map_or(0, |v| shader.value(v).bit_size());
        match op {
            AluOp::BitfieldReverse => options.lower_bitfield_reverse && src_bits >= 8,
            AluOp::BitCount => options.lower_bit_count && src_bits >= 8,
            AluOp::ImulHigh | AluOp::UmulHigh => options.lower_mul_high,
            AluOp::Fmin | AluOp::Fmax => {
                options.lower_fminmax_signed_zero
                    && instr
                        .fast_math
                        .preserves_signed_zero(shader.value(dest).bit_size())
            }
            _ => false,
        }
    }

    fn lower(shader: &mut Shader, id: InstrId, op: AluOp) -> Option<ValueId> {
        let dest = shader.instr(id).def()?;
        let mut b = Builder::new(shader, Cursor::Before(id));
        b.copy_flags_from(id);

        let x = b.ssa_for_alu_src(id, 0);
        let lowered = match op {
            AluOp::BitfieldReverse => lowered_bitfield_reverse(&mut b, x),
            AluOp::BitCount => lowered_bit_count(&mut b, x),
            AluOp::ImulHigh | AluOp::UmulHigh => {
                let y = b.ssa_for_alu_src(id, 1);
                lowered_mul_high(&mut b, x, y, op == AluOp::ImulHigh)
            }
            AluOp::Fmin | AluOp::Fmax => {
                let y = b.ssa_for_alu_src(id, 1);
                lowered_fminmax_signed_zero(&mut b, x, y, op == AluOp::Fmax)
            }
            _ => return None,
        };

        shader.replace_all_uses(dest, lowered);
        shader.remove_instruction(id);
        Some(lowered)
    }
}

impl ShaderPass for LowerAluPass {
    fn name(&self) -> &'static str {
        "lower_alu"
    }

    fn description(&self) -> &'static str {
        "Lower bit reversal, population count, high multiplies and signed-zero min/max"
    }

    fn should_run(&self, _shader: &Shader, ctx: &CompilerContext) -> bool {
        let o = &ctx.options;
        o.lower_bitfield_reverse || o.lower_bit_count || o.lower_mul_high || o.lower_fminmax_signed_zero
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();

        for id in shader.instr_ids() {
            let Some(op) = shader.instr(id).alu_op() else {
                continue;
            };
            if !Self::wants(shader, id, op, &ctx.options) {
                continue;
            }
            if let Some(lowered) = Self::lower(shader, id, op) {
                changes
                    .record(EventKind::InstructionLowered)
                    .at(shader.name(), id.index())
                    .message(format!("{op} -> {lowered}"));
            }
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        eval::{self, Varyings},
        ShaderStage,
    };

    fn software() -> CompilerContext {
        CompilerContext::new(CompilerOptions::software())
    }

    /// `op(in0, in1)` stored to slot 32, lowered.
    fn lowered_binary(op: AluOp, bits: u8) -> Shader {
        let mut shader = Shader::new(op.to_string(), ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(0, 0, 1, bits);
        let y = b.load_input(1, 0, 1, bits);
        let srcs = &[x, y][..op.num_inputs()];
        let r = b.alu(op, srcs);
        b.store_output(r, 32, 0);

        assert!(LowerAluPass::new().run(&mut shader, &software()).unwrap());
        assert!(shader.instructions().all(|i| i.alu_op() != Some(op)));
        assert!(shader.validate().is_ok());
        shader
    }

    fn eval2(shader: &Shader, x: u64, y: u64) -> u64 {
        let mut inputs = Varyings::new();
        inputs.set(0, 0, x);
        inputs.set(1, 0, y);
        eval::run(shader, &inputs).unwrap().outputs.get(32, 0).unwrap()
    }

    #[test]
    fn test_bitfield_reverse_boundaries() {
        let shader = lowered_binary(AluOp::BitfieldReverse, 32);
        for x in [0u32, 0xffff_ffff, 0x8000_0000, 1, 0x1234_5678] {
            assert_eq!(eval2(&shader, u64::from(x), 0), u64::from(x.reverse_bits()));
        }
    }

    #[test]
    fn test_bitfield_reverse_other_widths() {
        let shader = lowered_binary(AluOp::BitfieldReverse, 16);
        assert_eq!(eval2(&shader, 0x0001, 0), 0x8000);
        assert_eq!(eval2(&shader, 0x1234, 0), u64::from(0x1234u16.reverse_bits()));

        let shader = lowered_binary(AluOp::BitfieldReverse, 64);
        let x = 0x0123_4567_89ab_cdefu64;
        assert_eq!(eval2(&shader, x, 0), x.reverse_bits());
    }

    #[test]
    fn test_bit_count() {
        let shader = lowered_binary(AluOp::BitCount, 32);
        for x in [0u32, 0xffff_ffff, 0x8000_0000, 1, 0xf0f0_0f01] {
            assert_eq!(eval2(&shader, u64::from(x), 0), u64::from(x.count_ones()));
        }
        let shader = lowered_binary(AluOp::BitCount, 64);
        assert_eq!(eval2(&shader, u64::MAX, 0), 64);
    }

    #[test]
    fn test_mul_high() {
        let shader = lowered_binary(AluOp::UmulHigh, 32);
        assert_eq!(eval2(&shader, 0xffff_ffff, 0xffff_ffff), 0xffff_fffe);
        assert_eq!(eval2(&shader, 0x1_0000, 0x1_0000), 1);

        let shader = lowered_binary(AluOp::ImulHigh, 32);
        let neg3 = u64::from((-3i32) as u32);
        // -3 * 2 = -6: the high word is all ones, not zero.
        assert_eq!(eval2(&shader, neg3, 2), 0xffff_ffff);
        assert_eq!(eval2(&shader, neg3, neg3), 0);
        let min = u64::from(i32::MIN as u32);
        assert_eq!(eval2(&shader, min, min), 0x4000_0000);
    }

    #[test]
    fn test_narrow_mul_high() {
        let shader = lowered_binary(AluOp::UmulHigh, 16);
        assert_eq!(eval2(&shader, 0xffff, 0xffff), 0xfffe);
        let shader = lowered_binary(AluOp::ImulHigh, 16);
        assert_eq!(eval2(&shader, 0xfffd, 2), 0xffff);
    }

    #[test]
    fn test_signed_zero_min_max() {
        let mut shader = Shader::new("fmin", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        b.fast_math = FloatControls::SIGNED_ZERO_PRESERVE_FP32;
        let x = b.load_input(0, 0, 1, 32);
        let y = b.load_input(1, 0, 1, 32);
        let lo = b.fmin(x, y);
        let hi = b.fmax(x, y);
        b.store_output(lo, 32, 0);
        b.store_output(hi, 33, 0);

        let ctx = software();
        let pass = LowerAluPass::new();
        assert!(pass.run(&mut shader, &ctx).unwrap());
        assert!(!pass.run(&mut shader, &ctx).unwrap());

        let pos = u64::from(0.0f32.to_bits());
        let neg = u64::from((-0.0f32).to_bits());
        for (a, c) in [(pos, neg), (neg, pos)] {
            let mut inputs = Varyings::new();
            inputs.set(0, 0, a);
            inputs.set(1, 0, c);
            let out = eval::run(&shader, &inputs).unwrap().outputs;
            assert_eq!(out.get(32, 0), Some(neg));
            assert_eq!(out.get(33, 0), Some(pos));
        }
    }

    #[test]
    fn test_disabled_lowerings_leave_shader_alone() {
        let mut shader = Shader::new("off", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(0, 0, 1, 32);
        let r = b.bit_count(x);
        b.store_output(r, 32, 0);

        let ctx = CompilerContext::default();
        assert!(!LowerAluPass::new().should_run(&shader, &ctx));
        assert!(!LowerAluPass::new().run(&mut shader, &ctx).unwrap());
    }

    #[test]
    fn test_replicated_masks() {
        assert_eq!(replicate(0x55, 16), 0x5555);
        assert_eq!(replicate(0x0f, 64), 0x0f0f_0f0f_0f0f_0f0f);
        assert_eq!(replicate_width(8, 32), 0x00ff_00ff);
        assert_eq!(replicate_width(16, 64), 0x0000_ffff_0000_ffff);
    }

    #[test]
    fn test_lowered_fragments_match_native() {
        use crate::test::{
            factories::{binary, unary},
            helpers::{raw_inputs, result},
        };

        let cases = [
            (unary(AluOp::BitfieldReverse, 16), 0x8001u64, 0),
            (unary(AluOp::BitCount, 64), u64::MAX - 1, 0),
            (binary(AluOp::UmulHigh, 64), u64::MAX, 3),
            (binary(AluOp::ImulHigh, 16), 0x8000, 0x7fff),
        ];
        for (native, x, y) in cases {
            let mut lowered = native.clone();
            assert!(LowerAluPass::new().run(&mut lowered, &software()).unwrap());
            let inputs = raw_inputs(x, y);
            assert_eq!(
                result(&lowered, &inputs),
                result(&native, &inputs),
                "{}",
                native.name()
            );
        }
    }
}
