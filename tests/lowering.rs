//! Property-based tests for the lowering passes
//!
//! Every lowered sequence is run through the reference interpreter and
//! compared bit for bit with the native operation it replaces, over random
//! operands and the boundary values that trip up mask and carry logic.

use proptest::prelude::*;
use shadeopt::{
    compiler::{CompilerContext, CompilerOptions, LowerAluPass, LowerAtanPass, ShaderPass},
    ir::{
        eval::{self, Varyings},
        AluOp, Builder, Cursor, FloatControls, Shader, ShaderStage,
    },
};

fn mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// `op(x[, y])` stored to VAR0.x, with float controls `controls`.
fn single_op(op: AluOp, bits: u8, controls: FloatControls) -> Shader {
    let mut shader = Shader::new(format!("{op}{bits}"), ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    b.fast_math = controls;
    let x = b.load_input(32, 0, 1, bits);
    let y = b.load_input(32, 1, 1, bits);
    let srcs = [x, y];
    let r = b.alu(op, &srcs[..op.num_inputs()]);
    b.store_output(r, 32, 0);
    shader
}

fn result(shader: &Shader, x: u64, y: u64) -> u64 {
    let mut inputs = Varyings::new();
    inputs.set(32, 0, x);
    inputs.set(32, 1, y);
    eval::run(shader, &inputs)
        .unwrap()
        .outputs
        .get(32, 0)
        .unwrap()
}

/// Native and lowered results of `op` on `x`, `y`.
fn both(op: AluOp, bits: u8, controls: FloatControls, x: u64, y: u64) -> (u64, u64) {
    let native = single_op(op, bits, controls);
    let mut lowered = native.clone();
    let ctx = CompilerContext::new(CompilerOptions::software());
    assert!(LowerAluPass::new().run(&mut lowered, &ctx).unwrap());
    assert!(lowered.instructions().all(|i| i.alu_op() != Some(op)));
    lowered.validate().unwrap();
    (result(&native, x, y), result(&lowered, x, y))
}

fn operand(bits: u8) -> impl Strategy<Value = u64> {
    let m = mask(bits);
    prop_oneof![
        any::<u64>().prop_map(move |v| v & m),
        Just(0),
        Just(1),
        Just(m),
        Just(m >> 1),
        Just((m >> 1) + 1),
    ]
}

proptest! {
    #[test]
    fn prop_bitfield_reverse_32(x in operand(32)) {
        let (want, got) = both(AluOp::BitfieldReverse, 32, FloatControls::empty(), x, 0);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_bitfield_reverse_64(x in operand(64)) {
        let (want, got) = both(AluOp::BitfieldReverse, 64, FloatControls::empty(), x, 0);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_bit_count(bits in prop::sample::select(vec![8u8, 16, 32, 64]), raw in any::<u64>()) {
        let x = raw & mask(bits);
        let (want, got) = both(AluOp::BitCount, bits, FloatControls::empty(), x, 0);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_umul_high(
        bits in prop::sample::select(vec![8u8, 16, 32, 64]),
        raw_x in any::<u64>(),
        raw_y in any::<u64>(),
    ) {
        let (x, y) = (raw_x & mask(bits), raw_y & mask(bits));
        let (want, got) = both(AluOp::UmulHigh, bits, FloatControls::empty(), x, y);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_imul_high_32(x in operand(32), y in operand(32)) {
        let (want, got) = both(AluOp::ImulHigh, 32, FloatControls::empty(), x, y);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_imul_high_64(x in operand(64), y in operand(64)) {
        let (want, got) = both(AluOp::ImulHigh, 64, FloatControls::empty(), x, y);
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_signed_zero_min_max(
        x in prop_oneof![Just(0.0f32), Just(-0.0f32), -1e3f32..1e3f32],
        y in prop_oneof![Just(0.0f32), Just(-0.0f32), -1e3f32..1e3f32],
        max in any::<bool>(),
    ) {
        let op = if max { AluOp::Fmax } else { AluOp::Fmin };
        let sz = FloatControls::SIGNED_ZERO_PRESERVE_FP32;
        let (want, got) = both(op, 32, sz, u64::from(x.to_bits()), u64::from(y.to_bits()));
        prop_assert_eq!(got, want);
    }

    #[test]
    fn prop_atan2_accuracy(y in -1e4f32..1e4f32, x in -1e4f32..1e4f32) {
        let mut shader = single_op(AluOp::Atan2, 32, FloatControls::empty());
        LowerAtanPass::new()
            .run(&mut shader, &CompilerContext::default())
            .unwrap();
        let got = f32::from_bits(result(&shader, u64::from(y.to_bits()), u64::from(x.to_bits())) as u32);
        prop_assert!((got - y.atan2(x)).abs() < 1e-5, "atan2({}, {}) = {}", y, x, got);
    }
}
