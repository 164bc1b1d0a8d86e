//! Software `atan` / `atan2`.
//!
//! Replaces both opcodes with a polynomial approximation for targets without
//! a native arc tangent. `atan` is evaluated on `|u| <= 1`, where `u` is the
//! argument or its reciprocal:
//!
//! ```text
//! atan(u) ~ u * (c11 u^10 + c9 u^8 + c7 u^6 + c5 u^4 + c3 u^2 + c1)
//! atan(x) = sign(x) * (|u| * p(u^2) + (|x| <= 1 ? 0 : -pi/2))
//! ```
//!
//! `atan2(y, x)` rotates the left half-plane by `pi/2` so the reduced ratio
//! never divides by zero on the vertical axis, and scales huge denominators
//! down before taking the reciprocal.

use std::f64::consts::FRAC_PI_2;

use crate::{
    compiler::{pass::ShaderPass, CompilerContext, EventKind, EventLog},
    ir::{AluOp, Builder, Cursor, InstrId, Shader, ValueId},
    Result,
};

/// Minimax coefficients of the odd polynomial, highest degree first.
const ATAN_COEFFS: [f64; 6] = [
    -0.012_132_321_317_344_4,
    0.053_681_378_431_040_6,
    -0.117_350_319_478_685_1,
    0.193_892_497_711_561_0,
    -0.332_675_641_809_124_6,
    0.999_979_312_831_035_5,
];

/// Denominator magnitude above which `atan2` scales its arguments.
fn huge_value(bit_size: u8) -> f64 {
    if bit_size >= 32 {
        1e18
    } else {
        16384.0
    }
}

/// Emits `atan(y_over_x)` at the builder's cursor.
pub fn lowered_atan(b: &mut Builder<'_>, y_over_x: ValueId) -> ValueId {
    let bits = b.shader().value(y_over_x).bit_size();

    let abs = b.fabs(y_over_x);
    let le_1 = b.fle_imm(abs, 1.0);
    let rcp = b.frcp(y_over_x);
    let u = b.bcsel(le_1, y_over_x, rcp);

    let u2 = b.fmul(u, u);
    let mut res = b.imm_float(ATAN_COEFFS[0], bits);
    for &c in &ATAN_COEFFS[1..] {
        res = b.ffma_imm2(res, u2, c);
    }

    let zero = b.imm_float(0.0, bits);
    let minus_half_pi = b.imm_float(-FRAC_PI_2, bits);
    let bias = b.bcsel(le_1, zero, minus_half_pi);

    let abs_u = b.fabs(u);
    let tmp = b.ffma(abs_u, res, bias);
    b.copysign(tmp, y_over_x)
}

/// Emits `atan2(y, x)` at the builder's cursor.
///
/// `|x| == |y|` is treated as a tangent of exactly one, including the origin
/// and the infinite corners, and the sign of the result comes from
/// `min(y, 1 / t) < 0` so a negative zero `y` in the left half-plane still
/// gives `-pi`.
///
/// # Panics
///
/// Panics if `y` and `x` differ in bit size.
pub fn lowered_atan2(b: &mut Builder<'_>, y: ValueId, x: ValueId) -> ValueId {
    let bits = b.shader().value(x).bit_size();
    assert_eq!(
        b.shader().value(y).bit_size(),
        bits,
        "atan2 operands differ in bit size"
    );

    let zero = b.imm_float(0.0, bits);
    let one = b.imm_float(1.0, bits);

    let flip = b.fge(zero, x);
    let abs_x = b.fabs(x);
    let s = b.bcsel(flip, abs_x, y);
    let t = b.bcsel(flip, y, abs_x);

    let abs_t = b.fabs(t);
    let is_huge = b.fge_imm(abs_t, huge_value(bits));
    let quarter = b.imm_float(0.25, bits);
    let scale = b.bcsel(is_huge, quarter, one);
    let scaled_t = b.fmul(t, scale);
    let rcp_scaled_t = b.frcp(scaled_t);
    let scaled_s = b.fmul(s, scale);
    let abs_scaled_s = b.fabs(scaled_s);
    let abs_rcp = b.fabs(rcp_scaled_t);
    let abs_s_over_t = b.fmul(abs_scaled_s, abs_rcp);

    let abs_y = b.fabs(y);
    let diagonal = b.feq(abs_x, abs_y);
    let tan = b.bcsel(diagonal, one, abs_s_over_t);

    let flip_f = b.b2f(flip, bits);
    let atan = lowered_atan(b, tan);
    let arc = b.ffma_imm1(flip_f, FRAC_PI_2, atan);

    let min = b.fmin(y, rcp_scaled_t);
    let negative = b.flt(min, zero);
    let neg_arc = b.fneg(arc);
    b.bcsel(negative, neg_arc, arc)
}

/// Lowers `atan` and `atan2` to arithmetic.
pub struct LowerAtanPass;

impl Default for LowerAtanPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LowerAtanPass {
    /// Creates a new atan lowering pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn lower(shader: &mut Shader, id: InstrId, op: AluOp) -> Option<ValueId> {
        let dest = shader.instr(id).def()?;
        let mut b = Builder::new(shader, Cursor::Before(id));
        b.copy_flags_from(id);

        let y = b.ssa_for_alu_src(id, 0);
        let lowered = if op == AluOp::Atan {
            lowered_atan(&mut b, y)
        } else {
            let x = b.ssa_for_alu_src(id, 1);
            lowered_atan2(&mut b, y, x)
        };

        shader.replace_all_uses(dest, lowered);
        shader.remove_instruction(id);
        Some(lowered)
    }
}

impl ShaderPass for LowerAtanPass {
    fn name(&self) -> &'static str {
        "lower_atan"
    }

    fn description(&self) -> &'static str {
        "Replace atan and atan2 with a minimax polynomial approximation"
    }

    fn should_run(&self, _shader: &Shader, ctx: &CompilerContext) -> bool {
        !ctx.options.has_atan
    }

    fn run(&self, shader: &mut Shader, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();

        for id in shader.instr_ids() {
            let op = match shader.instr(id).alu_op() {
                Some(op @ (AluOp::Atan | AluOp::Atan2)) => op,
                _ => continue,
            };
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
    use crate::{
        compiler::CompilerOptions,
        ir::{
            eval::{self, Varyings},
            ShaderStage,
        },
    };

    fn atan2_shader() -> Shader {
        let mut shader = Shader::new("atan2", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let y = b.load_input(32, 0, 1, 32);
        let x = b.load_input(32, 1, 1, 32);
        let r = b.atan2(y, x);
        b.store_output(r, 32, 0);
        shader
    }

    fn eval_at(shader: &Shader, y: f32, x: f32) -> f32 {
        let mut inputs = Varyings::new();
        inputs.set_f32(32, 0, y);
        inputs.set_f32(32, 1, x);
        eval::run(shader, &inputs)
            .unwrap()
            .outputs
            .get_f32(32, 0)
            .unwrap()
    }

    #[test]
    fn test_lowers_and_is_idempotent() {
        let mut shader = atan2_shader();
        let ctx = CompilerContext::default();
        let pass = LowerAtanPass::new();
        assert!(pass.run(&mut shader, &ctx).unwrap());
        assert!(shader
            .instructions()
            .all(|i| !matches!(i.alu_op(), Some(AluOp::Atan | AluOp::Atan2))));
        assert!(shader.validate().is_ok());
        assert!(!pass.run(&mut shader, &ctx).unwrap());
        assert_eq!(ctx.events.count_kind(EventKind::InstructionLowered), 1);
    }

    #[test]
    fn test_quadrants() {
        let mut shader = atan2_shader();
        LowerAtanPass::new()
            .run(&mut shader, &CompilerContext::default())
            .unwrap();

        for &(y, x) in &[
            (1.0f32, 2.0f32),
            (2.0, -1.0),
            (-3.0, -0.5),
            (-0.25, 4.0),
            (0.0, 1.0),
            (1.0, 0.0),
            (-1.0, 0.0),
            (5.0, 5.0),
            (5.0, -5.0),
            (1e20, 1e-3),
        ] {
            let got = eval_at(&shader, y, x);
            let want = y.atan2(x);
            assert!((got - want).abs() < 1e-5, "atan2({y}, {x}) = {got}, want {want}");
        }
    }

    #[test]
    fn test_signed_zero_on_negative_axis() {
        let mut shader = atan2_shader();
        LowerAtanPass::new()
            .run(&mut shader, &CompilerContext::default())
            .unwrap();
        let pi = std::f32::consts::PI;
        assert!((eval_at(&shader, 0.0, -1.0) - pi).abs() < 1e-5);
        assert!((eval_at(&shader, -0.0, -1.0) + pi).abs() < 1e-5);
    }

    #[test]
    fn test_origin_is_finite_and_follows_y_sign() {
        let mut shader = atan2_shader();
        LowerAtanPass::new()
            .run(&mut shader, &CompilerContext::default())
            .unwrap();
        let three_quarter_pi = 3.0 * std::f32::consts::FRAC_PI_4;

        // The origin counts as a diagonal in the flipped half-plane.
        for &(y, x) in &[(0.0f32, 0.0f32), (0.0, -0.0), (-0.0, 0.0), (-0.0, -0.0)] {
            let got = eval_at(&shader, y, x);
            assert!(got.is_finite(), "atan2({y}, {x}) = {got}");
            assert_eq!(got.is_sign_negative(), y.is_sign_negative(), "atan2({y}, {x}) = {got}");
            assert!((got.abs() - three_quarter_pi).abs() < 1e-5, "atan2({y}, {x}) = {got}");
        }
    }

    #[test]
    fn test_single_argument_atan() {
        let mut shader = Shader::new("atan", ShaderStage::Fragment);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.load_input(32, 0, 1, 32);
        let r = b.atan(x);
        b.store_output(r, 32, 0);
        LowerAtanPass::new()
            .run(&mut shader, &CompilerContext::default())
            .unwrap();

        for &v in &[-100.0f32, -1.0, -0.3, 0.0, 0.7, 1.0, 3.5, 1e6] {
            let mut inputs = Varyings::new();
            inputs.set_f32(32, 0, v);
            let got = eval::run(&shader, &inputs)
                .unwrap()
                .outputs
                .get_f32(32, 0)
                .unwrap();
            assert!((got - v.atan()).abs() < 1e-5, "atan({v}) = {got}");
        }
    }

    #[test]
    fn test_native_atan_skips_pass() {
        let shader = atan2_shader();
        let ctx = CompilerContext::new(CompilerOptions::native());
        assert!(!LowerAtanPass::new().should_run(&shader, &ctx));
        assert!(LowerAtanPass::new().should_run(&shader, &CompilerContext::default()));
    }
}
