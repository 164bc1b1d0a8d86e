//! Immediates and ALU shorthands.

use crate::{
    ir::{AluOp, Builder, Dest, InstrKind, Instruction, Operand, Swizzle, ValueId},
    utils::{f32_to_f16_bits, low_mask},
};

macro_rules! unary {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, a: ValueId) -> ValueId {
                self.alu(AluOp::$op, &[a])
            }
        )*
    };
}

macro_rules! binary {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, a: ValueId, b: ValueId) -> ValueId {
                self.alu(AluOp::$op, &[a, b])
            }
        )*
    };
}

/// Raw bits of the float `value` at `bit_size`.
///
/// # Panics
///
/// Panics for bit sizes other than 16, 32 and 64.
#[must_use]
pub fn float_bits(value: f64, bit_size: u8) -> u64 {
    match bit_size {
        16 => u64::from(f32_to_f16_bits(value as f32)),
        32 => u64::from((value as f32).to_bits()),
        64 => value.to_bits(),
        _ => panic!("no {bit_size}-bit float format"),
    }
}

impl Builder<'_> {
    /// Constant with one raw bit pattern per component.
    pub fn imm(&mut self, components: &[u64], bit_size: u8) -> ValueId {
        let mask = low_mask(u32::from(bit_size));
        let bits: Vec<u64> = components.iter().map(|c| c & mask).collect();
        let dest = self
            .shader_mut()
            .create_value(bit_size, components.len() as u8);
        self.insert(Instruction::new(
            InstrKind::LoadConst(bits),
            Vec::new(),
            Some(Dest::Value(dest)),
        ));
        dest
    }

    /// Scalar float constant.
    pub fn imm_float(&mut self, value: f64, bit_size: u8) -> ValueId {
        self.imm(&[float_bits(value, bit_size)], bit_size)
    }

    /// Vector float constant.
    pub fn imm_vec_float(&mut self, values: &[f64], bit_size: u8) -> ValueId {
        let bits: Vec<u64> = values.iter().map(|&v| float_bits(v, bit_size)).collect();
        self.imm(&bits, bit_size)
    }

    /// Scalar integer constant (truncated to `bit_size`).
    pub fn imm_int(&mut self, value: i64, bit_size: u8) -> ValueId {
        self.imm(&[value as u64], bit_size)
    }

    /// Scalar unsigned constant (truncated to `bit_size`).
    pub fn imm_uint(&mut self, value: u64, bit_size: u8) -> ValueId {
        self.imm(&[value], bit_size)
    }

    /// 1-bit boolean constant.
    pub fn imm_bool(&mut self, value: bool) -> ValueId {
        self.imm(&[u64::from(value)], 1)
    }

    /// Float constant matching the bit size of `like`.
    pub fn imm_float_like(&mut self, value: f64, like: ValueId) -> ValueId {
        let bits = self.shader().value(like).bit_size();
        self.imm_float(value, bits)
    }

    /// Integer constant matching the bit size of `like`.
    pub fn imm_int_like(&mut self, value: i64, like: ValueId) -> ValueId {
        let bits = self.shader().value(like).bit_size();
        self.imm_int(value, bits)
    }

    /// Undefined value.
    pub fn undef(&mut self, bit_size: u8, num_components: u8) -> ValueId {
        let dest = self.shader_mut().create_value(bit_size, num_components);
        self.insert(Instruction::new(
            InstrKind::Undef,
            Vec::new(),
            Some(Dest::Value(dest)),
        ));
        dest
    }

    unary! {
        /// Untyped copy.
        mov => Mov;
        /// `-a`
        fneg => Fneg;
        /// `|a|`
        fabs => Fabs;
        /// `1 / a`
        frcp => Frcp;
        /// Integer `-a`
        ineg => Ineg;
        /// Integer `|a|`
        iabs => Iabs;
        /// `~a`
        inot => Inot;
        /// Bit reversal.
        bitfield_reverse => BitfieldReverse;
        /// Population count (32-bit result).
        bit_count => BitCount;
        /// Arc tangent.
        atan => Atan;
    }

    binary! {
        /// `a + b`
        fadd => Fadd;
        /// `a * b`
        fmul => Fmul;
        /// Float minimum.
        fmin => Fmin;
        /// Float maximum.
        fmax => Fmax;
        /// `a == b`
        feq => Feq;
        /// `a != b` (unordered)
        fneu => Fneu;
        /// `a < b`
        flt => Flt;
        /// `a >= b`
        fge => Fge;
        /// Integer `a + b`
        iadd => Iadd;
        /// Integer `a - b`
        isub => Isub;
        /// Low half of `a * b`
        imul => Imul;
        /// High half of signed `a * b`
        imul_high => ImulHigh;
        /// High half of unsigned `a * b`
        umul_high => UmulHigh;
        /// Carry out of `a + b`
        uadd_carry => UaddCarry;
        /// `a & b`
        iand => Iand;
        /// `a | b`
        ior => Ior;
        /// `a ^ b`
        ixor => Ixor;
        /// `a << b`
        ishl => Ishl;
        /// Arithmetic `a >> b`
        ishr => Ishr;
        /// Logical `a >> b`
        ushr => Ushr;
        /// Integer `a == b`
        ieq => Ieq;
        /// Integer `a != b`
        ine => Ine;
        /// Signed `a < b`
        ilt => Ilt;
        /// Signed `a >= b`
        ige => Ige;
        /// Unsigned `a < b`
        ult => Ult;
        /// Signed minimum.
        imin => Imin;
        /// Signed maximum.
        imax => Imax;
        /// `atan2(a, b)`
        atan2 => Atan2;
    }

    /// `a * b + c`
    pub fn ffma(&mut self, a: ValueId, b: ValueId, c: ValueId) -> ValueId {
        self.alu(AluOp::Ffma, &[a, b, c])
    }

    /// `cond ? a : b`
    pub fn bcsel(&mut self, cond: ValueId, a: ValueId, b: ValueId) -> ValueId {
        self.alu(AluOp::Bcsel, &[cond, a, b])
    }

    /// `a <= b`
    pub fn fle(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.fge(b, a)
    }

    /// `a <= imm`
    pub fn fle_imm(&mut self, a: ValueId, imm: f64) -> ValueId {
        let c = self.imm_float_like(imm, a);
        self.fge(c, a)
    }

    /// `a >= imm`
    pub fn fge_imm(&mut self, a: ValueId, imm: f64) -> ValueId {
        let c = self.imm_float_like(imm, a);
        self.fge(a, c)
    }

    /// `a * imm`
    pub fn fmul_imm(&mut self, a: ValueId, imm: f64) -> ValueId {
        let c = self.imm_float_like(imm, a);
        self.fmul(a, c)
    }

    /// `a + imm`
    pub fn fadd_imm(&mut self, a: ValueId, imm: f64) -> ValueId {
        let c = self.imm_float_like(imm, a);
        self.fadd(a, c)
    }

    /// `a * imm + c`
    pub fn ffma_imm1(&mut self, a: ValueId, imm: f64, c: ValueId) -> ValueId {
        let k = self.imm_float_like(imm, a);
        self.ffma(a, k, c)
    }

    /// `a * b + imm`
    pub fn ffma_imm2(&mut self, a: ValueId, b: ValueId, imm: f64) -> ValueId {
        let k = self.imm_float_like(imm, a);
        self.ffma(a, b, k)
    }

    /// `a & imm`
    pub fn iand_imm(&mut self, a: ValueId, imm: u64) -> ValueId {
        let bits = self.shader().value(a).bit_size();
        let c = self.imm_uint(imm, bits);
        self.iand(a, c)
    }

    /// `a + imm`
    pub fn iadd_imm(&mut self, a: ValueId, imm: i64) -> ValueId {
        let c = self.imm_int_like(imm, a);
        self.iadd(a, c)
    }

    /// `a * imm`
    pub fn imul_imm(&mut self, a: ValueId, imm: u64) -> ValueId {
        let bits = self.shader().value(a).bit_size();
        let c = self.imm_uint(imm, bits);
        self.imul(a, c)
    }

    /// `a << imm`; the shift count is a 32-bit constant.
    pub fn ishl_imm(&mut self, a: ValueId, imm: u32) -> ValueId {
        let c = self.imm_uint(u64::from(imm), 32);
        self.ishl(a, c)
    }

    /// Arithmetic `a >> imm`.
    pub fn ishr_imm(&mut self, a: ValueId, imm: u32) -> ValueId {
        let c = self.imm_uint(u64::from(imm), 32);
        self.ishr(a, c)
    }

    /// Logical `a >> imm`.
    pub fn ushr_imm(&mut self, a: ValueId, imm: u32) -> ValueId {
        let c = self.imm_uint(u64::from(imm), 32);
        self.ushr(a, c)
    }

    /// `x` with the sign bit of `s` (bitwise, so `-0.0` and NaN signs carry over).
    pub fn copysign(&mut self, x: ValueId, s: ValueId) -> ValueId {
        let bits = u32::from(self.shader().value(x).bit_size());
        let sign = 1u64 << (bits - 1);
        let magnitude = self.iand_imm(x, !sign & low_mask(bits));
        let sign_of_s = self.iand_imm(s, sign);
        self.ior(magnitude, sign_of_s)
    }

    /// Boolean to float of `bit_size`.
    pub fn b2f(&mut self, cond: ValueId, bit_size: u8) -> ValueId {
        self.alu_sized(AluOp::B2f, &[cond], bit_size)
    }

    /// Boolean to integer of `bit_size`.
    pub fn b2i(&mut self, cond: ValueId, bit_size: u8) -> ValueId {
        self.alu_sized(AluOp::B2i, &[cond], bit_size)
    }

    /// Unsigned width conversion; a no-op conversion returns `a`.
    pub fn u2u(&mut self, a: ValueId, bit_size: u8) -> ValueId {
        if self.shader().value(a).bit_size() == bit_size {
            return a;
        }
        self.alu_sized(AluOp::U2u, &[a], bit_size)
    }

    /// Signed width conversion; a no-op conversion returns `a`.
    pub fn i2i(&mut self, a: ValueId, bit_size: u8) -> ValueId {
        if self.shader().value(a).bit_size() == bit_size {
            return a;
        }
        self.alu_sized(AluOp::I2i, &[a], bit_size)
    }

    /// Component `c` of `v` as a scalar.
    pub fn channel(&mut self, v: ValueId, c: u8) -> ValueId {
        self.swizzle(v, &[c])
    }

    /// Components `lanes` of `v` as a new value.
    ///
    /// # Panics
    ///
    /// Panics if a lane names a component `v` does not have.
    pub fn swizzle(&mut self, v: ValueId, lanes: &[u8]) -> ValueId {
        let value = self.shader().value(v);
        let (bits, comps) = (value.bit_size(), value.num_components());
        assert!(
            lanes.iter().all(|&c| c < comps),
            "swizzle {lanes:?} out of range for {v} with {comps} components"
        );
        if lanes.len() == comps as usize && Swizzle::from_lanes(lanes).is_identity(lanes.len()) {
            return v;
        }
        let operand = Operand::value(v).swizzled(lanes);
        self.alu_operands(AluOp::Mov, vec![operand], bits, lanes.len() as u8)
    }

    /// Vector from scalars (a single scalar is returned as is).
    ///
    /// # Panics
    ///
    /// Panics for more than four components or mixed bit sizes.
    pub fn vec(&mut self, comps: &[ValueId]) -> ValueId {
        if let [single] = comps {
            return *single;
        }
        let op = AluOp::vec(comps.len())
            .unwrap_or_else(|| panic!("no vector constructor for {} components", comps.len()));
        self.alu(op, comps)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{AluOp, Builder, Cursor, InstrKind, Shader, ShaderStage};

    #[test]
    fn test_immediates_are_masked() {
        let mut shader = Shader::new("imm", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.imm_int(-1, 16);
        let f = b.imm_float(1.0, 32);
        assert_eq!(shader.const_component(v, 0), Some(0xffff));
        assert_eq!(shader.const_component(f, 0), Some(0x3f80_0000));
    }

    #[test]
    fn test_swizzle_and_vec() {
        let mut shader = Shader::new("swz", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let v = b.imm_vec_float(&[1.0, 2.0, 3.0, 4.0], 32);
        assert_eq!(b.swizzle(v, &[0, 1, 2, 3]), v);
        let yx = b.swizzle(v, &[1, 0]);
        let z = b.channel(v, 2);
        let rebuilt = b.vec(&[z, z, z]);
        assert_eq!(shader.value(yx).num_components(), 2);
        assert_eq!(shader.value(rebuilt).num_components(), 3);
        assert_eq!(shader.def_alu(rebuilt).map(|(_, op)| op), Some(AluOp::Vec3));
        assert!(shader.validate().is_ok());
    }

    #[test]
    fn test_conversions_skip_noops() {
        let mut shader = Shader::new("cvt", ShaderStage::Compute);
        let entry = shader.entry();
        let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        let x = b.imm_int(5, 16);
        assert_eq!(b.u2u(x, 16), x);
        let wide = b.u2u(x, 32);
        assert_eq!(shader.value(wide).bit_size(), 32);
        let cond = shader.num_instructions();
        assert_eq!(cond, 2);
        assert!(matches!(
            shader.def_instr(wide).unwrap().kind(),
            InstrKind::Alu(AluOp::U2u)
        ));
    }
}
