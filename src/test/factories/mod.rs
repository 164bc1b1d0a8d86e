//! Shader factories.
//!
//! Every factory reads its inputs from location 32 (`x` in component 0, `y`
//! in component 1) and stores its result to location 32, component 0.

use crate::ir::{AluOp, Builder, Cursor, Shader, ShaderStage, ValueId};

/// Location all factories read and write.
pub const LOCATION: u32 = 32;

fn inputs(b: &mut Builder<'_>, bits: u8) -> (ValueId, ValueId) {
    let x = b.load_input(LOCATION, 0, 1, bits);
    let y = b.load_input(LOCATION, 1, 1, bits);
    (x, y)
}

/// `op(x, y)` on `bits`-wide scalars.
pub fn binary(op: AluOp, bits: u8) -> Shader {
    let mut shader = Shader::new(format!("{op}{bits}"), ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let (x, y) = inputs(&mut b, bits);
    let r = b.alu(op, &[x, y]);
    b.store_output(r, LOCATION, 0);
    shader
}

/// `op(x)` on a `bits`-wide scalar.
pub fn unary(op: AluOp, bits: u8) -> Shader {
    let mut shader = Shader::new(format!("{op}{bits}"), ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let (x, _) = inputs(&mut b, bits);
    let r = b.alu(op, &[x]);
    b.store_output(r, LOCATION, 0);
    shader
}

/// `x < y ? x * 3.0 : y * 3.0`, the shape select hoisting rewrites.
pub fn select_of_products() -> Shader {
    let mut shader = Shader::new("select", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let (x, y) = inputs(&mut b, 32);
    let c = b.flt(x, y);
    let three = b.imm_float(3.0, 32);
    let then_val = b.fmul(x, three);
    let else_val = b.fmul(y, three);
    let r = b.bcsel(c, then_val, else_val);
    b.store_output(r, LOCATION, 0);
    shader
}

/// The same select written as an `if` with a phi at the merge.
pub fn diamond_of_sums() -> Shader {
    let mut shader = Shader::new("diamond", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let (x, y) = inputs(&mut b, 32);
    let c = b.flt(x, y);
    let one = b.imm_float(1.0, 32);
    let ifb = b.push_if(c);
    let then_val = b.fadd(x, one);
    b.set_cursor(Cursor::BlockEnd(ifb.else_block));
    let else_val = b.fadd(y, one);
    b.set_cursor(Cursor::BlockEnd(ifb.merge_block));
    let r = b.phi(&[(ifb.then_block, then_val), (ifb.else_block, else_val)]);
    b.set_cursor(Cursor::BlockEnd(ifb.merge_block));
    b.store_output(r, LOCATION, 0);
    shader
}
