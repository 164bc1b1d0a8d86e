//! IR integration tests.
//!
//! These tests drive the shader through its public mutation API and check
//! that use sets, phi placement, the CFG and the analysis cache stay
//! consistent:
//! 1. Build shaders with the `Builder`
//! 2. Rewrite them with the `Shader` mutation methods
//! 3. Validate, and compare behavior with the reference interpreter

use shadeopt::{
    analysis::{AnalysisKind, DependencyMask, Dominance},
    ir::{
        eval::{self, Varyings},
        AluOp, Builder, Cursor, Instruction, InstrKind, Operand, Shader, ShaderStage, Src,
        Terminator, Use,
    },
    Error, Result,
};

fn eval_one(shader: &Shader, x: f32) -> Result<f32> {
    let mut inputs = Varyings::new();
    inputs.set_f32(32, 0, x);
    let out = eval::run(shader, &inputs)?.outputs;
    Ok(out.get_f32(32, 0).unwrap_or(f32::NAN))
}

#[test]
fn test_replace_all_uses_rewires_every_reader() -> Result<()> {
    let mut shader = Shader::new("rauw", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    let two = b.imm_float(2.0, 32);
    let doubled = b.fmul(x, two);
    let sum = b.fadd(doubled, doubled);
    b.store_output(sum, 32, 0);

    let add = shader.value(sum).parent().unwrap();
    let mut b = Builder::new(&mut shader, Cursor::Before(add));
    let tripled = b.fmul_imm(x, 3.0);
    shader.replace_all_uses(doubled, tripled);

    assert!(!shader.value(doubled).has_uses());
    assert_eq!(shader.value(tripled).use_count(), 2);
    assert_eq!(shader.instr(add).src(1).as_value(), Some(tripled));
    shader.validate()?;

    assert_eq!(eval_one(&shader, 3.0)?, 18.0);
    Ok(())
}

#[test]
fn test_remove_and_insert_keep_use_sets() -> Result<()> {
    let mut shader = Shader::new("uses", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    let neg = b.fneg(x);
    let abs = b.fabs(neg);
    b.store_output(abs, 32, 0);

    let abs_instr = shader.value(abs).parent().unwrap();
    shader.set_operand(abs_instr, 0, Operand::value(x).negated());
    assert!(!shader.value(neg).has_uses());
    shader.remove_instruction(shader.value(neg).parent().unwrap());

    assert!(shader
        .value(x)
        .uses()
        .any(|u| u == Use::src(abs_instr, 0)));
    shader.validate()?;
    assert_eq!(eval_one(&shader, -1.5)?, 1.5);
    Ok(())
}

#[test]
#[should_panic(expected = "still has")]
fn test_removing_used_instruction_panics() {
    let mut shader = Shader::new("used", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    b.store_output(x, 32, 0);
    shader.remove_instruction(shader.value(x).parent().unwrap());
}

#[test]
#[should_panic]
fn test_phi_after_non_phi_panics() {
    let mut shader = Shader::new("phi_order", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    let c = b.fge_imm(x, 0.0);
    let ifb = b.push_if(c);
    b.set_cursor(Cursor::BlockEnd(ifb.merge_block));
    b.store_output(x, 32, 0);

    let dest = shader.create_value(32, 1);
    let phi = Instruction::new(
        InstrKind::Phi(vec![ifb.then_block, ifb.else_block]),
        vec![Operand::value(x), Operand::value(x)],
        Some(shadeopt::ir::Dest::Value(dest)),
    );
    shader.insert_instruction(Cursor::BlockEnd(ifb.merge_block), phi);
}

#[test]
fn test_if_diamond_evaluates_both_paths() -> Result<()> {
    let mut shader = Shader::new("diamond", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    let c = b.fge_imm(x, 0.0);
    let ifb = b.push_if(c);
    let t = b.fmul_imm(x, 2.0);
    b.set_cursor(Cursor::BlockEnd(ifb.else_block));
    let e = b.fneg(x);
    b.set_cursor(Cursor::BlockEnd(ifb.merge_block));
    let r = b.phi(&[(ifb.then_block, t), (ifb.else_block, e)]);
    b.store_output(r, 32, 0);

    shader.validate()?;
    assert_eq!(shader.predecessors(ifb.merge_block).len(), 2);
    assert_eq!(shader.phi_count(ifb.merge_block), 1);
    assert_eq!(eval_one(&shader, 4.0)?, 8.0);
    assert_eq!(eval_one(&shader, -4.0)?, 4.0);
    Ok(())
}

#[test]
fn test_analysis_cache_invalidation() {
    let mut shader = Shader::new("cache", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    let c = b.fge_imm(x, 0.0);
    let ifb = b.push_if(c);
    b.set_cursor(Cursor::BlockEnd(ifb.merge_block));
    b.store_output(x, 32, 0);

    let dom = shader.require::<Dominance>();
    assert!(dom.dominates(entry, ifb.merge_block));
    assert!(shader.metadata().is_cached(AnalysisKind::Dominance));

    // Instruction edits leave the dominator tree alone.
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(ifb.then_block));
    b.imm_int(1, 32);
    assert!(shader.metadata().is_cached(AnalysisKind::Dominance));
    let hits = shader.metadata().hits();
    let again = shader.require::<Dominance>();
    assert_eq!(shader.metadata().hits(), hits + 1);
    assert_eq!(again.immediate_dominator(ifb.merge_block), Some(entry));

    // CFG edits drop it.
    shader.set_terminator(ifb.then_block, Terminator::Return);
    assert!(!shader.metadata().is_cached(AnalysisKind::Dominance));
    let rebuilt = shader.require::<Dominance>();
    assert_eq!(rebuilt.immediate_dominator(ifb.merge_block), Some(ifb.else_block));
}

#[test]
fn test_explicit_invalidation() {
    let mut shader = Shader::new("explicit", ShaderStage::Compute);
    let _ = shader.require::<Dominance>();
    shader.invalidate(DependencyMask::INSTRUCTIONS);
    assert!(shader.metadata().is_cached(AnalysisKind::Dominance));
    shader.invalidate(DependencyMask::all());
    assert!(!shader.metadata().is_cached(AnalysisKind::Dominance));
}

#[test]
fn test_split_block_moves_tail() -> Result<()> {
    let mut shader = Shader::new("split", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 1, 32);
    let y = b.fmul(x, x);
    let store = b.store_output(y, 32, 0);

    let tail = shader.split_block_before(store);
    assert_eq!(shader.instr(store).block(), tail);
    assert_eq!(shader.successors(entry), vec![tail]);
    shader.validate()?;
    assert_eq!(eval_one(&shader, 3.0)?, 9.0);
    Ok(())
}

#[test]
fn test_interpreter_reports_read_before_definition() {
    let mut shader = Shader::new("dangling", ShaderStage::Fragment);
    let entry = shader.entry();
    let orphan = shader.create_value(32, 1);
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    b.insert(Instruction::alu(
        AluOp::Mov,
        vec![Operand::value(orphan)],
        shadeopt::ir::Dest::Value(orphan),
    ));
    let x = b.load_input(32, 0, 1, 32);
    b.store_output(x, 32, 0);

    // The mov reads its own result.
    let err = eval::run(&shader, &Varyings::new()).unwrap_err();
    assert!(matches!(err, Error::Malformed { .. }));
}

#[test]
fn test_display_lists_instructions() {
    let mut shader = Shader::new("print", ShaderStage::Fragment);
    let entry = shader.entry();
    let mut b = Builder::new(&mut shader, Cursor::BlockEnd(entry));
    let x = b.load_input(32, 0, 4, 32);
    let w = b.channel(x, 3);
    b.store_output(w, 32, 0);

    let text = shader.to_string();
    assert!(text.contains("load_input"));
    assert!(text.contains("store_output"));
    assert!(shader
        .instructions()
        .all(|i| i.srcs().iter().all(|s| !matches!(s.src, Src::Reg(_)))));
}
