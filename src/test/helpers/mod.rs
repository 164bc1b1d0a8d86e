//! Evaluation helpers.

use crate::{
    ir::{
        eval::{self, Varyings},
        Shader,
    },
    test::factories::LOCATION,
};

/// Inputs for the factory shaders from raw bits.
pub fn raw_inputs(x: u64, y: u64) -> Varyings {
    let mut inputs = Varyings::new();
    inputs.set(LOCATION, 0, x);
    inputs.set(LOCATION, 1, y);
    inputs
}

/// Inputs for the factory shaders from floats.
pub fn float_inputs(x: f32, y: f32) -> Varyings {
    raw_inputs(u64::from(x.to_bits()), u64::from(y.to_bits()))
}

/// Raw bits of the factory shaders' result.
pub fn result(shader: &Shader, inputs: &Varyings) -> u64 {
    eval::run(shader, inputs)
        .unwrap()
        .outputs
        .get(LOCATION, 0)
        .unwrap()
}

/// Asserts that `before` and `after` write bit-identical outputs for every
/// input set in `samples`.
pub fn assert_same_outputs(before: &Shader, after: &Shader, samples: &[Varyings]) {
    for inputs in samples {
        let want = eval::run(before, inputs).unwrap().outputs;
        let got = eval::run(after, inputs).unwrap().outputs;
        assert_eq!(got, want, "{} diverges on {inputs:?}", after.name());
    }
}
