//! Built-in shader passes.
//!
//! | Pass | Name | Phase | Effect |
//! |------|------|-------|--------|
//! | [`LowerAtanPass`] | `lower_atan` | lower | `atan`/`atan2` to a polynomial |
//! | [`LowerAluPass`] | `lower_alu` | lower | bit reverse, popcount, mul-high, signed-zero min/max |
//! | [`OptSelectPass`] | `opt_select` | optimize | `bcsel(c, op(a), op(b))` to `op(bcsel(c, a, b))` |
//! | [`CopyPropagationPass`] | `copy_prop` | normalize | folds moves and modifiers into users |
//! | [`DeadCodePass`] | `dce` | normalize | removes unused instructions and unreachable blocks |
//! | [`InsertLoadRegPass`] | `insert_load_reg` | late | loads non-SSA register sources |
//! | [`LowerLoadRegPass`] | `lower_load_reg` | late | expands loads into register moves |
//!
//! The lowering helpers each pass is built from are exported as well, so
//! other passes can emit the same sequences.

mod copy_prop;
mod dce;
mod load_reg;
mod lower_alu;
mod lower_atan;
mod opt_select;

pub use copy_prop::CopyPropagationPass;
pub use dce::DeadCodePass;
pub use load_reg::{InsertLoadRegPass, LowerLoadRegPass};
pub use lower_alu::{
    lowered_bit_count, lowered_bitfield_reverse, lowered_fminmax_signed_zero, lowered_mul_high,
    LowerAluPass,
};
pub use lower_atan::{lowered_atan, lowered_atan2, LowerAtanPass};
pub use opt_select::OptSelectPass;
