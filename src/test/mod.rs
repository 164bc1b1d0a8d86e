//! Shared fixtures for the unit tests.
//!
//! - [`factories`] - small shaders exercising one pattern each
//! - [`helpers`] - running shaders before and after a pass and comparing

pub mod factories;
pub mod helpers;
