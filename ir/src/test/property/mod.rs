//! Property-based tests for the arithmetic layer.
//!
//! Uses proptest to check that rewrites preserve the value of an expression
//! for every assignment in the bound domain.
