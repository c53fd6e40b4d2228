//! Property-based tests for binding division and region relaxation.
//!
//! Uses proptest to check that divided bindings recombine to the original
//! binding at every point of the loop domain, and that relaxed regions stay
//! inside the buffer.

#[cfg(test)]
mod division_props;
