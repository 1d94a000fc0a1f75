//! Process-lifetime metrics for the advice generator (spec.md §4.9 `Diagnostics`).

pub mod collector;
pub mod printer;
