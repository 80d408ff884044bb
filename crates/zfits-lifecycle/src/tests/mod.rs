//! Test suites for the writer lifecycle.

mod behaviour;
mod support;
