//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters or the crate's simulation backends.  All tests
//! run on the host (x86_64) with no real hardware required.

mod mock_hw;
mod ota_flow_tests;
mod portal_flow_tests;
mod runtime_tests;
