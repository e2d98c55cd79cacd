//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the engine end to end
//! against the cuff simulator.  All tests run on the host with no real
//! hardware required.

mod bench;
mod session_tests;
