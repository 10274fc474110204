//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the mock link or the host builds of the adapters. All tests
//! run on the host with no real hardware required.

mod discovery_tests;
mod handshake_tests;
mod mock_link;
mod ota_tests;
mod transport_tests;
