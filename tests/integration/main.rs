// Integration tests against the fixture projects in tests/fixtures
mod common;

mod build_tests;
mod interop_tests;
mod production_tests;
mod splitting_tests;
