//! Integration test suite for Juris-Harvest
//!
//! These tests drive full harvest cycles against wiremock sites with an
//! in-process SQLite store.

mod harvest_tests;
