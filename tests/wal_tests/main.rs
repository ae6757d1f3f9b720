//! Integration tests for the dirwal write-ahead log
//!
//! Grouped by component, leaves first.

mod file_manager_tests;
