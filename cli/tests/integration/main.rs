//! Integration tests for unirun
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! They never start a virtual machine.

mod cli_tests;
mod targets_command;
