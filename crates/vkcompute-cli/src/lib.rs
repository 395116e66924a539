//! Library half of the `vkcompute` binary, exposed for tests.

pub mod commands;
pub mod config;
pub mod exit;
pub mod manifest;
