//! Standard exit codes for the server process
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - unreadable secret file, bad flag value
pub const CONFIG_ERROR: i32 = 2;

/// Registry unreachable - neither http nor https answered
pub const REGISTRY_UNREACHABLE: i32 = 3;

/// Scan error - the initial registry scan failed
pub const SCAN_ERROR: i32 = 4;

/// IO error - listener bind failure, etc.
pub const IO_ERROR: i32 = 5;
