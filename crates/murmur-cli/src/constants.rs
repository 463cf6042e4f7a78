//! Constants used throughout the CLI.

/// Exit codes for the CLI.
///
/// These follow common Unix conventions:
/// - 0: Success
/// - 1: General error (used by anyhow for unhandled errors)
/// - 2: Misuse of shell command (reserved by shells)
/// - 3+: Application-specific errors
pub mod exit_codes {
    /// Resource not found (config, journal, entry, tag).
    pub const NOT_FOUND: i32 = 3;

    /// Invalid user input or arguments.
    pub const INVALID_INPUT: i32 = 4;

    /// Authentication failed (wrong PIN, too many attempts).
    pub const AUTH_FAILED: i32 = 5;

    /// Integrity check failed.
    pub const INTEGRITY_FAILED: i32 = 6;
}

/// Environment variables read by the CLI.
pub mod env {
    /// Journal database path
    pub const JOURNAL: &str = "MURMUR_JOURNAL";

    /// Config file path
    pub const CONFIG: &str = "MURMUR_CONFIG";

    /// Non-interactive PIN
    pub const PIN: &str = "MURMUR_PIN";

    /// Log filter (tracing `EnvFilter` syntax)
    pub const LOG: &str = "MURMUR_LOG";
}
