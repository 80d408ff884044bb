use camino::Utf8PathBuf;

/// Executable launched when no writer binary is configured.
pub const DEFAULT_WRITER_BINARY: &str = "ZFitsWriter";

/// Milliseconds the allocate step waits for a freshly spawned writer to settle.
pub const DEFAULT_READINESS_DELAY_MS: u64 = 3_000;

/// Milliseconds a writer may take to exit after SIGTERM before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Filter applied to controller events when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default writer executable.
pub fn default_writer_binary() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_WRITER_BINARY)
}

/// Default readiness delay in milliseconds.
pub const fn default_readiness_delay_ms() -> u64 {
    DEFAULT_READINESS_DELAY_MS
}

/// Default shutdown grace period in milliseconds.
pub const fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

/// Borrowed form of [`DEFAULT_LOG_FILTER`].
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Serde default for `Config::log_filter`.
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Controllers log JSON unless told otherwise.
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Writer output is logged alongside controller events unless tuned down.
pub const fn default_writer_output() -> crate::logging::WriterOutputLevel {
    crate::logging::WriterOutputLevel::Info
}
