//! Lowering configuration.

/// Per-run configuration for the lowering pipeline.
///
/// A `Config` is cheap to clone and carries no per-method state; all
/// method-scoped bookkeeping lives in the lowering session itself.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tolerate structurally deficient input where a safe substitute exists.
    ///
    /// Currently this only affects concrete methods with an empty instruction
    /// list, which lower to `throw new AssertionError()` instead of failing.
    pub tolerant: bool,

    /// Copy line-number markers onto emitted statements.
    pub emit_line_numbers: bool,

    /// Honor local-variable-table names and declared types. When disabled,
    /// every local gets a synthetic slot-derived identity.
    pub use_debug_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tolerant: false,
            emit_line_numbers: true,
            use_debug_names: true,
        }
    }
}
