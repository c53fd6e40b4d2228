//! Schedule configuration.
//!
//! Built explicitly with the bon builder or read from the environment.

use bon::bon;

// ============================================================================
// SCHEDULE CONFIGURATION
// ============================================================================

/// Behavior switches of a [`Schedule`](crate::Schedule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Check the well-formedness of the program after every replacement.
    pub verify: bool,

    /// Record applied primitives into the trace.
    pub record_trace: bool,

    /// Default for primitives called without an explicit `preserve_unit_iters`.
    pub preserve_unit_iters: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[bon]
impl ScheduleConfig {
    #[builder]
    pub fn new(
        #[builder(default = false)] verify: bool,
        #[builder(default = true)] record_trace: bool,
        #[builder(default = true)] preserve_unit_iters: bool,
    ) -> Self {
        Self { verify, record_trace, preserve_unit_iters }
    }

    /// Configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_VERIFY=1` - Verify the program after every replacement
    /// * `TESSERA_NO_TRACE=1` - Do not record a trace
    /// * `TESSERA_PRESERVE_UNIT_ITERS=0|1` - Default for `preserve_unit_iters`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            verify: env_flag("TESSERA_VERIFY").unwrap_or(defaults.verify),
            record_trace: !env_flag("TESSERA_NO_TRACE").unwrap_or(!defaults.record_trace),
            preserve_unit_iters: env_flag("TESSERA_PRESERVE_UNIT_ITERS").unwrap_or(defaults.preserve_unit_iters),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
