//! Engine tuning options.

use crate::populate::DateFormat;

/// Options shared by every query an [`Engine`](crate::Engine) runs.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Rows fetched per window by streaming results.
    pub fetch_size: usize,
    /// Criteria tree nesting budget enforced at compile time.
    pub max_criteria_depth: usize,
    /// How date-kind fields are rendered into result rows.
    pub date_format: DateFormat,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fetch_size: 256,
            max_criteria_depth: 64,
            date_format: DateFormat::Iso8601,
        }
    }
}

impl EngineOptions {
    /// Options rendering dates as date objects instead of ISO-8601 strings.
    pub fn with_date_objects() -> Self {
        Self {
            date_format: DateFormat::DateObject,
            ..Self::default()
        }
    }
}
