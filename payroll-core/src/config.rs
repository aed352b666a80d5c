use serde::{Deserialize, Serialize};

/// Engine settings, read from the `[engine]` table of the CLI config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollConfig {
    /// Decimal places money is rounded to. Zero means whole currency units.
    pub currency_scale: u32,

    /// Upper bound on employees computed at once during generation.
    pub max_concurrency: usize,

    /// When set, the approver must differ from the user who created the run
    /// and from the user who submitted it for review.
    pub require_distinct_approver: bool,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            currency_scale: 0,
            max_concurrency: 8,
            require_distinct_approver: false,
        }
    }
}

impl PayrollConfig {
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}
