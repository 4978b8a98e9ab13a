use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub browser: BrowserConfig,
    pub selector: SelectorConfig,
    pub fields: FieldConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
    pub navigation_timeout_ms: u64,
}

/// Bounds for the control selector's probe loops. The caps make termination
/// provable: every loop in the selector counts against one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Scroll-probe iterations when the target carries a display label.
    pub label_scroll_cap: u32,
    /// Scroll-probe iterations for code-only targets (machine types can sit
    /// deep inside a virtualized list).
    pub code_scroll_cap: u32,
    /// Reopen attempts after the option list goes empty or detaches.
    pub reopen_attempts: u32,
    /// Pixels per direct-scroll increment.
    pub scroll_step_px: i64,
    /// Consecutive identical highlighted options before the keyboard walk
    /// concludes it hit the end of the list.
    pub stall_limit: u32,
    /// Wait for the option list to appear after opening the control.
    pub open_wait_ms: u64,
    pub poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Maximum increment/decrement presses for the stepper fallback.
    pub stepper_cap: u32,
    /// Pause after a write before re-reading the field.
    pub confirm_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_timeout_ms: u64,
    /// Settle wait after selecting a series; the dependent machine-type list
    /// repopulates asynchronously.
    pub series_settle_ms: u64,
    pub poll_interval_ms: u64,
    /// Budget for the currency-total scan.
    pub total_wait_ms: u64,
    /// Budget for share-surface appearance and URL extraction.
    pub share_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            selector: SelectorConfig::default(),
            fields: FieldConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            args: vec![],
            navigation_timeout_ms: 30_000,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            label_scroll_cap: 40,
            code_scroll_cap: 60,
            reopen_attempts: 3,
            scroll_step_px: 320,
            stall_limit: 3,
            open_wait_ms: 2_000,
            poll_ms: 120,
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            stepper_cap: 20,
            confirm_wait_ms: 150,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 120_000,
            series_settle_ms: 1_200,
            poll_interval_ms: 250,
            total_wait_ms: 15_000,
            share_wait_ms: 15_000,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}
