use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::types::ConsoleLine;

/// Snapshot of one currently-rendered option inside a list surface.
/// Virtualized lists only render a window, so the set of snapshots changes
/// as the list scrolls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedOption {
    pub id: Option<String>,
    /// Structural attribute value (`data-value` or `value`), if declared.
    pub value: Option<String>,
    pub label: String,
    pub selected: bool,
}

/// One driven page. Every engine component observes and mutates the target
/// UI exclusively through this seam, which keeps the selector, field setter,
/// sequencer and controller testable against a scripted fake.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Set a field's value in one shot and fire the input events the page
    /// listens for.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Character-by-character typing into a focused field.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Press a key against the current focus target, e.g. "Enter", "Tab",
    /// "ArrowDown", "PageDown", "Escape".
    async fn press_key(&self, key: &str) -> Result<()>;

    async fn read_value(&self, selector: &str) -> Result<String>;

    async fn read_text(&self, selector: &str) -> Result<String>;

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>>;

    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Options currently rendered inside the list surface. Errors when the
    /// list itself is missing or detached.
    async fn options(&self, list_selector: &str) -> Result<Vec<RenderedOption>>;

    /// The option the list currently highlights for keyboard navigation.
    async fn active_option(&self, list_selector: &str) -> Result<Option<RenderedOption>>;

    /// Click the nth currently-rendered option of the list.
    async fn click_option(&self, list_selector: &str, index: usize) -> Result<()>;

    async fn scroll_list(&self, list_selector: &str, delta_px: i64) -> Result<()>;

    async fn body_text(&self) -> Result<String>;

    async fn inner_html(&self, selector: &str) -> Result<String>;

    async fn read_clipboard(&self) -> Result<String>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn current_url(&self) -> Result<String>;

    /// Install the page-side console capture hook. No-op by default.
    async fn install_console_hook(&self) -> Result<()> {
        Ok(())
    }

    /// Drain captured console lines. Empty unless a hook is installed.
    async fn drain_console(&self) -> Result<Vec<ConsoleLine>> {
        Ok(Vec::new())
    }

    /// Poll until `selector` is present, bounded by `timeout_ms`.
    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            if self.exists(selector).await? {
                return Ok(());
            }
            if started.elapsed().as_millis() as u64 >= timeout_ms {
                return Err(EngineError::Timeout {
                    waiting_for: selector.to_string(),
                    elapsed_ms: timeout_ms,
                });
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
