use base64::Engine as _;
use tracing::{debug, warn};

use crate::core::driver::PageDriver;
use crate::types::{ArtifactBundle, ConsoleLine, Screenshot};

/// Collects screenshots and page console output for post-mortem debugging.
/// Inert by default: the hosted deployment never persists artifacts, so the
/// disabled collector does no page work at all.
pub struct DiagnosticsCollector {
    enabled: bool,
    screenshots: Vec<Screenshot>,
    console: Vec<ConsoleLine>,
}

impl DiagnosticsCollector {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            screenshots: Vec::new(),
            console: Vec::new(),
        }
    }

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            screenshots: Vec::new(),
            console: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Best-effort screenshot; a capture failure is logged and dropped
    /// rather than disturbing the session it is meant to document.
    pub async fn snapshot<D: PageDriver + ?Sized>(&mut self, page: &D, label: &str) {
        if !self.enabled {
            return;
        }
        match page.screenshot().await {
            Ok(bytes) => {
                debug!(label, bytes = bytes.len(), "screenshot captured");
                self.screenshots.push(Screenshot {
                    label: label.to_string(),
                    base64_png: base64::engine::general_purpose::STANDARD.encode(bytes),
                    captured_at: chrono::Utc::now(),
                });
            }
            Err(err) => warn!(label, error = %err, "screenshot capture failed"),
        }
    }

    /// Pull buffered console lines off the page and produce the final
    /// bundle. Returns `None` when disabled so results stay lean.
    pub async fn drain<D: PageDriver + ?Sized>(&mut self, page: &D) -> Option<ArtifactBundle> {
        if !self.enabled {
            return None;
        }
        match page.drain_console().await {
            Ok(mut lines) => self.console.append(&mut lines),
            Err(err) => warn!(error = %err, "console drain failed"),
        }
        Some(ArtifactBundle {
            screenshots: std::mem::take(&mut self.screenshots),
            console: std::mem::take(&mut self.console),
        })
    }
}
