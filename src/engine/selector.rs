use std::time::Duration;

use tracing::{debug, warn};

use crate::core::config::SelectorConfig;
use crate::core::driver::{PageDriver, RenderedOption};
use crate::engine::surface::ControlRef;
use crate::errors::{EngineError, Result};

/// What the selector wants to find: a structural code, a display label, or
/// both. Code-only targets get the deeper scroll budget since machine-type
/// lists run long.
#[derive(Debug, Clone, Default)]
pub struct OptionTarget {
    pub code: Option<String>,
    pub label: Option<String>,
}

impl OptionTarget {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            label: None,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            code: None,
            label: Some(label.into()),
        }
    }

    pub fn code_and_label(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            label: Some(label.into()),
        }
    }

    fn is_code_only(&self) -> bool {
        self.code.is_some() && self.label.is_none()
    }

    pub fn describe(&self) -> String {
        match (&self.code, &self.label) {
            (Some(code), Some(label)) => format!("{} ({})", label, code),
            (Some(code), None) => code.clone(),
            (None, Some(label)) => label.clone(),
            (None, None) => "<empty target>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected,
    /// The control already showed the wanted option; nothing was touched.
    AlreadySelected,
    /// Every strategy was exhausted. Not an error: the caller decides
    /// whether the owning stage can be skipped.
    NotFound,
}

/// One way of deciding whether a rendered option is the wanted one. The
/// strategies run in declaration order, first success wins.
pub trait OptionMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, option: &RenderedOption, target: &OptionTarget) -> bool;
}

/// Exact structural attribute match (`data-value`/`value`).
pub struct ValueMatcher;

impl OptionMatcher for ValueMatcher {
    fn name(&self) -> &'static str {
        "value"
    }

    fn matches(&self, option: &RenderedOption, target: &OptionTarget) -> bool {
        match (&option.value, &target.code) {
            (Some(value), Some(code)) => value.eq_ignore_ascii_case(code),
            _ => false,
        }
    }
}

/// Case-insensitive label-pattern match; containment in either direction
/// covers decorated labels like "Iowa (us-central1)".
pub struct LabelMatcher;

impl OptionMatcher for LabelMatcher {
    fn name(&self) -> &'static str {
        "label"
    }

    fn matches(&self, option: &RenderedOption, target: &OptionTarget) -> bool {
        let Some(wanted) = &target.label else {
            return false;
        };
        let label = option.label.trim().to_lowercase();
        let wanted = wanted.trim().to_lowercase();
        if label.is_empty() || wanted.is_empty() {
            return false;
        }
        label == wanted || label.contains(&wanted) || wanted.contains(&label)
    }
}

const MATCHERS: [&(dyn OptionMatcher); 2] = [&ValueMatcher, &LabelMatcher];

fn find_match(options: &[RenderedOption], target: &OptionTarget) -> Option<(usize, &'static str)> {
    for matcher in MATCHERS {
        if let Some(index) = options.iter().position(|o| matcher.matches(o, target)) {
            return Some((index, matcher.name()));
        }
    }
    None
}

/// Explicit loop state for the virtualization probe. Iteration counts live
/// here rather than in recursion so the caps are enforceable.
#[derive(Debug)]
struct ScrollProbe {
    iterations: u32,
    cap: u32,
    last_seen: usize,
}

impl ScrollProbe {
    fn new(cap: u32) -> Self {
        Self {
            iterations: 0,
            cap,
            last_seen: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.iterations >= self.cap
    }

    fn advance(&mut self, seen: usize) {
        self.iterations += 1;
        self.last_seen = seen;
    }
}

/// Finds and activates one option inside an arbitrary, possibly virtualized,
/// dropdown-style control. Option exhaustion is `Ok(NotFound)`; only
/// structural faults (missing trigger, undeclared list relationship) are
/// errors. At most one selection happens per call.
pub struct ControlSelector {
    config: SelectorConfig,
}

impl ControlSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub async fn select<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        control: &ControlRef,
        target: &OptionTarget,
    ) -> Result<SelectOutcome> {
        if self.already_selected(page, control, target).await? {
            debug!(control = control.name, target = %target.describe(), "already selected");
            return Ok(SelectOutcome::AlreadySelected);
        }

        page.click(&control.trigger).await?;
        let list = self.resolve_list(page, control).await?;
        if let Err(err) = page.wait_for(&list, self.config.open_wait_ms).await {
            warn!(control = control.name, error = %err, "option list did not appear");
        }

        if let Some(outcome) = self.scroll_probe(page, control, target, &list).await? {
            return Ok(outcome);
        }

        if self.keyboard_walk(page, control, target, &list).await? {
            return Ok(SelectOutcome::Selected);
        }

        debug!(control = control.name, target = %target.describe(), "exhausted all strategies");
        let _ = page.press_key("Escape").await;
        Ok(SelectOutcome::NotFound)
    }

    /// Idempotence check: an already-correct selection is a no-op.
    async fn already_selected<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        control: &ControlRef,
        target: &OptionTarget,
    ) -> Result<bool> {
        let shown = page.read_text(&control.trigger).await?;
        // The trigger echoes the selected option's label; judged by the same
        // containment rules as the option matcher, so any target that would
        // match the rendered option also recognizes its echo.
        let echoed = RenderedOption {
            id: None,
            value: None,
            label: shown.trim().to_string(),
            selected: true,
        };
        if LabelMatcher.matches(&echoed, target) {
            return Ok(true);
        }
        if let Some(code) = &target.code {
            if let Some(value) = page.attr(&control.trigger, "data-value").await? {
                if value.eq_ignore_ascii_case(code) {
                    return Ok(true);
                }
            }
            if shown.trim().eq_ignore_ascii_case(code) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The option-list surface is declared on the trigger; a control without
    /// the relationship is structurally broken and that is an error, not a
    /// NotFound.
    async fn resolve_list<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        control: &ControlRef,
    ) -> Result<String> {
        for relation in ["aria-controls", "aria-owns"] {
            if let Some(id) = page.attr(&control.trigger, relation).await? {
                if !id.trim().is_empty() {
                    return Ok(format!("[id=\"{}\"]", id.trim()));
                }
            }
        }
        Err(EngineError::Driver(format!(
            "control '{}' declares no option list relationship",
            control.name
        )))
    }

    /// Probe the virtualization window: match the rendered options, scroll
    /// one increment, repeat. Bounded by the configured cap; a transiently
    /// empty or detached list triggers a bounded reopen-and-resume.
    async fn scroll_probe<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        control: &ControlRef,
        target: &OptionTarget,
        list: &str,
    ) -> Result<Option<SelectOutcome>> {
        let cap = self.scroll_cap(target);
        let mut probe = ScrollProbe::new(cap);
        let mut reopens = 0u32;

        loop {
            let options = match page.options(list).await {
                Ok(options) if !options.is_empty() => options,
                _ => {
                    if reopens >= self.config.reopen_attempts {
                        warn!(control = control.name, "option list unrecoverable, giving up probe");
                        return Ok(None);
                    }
                    reopens += 1;
                    debug!(control = control.name, attempt = reopens, "reopening control");
                    let _ = page.press_key("Escape").await;
                    page.click(&control.trigger).await?;
                    let _ = page.wait_for(list, self.config.open_wait_ms).await;
                    continue;
                }
            };

            if let Some((index, strategy)) = find_match(&options, target) {
                debug!(
                    control = control.name,
                    strategy,
                    index,
                    iterations = probe.iterations,
                    "option matched"
                );
                page.click_option(list, index).await?;
                return Ok(Some(SelectOutcome::Selected));
            }

            if probe.exhausted() {
                debug!(
                    control = control.name,
                    iterations = probe.iterations,
                    last_seen = probe.last_seen,
                    "scroll probe cap reached"
                );
                return Ok(None);
            }

            // Direct scroll first; some list surfaces ignore it and only
            // respond to keyboard paging.
            if page
                .scroll_list(list, self.config.scroll_step_px)
                .await
                .is_err()
            {
                let _ = page.press_key("PageDown").await;
            }
            probe.advance(options.len());
            tokio::time::sleep(Duration::from_millis(self.config.poll_ms)).await;
        }
    }

    /// Last resort: walk the options with ArrowDown reading the highlighted
    /// entry, confirm with Enter on a match. Bounded by the same cap plus a
    /// stall detector for the end of the list.
    async fn keyboard_walk<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        control: &ControlRef,
        target: &OptionTarget,
        list: &str,
    ) -> Result<bool> {
        if !page.exists(list).await.unwrap_or(false) {
            page.click(&control.trigger).await?;
            let _ = page.wait_for(list, self.config.open_wait_ms).await;
        }

        let cap = self.scroll_cap(target);
        let mut last_key: Option<String> = None;
        let mut stalls = 0u32;

        for step in 0..cap {
            page.press_key("ArrowDown").await?;
            let Some(active) = page.active_option(list).await? else {
                continue;
            };

            if MATCHERS.iter().any(|m| m.matches(&active, target)) {
                debug!(control = control.name, step, "keyboard walk matched");
                page.press_key("Enter").await?;
                return Ok(true);
            }

            let key = active.id.clone().unwrap_or_else(|| active.label.clone());
            if last_key.as_deref() == Some(key.as_str()) {
                stalls += 1;
                if stalls >= self.config.stall_limit {
                    debug!(control = control.name, step, "keyboard walk stalled at list end");
                    break;
                }
            } else {
                stalls = 0;
            }
            last_key = Some(key);
        }
        Ok(false)
    }

    fn scroll_cap(&self, target: &OptionTarget) -> u32 {
        if target.is_code_only() {
            self.config.code_scroll_cap
        } else {
            self.config.label_scroll_cap
        }
    }
}
