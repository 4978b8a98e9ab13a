//! Scripted in-memory [`PageDriver`] for exercising the engine without a
//! browser. State is mutated through the same seam the real driver uses, so
//! tests describe page behavior (options rendered per window, affordances
//! that ignore writes, lists that detach) instead of stubbing methods.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::driver::{PageDriver, RenderedOption};
use crate::engine::surface::{self, ControlRef, FieldRef};
use crate::errors::{EngineError, Result};
use crate::types::{ConsoleLine, EstimateRequest, InstanceDescriptor};

#[derive(Default)]
struct PageState {
    present: HashSet<String>,
    texts: HashMap<String, String>,
    values: HashMap<String, String>,
    attrs: HashMap<(String, String), String>,
    html: HashMap<String, String>,
    body: String,
    clipboard: Option<String>,

    /// Rendered windows per list selector; `window_pos` advances on scroll.
    windows: HashMap<String, Vec<Vec<RenderedOption>>>,
    window_pos: HashMap<String, usize>,
    /// Remaining `options()` calls that fail before the list recovers.
    detached: HashMap<String, u32>,
    frozen_lists: HashSet<String>,
    keyboard_options: HashMap<String, Vec<RenderedOption>>,
    keyboard_cursor: HashMap<String, usize>,
    trigger_to_list: HashMap<String, String>,
    open_list: Option<String>,

    /// Stepper button selector -> (input selector, per-click delta).
    steppers: HashMap<String, (String, i64)>,
    fill_rejects: HashSet<String>,
    type_rejects: HashSet<String>,
    click_rejects: HashSet<String>,

    /// Commit button selector -> estimate list it appends to.
    commit_wiring: Option<(String, String)>,

    navigated: Vec<String>,
    clicks: Vec<String>,
    keys: Vec<String>,
    option_clicks: Vec<(String, usize)>,
    scroll_counts: HashMap<String, usize>,
    screenshots_taken: usize,
    console: Vec<ConsoleLine>,
}

pub struct MockPage {
    state: Mutex<PageState>,
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    // -- page scripting ----------------------------------------------------

    pub fn make_clickable(&self, selector: &str) {
        self.with(|s| {
            s.present.insert(selector.to_string());
        });
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.with(|s| {
            s.present.insert(selector.to_string());
            s.texts.insert(selector.to_string(), text.to_string());
        });
    }

    pub fn set_value(&self, selector: &str, value: &str) {
        self.with(|s| {
            s.present.insert(selector.to_string());
            s.values.insert(selector.to_string(), value.to_string());
        });
    }

    pub fn set_attr(&self, selector: &str, name: &str, value: &str) {
        self.with(|s| {
            s.present.insert(selector.to_string());
            s.attrs
                .insert((selector.to_string(), name.to_string()), value.to_string());
        });
    }

    pub fn set_html(&self, selector: &str, html: &str) {
        self.with(|s| {
            s.present.insert(selector.to_string());
            s.html.insert(selector.to_string(), html.to_string());
        });
    }

    pub fn set_body_text(&self, text: &str) {
        self.with(|s| s.body = text.to_string());
    }

    pub fn set_clipboard(&self, text: &str) {
        self.with(|s| s.clipboard = Some(text.to_string()));
    }

    /// Register a trigger wired to a virtualized list. Each inner vec is one
    /// rendered window; scrolling advances to the next window.
    pub fn add_combobox(&self, trigger: &str, list_id: &str, windows: Vec<Vec<RenderedOption>>) {
        let list = format!("[id=\"{}\"]", list_id);
        self.with(|s| {
            s.present.insert(trigger.to_string());
            s.texts.insert(trigger.to_string(), String::new());
            s.attrs.insert(
                (trigger.to_string(), "aria-controls".to_string()),
                list_id.to_string(),
            );
            s.present.insert(list.clone());
            s.trigger_to_list.insert(trigger.to_string(), list.clone());
            s.windows.insert(list, windows);
        });
    }

    /// The next `times` reads of the list's options fail as detached.
    pub fn detach_list(&self, list: &str, times: u32) {
        self.with(|s| {
            s.detached.insert(list.to_string(), times);
        });
    }

    /// Direct scrolling has no effect on this list.
    pub fn freeze_scrolling(&self, list: &str) {
        self.with(|s| {
            s.frozen_lists.insert(list.to_string());
        });
    }

    /// What ArrowDown walks through, when it differs from the rendered
    /// window (the usual virtualization mismatch).
    pub fn set_keyboard_options(&self, list: &str, options: Vec<RenderedOption>) {
        self.with(|s| {
            s.keyboard_options.insert(list.to_string(), options);
        });
    }

    /// The named control's list now renders no options at all.
    pub fn clear_options_for(&self, control: &ControlRef) {
        self.with(|s| {
            if let Some(list) = s.trigger_to_list.get(&control.trigger).cloned() {
                s.windows.insert(list.clone(), vec![vec![]]);
                s.keyboard_options.remove(&list);
            }
        });
    }

    pub fn add_field(&self, field: &FieldRef, initial: &str) {
        self.with(|s| {
            s.present.insert(field.input.clone());
            s.values.insert(field.input.clone(), initial.to_string());
            if let Some(inc) = &field.increment {
                s.present.insert(inc.clone());
                s.steppers.insert(inc.clone(), (field.input.clone(), 1));
            }
            if let Some(dec) = &field.decrement {
                s.present.insert(dec.clone());
                s.steppers.insert(dec.clone(), (field.input.clone(), -1));
            }
        });
    }

    /// `fill` succeeds but the field keeps its old value.
    pub fn reject_fill(&self, selector: &str) {
        self.with(|s| {
            s.fill_rejects.insert(selector.to_string());
        });
    }

    /// `type_text` succeeds but nothing lands in the field.
    pub fn reject_typing(&self, selector: &str) {
        self.with(|s| {
            s.type_rejects.insert(selector.to_string());
        });
    }

    pub fn reject_steppers(&self, field: &FieldRef) {
        self.with(|s| {
            if let Some(inc) = &field.increment {
                s.click_rejects.insert(inc.clone());
            }
            if let Some(dec) = &field.decrement {
                s.click_rejects.insert(dec.clone());
            }
        });
    }

    pub fn break_commit(&self) {
        self.with(|s| {
            for candidate in surface::commit_candidates() {
                s.present.remove(&candidate);
            }
            s.commit_wiring = None;
        });
    }

    pub fn remove_share_surface(&self) {
        self.with(|s| {
            for candidate in surface::share_button_candidates() {
                s.present.remove(&candidate);
            }
            for candidate in surface::share_surface_candidates() {
                s.present.remove(&candidate);
                s.html.remove(&candidate);
            }
        });
    }

    pub fn clear_share_url_fields(&self) {
        self.with(|s| {
            for candidate in surface::share_url_field_candidates() {
                s.values.remove(&candidate);
            }
        });
    }

    pub fn push_console_line(&self, level: &str, text: &str) {
        self.with(|s| {
            s.console.push(ConsoleLine {
                level: level.to_string(),
                text: text.to_string(),
                captured_at: chrono::Utc::now(),
            });
        });
    }

    // -- interaction log ---------------------------------------------------

    pub fn clicks(&self) -> Vec<String> {
        self.with(|s| s.clicks.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.with(|s| s.keys.clone())
    }

    pub fn option_clicks(&self) -> Vec<(String, usize)> {
        self.with(|s| s.option_clicks.clone())
    }

    pub fn scrolls(&self, list: &str) -> usize {
        self.with(|s| s.scroll_counts.get(list).copied().unwrap_or(0))
    }

    pub fn screenshot_count(&self) -> usize {
        self.with(|s| s.screenshots_taken)
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

fn current_window(state: &PageState, list: &str) -> Option<Vec<RenderedOption>> {
    let windows = state.windows.get(list)?;
    let pos = state
        .window_pos
        .get(list)
        .copied()
        .unwrap_or(0)
        .min(windows.len().saturating_sub(1));
    windows.get(pos).cloned()
}

fn advance_window(state: &mut PageState, list: &str) {
    let len = state.windows.get(list).map(Vec::len).unwrap_or(0);
    let pos = state.window_pos.entry(list.to_string()).or_insert(0);
    *pos = (*pos + 1).min(len.saturating_sub(1));
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.with(|s| s.navigated.push(url.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.with(|s| {
            if s.click_rejects.contains(selector) {
                return Err(EngineError::Driver(format!(
                    "element '{}' refused the click",
                    selector
                )));
            }
            if !s.present.contains(selector) {
                return Err(EngineError::Driver(format!(
                    "no element matches '{}'",
                    selector
                )));
            }
            s.clicks.push(selector.to_string());

            if let Some(list) = s.trigger_to_list.get(selector).cloned() {
                s.open_list = Some(list.clone());
                s.keyboard_cursor.remove(&list);
            }
            if let Some((input, delta)) = s.steppers.get(selector).cloned() {
                let current: i64 = s
                    .values
                    .get(&input)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                s.values.insert(input, (current + delta).max(0).to_string());
            }
            if let Some((button, list)) = s.commit_wiring.clone() {
                if button == selector {
                    if let Some(windows) = s.windows.get_mut(&list) {
                        if let Some(window) = windows.first_mut() {
                            let n = window.len() + 1;
                            window.push(RenderedOption {
                                id: Some(format!("item-{}", n)),
                                value: None,
                                label: format!("Line item {}", n),
                                selected: false,
                            });
                        }
                    }
                }
            }
            Ok(())
        })
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.with(|s| {
            if !s.present.contains(selector) && !s.values.contains_key(selector) {
                return Err(EngineError::Driver(format!(
                    "no element matches '{}'",
                    selector
                )));
            }
            if !s.fill_rejects.contains(selector) {
                s.values.insert(selector.to_string(), value.to_string());
            }
            Ok(())
        })
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.with(|s| {
            if !s.present.contains(selector) && !s.values.contains_key(selector) {
                return Err(EngineError::Driver(format!(
                    "no element matches '{}'",
                    selector
                )));
            }
            if !s.type_rejects.contains(selector) {
                s.values.insert(selector.to_string(), text.to_string());
            }
            Ok(())
        })
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.with(|s| {
            s.keys.push(key.to_string());
            if let Some(list) = s.open_list.clone() {
                match key {
                    "PageDown" => advance_window(s, &list),
                    "ArrowDown" => {
                        let len = s
                            .keyboard_options
                            .get(&list)
                            .map(Vec::len)
                            .or_else(|| s.windows.get(&list).map(|w| w.iter().map(Vec::len).sum()))
                            .unwrap_or(0);
                        if len > 0 {
                            let next = match s.keyboard_cursor.get(&list) {
                                // First press highlights the first entry.
                                None => 0,
                                Some(c) => (c + 1).min(len - 1),
                            };
                            s.keyboard_cursor.insert(list, next);
                        }
                    }
                    _ => {}
                }
            }
        });
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        self.with(|s| {
            s.values.get(selector).cloned().ok_or_else(|| {
                EngineError::Driver(format!("element '{}' has no value", selector))
            })
        })
    }

    async fn read_text(&self, selector: &str) -> Result<String> {
        self.with(|s| {
            s.texts.get(selector).cloned().ok_or_else(|| {
                EngineError::Driver(format!("no element matches '{}'", selector))
            })
        })
    }

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.with(|s| {
            Ok(s.attrs
                .get(&(selector.to_string(), name.to_string()))
                .cloned())
        })
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        self.with(|s| {
            Ok(s.present.contains(selector)
                || s.values.contains_key(selector)
                || s.texts.contains_key(selector)
                || s.windows.contains_key(selector))
        })
    }

    async fn options(&self, list_selector: &str) -> Result<Vec<RenderedOption>> {
        self.with(|s| {
            if let Some(remaining) = s.detached.get_mut(list_selector) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(EngineError::Driver(format!(
                        "option list '{}' is detached",
                        list_selector
                    )));
                }
            }
            current_window(s, list_selector).ok_or_else(|| {
                EngineError::Driver(format!("option list '{}' is missing", list_selector))
            })
        })
    }

    async fn active_option(&self, list_selector: &str) -> Result<Option<RenderedOption>> {
        self.with(|s| {
            let walked: Vec<RenderedOption> = match s.keyboard_options.get(list_selector) {
                Some(options) => options.clone(),
                None => s
                    .windows
                    .get(list_selector)
                    .map(|w| w.iter().flatten().cloned().collect())
                    .unwrap_or_default(),
            };
            if walked.is_empty() {
                return Ok(None);
            }
            let cursor = s
                .keyboard_cursor
                .get(list_selector)
                .copied()
                .unwrap_or(0)
                .min(walked.len() - 1);
            Ok(Some(walked[cursor].clone()))
        })
    }

    async fn click_option(&self, list_selector: &str, index: usize) -> Result<()> {
        self.with(|s| {
            let window = current_window(s, list_selector).ok_or_else(|| {
                EngineError::Driver(format!("option list '{}' is missing", list_selector))
            })?;
            let option = window.get(index).ok_or_else(|| {
                EngineError::Driver(format!(
                    "option index {} out of range for '{}'",
                    index, list_selector
                ))
            })?;
            s.option_clicks.push((list_selector.to_string(), index));
            // Committing a choice repaints the trigger with the option label.
            let trigger = s
                .trigger_to_list
                .iter()
                .find(|(_, list)| list.as_str() == list_selector)
                .map(|(trigger, _)| trigger.clone());
            if let Some(trigger) = trigger {
                s.texts.insert(trigger, option.label.clone());
            }
            Ok(())
        })
    }

    async fn scroll_list(&self, list_selector: &str, _delta_px: i64) -> Result<()> {
        self.with(|s| {
            if s.frozen_lists.contains(list_selector) {
                return Err(EngineError::Driver(format!(
                    "scrolling '{}' had no effect",
                    list_selector
                )));
            }
            *s.scroll_counts.entry(list_selector.to_string()).or_insert(0) += 1;
            advance_window(s, list_selector);
            Ok(())
        })
    }

    async fn body_text(&self) -> Result<String> {
        self.with(|s| Ok(s.body.clone()))
    }

    async fn inner_html(&self, selector: &str) -> Result<String> {
        self.with(|s| {
            s.html.get(selector).cloned().ok_or_else(|| {
                EngineError::Driver(format!("no element matches '{}'", selector))
            })
        })
    }

    async fn read_clipboard(&self) -> Result<String> {
        self.with(|s| {
            s.clipboard
                .clone()
                .ok_or_else(|| EngineError::Driver("clipboard is empty".to_string()))
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with(|s| {
            s.screenshots_taken += 1;
            Ok(vec![0x89, b'P', b'N', b'G'])
        })
    }

    async fn current_url(&self) -> Result<String> {
        self.with(|s| {
            Ok(s.navigated
                .last()
                .cloned()
                .unwrap_or_else(|| "about:blank".to_string()))
        })
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleLine>> {
        self.with(|s| Ok(std::mem::take(&mut s.console)))
    }
}

fn opt(id: &str, value: Option<&str>, label: &str) -> RenderedOption {
    RenderedOption {
        id: Some(id.to_string()),
        value: value.map(|v| v.to_string()),
        label: label.to_string(),
        selected: false,
    }
}

/// The canonical single-instance descriptor used across the engine tests.
pub fn test_descriptor() -> InstanceDescriptor {
    InstanceDescriptor {
        instance_count: 1,
        total_hours: 730,
        operating_system: crate::types::OperatingSystem::Linux,
        provisioning_model: crate::types::ProvisioningModel::Regular,
        series: "E2".to_string(),
        machine_type: "e2-standard-2".to_string(),
        region: "Iowa (us-central1)".to_string(),
        committed_use: crate::types::CommittedUseTerm::None,
    }
}

pub fn test_request(instances: Vec<InstanceDescriptor>) -> EstimateRequest {
    EstimateRequest {
        instances,
        service: "Compute Engine".to_string(),
        headless: true,
        timeout_ms: 120_000,
        want_csv_link: false,
        collect_artifacts: false,
    }
}

/// A page wired for the whole happy path: picker, configuration form with
/// every control populated, a commit that grows the estimate rail, a visible
/// total, and a share dialog carrying both the link and a CSV export.
pub fn seeded_calculator_page() -> MockPage {
    let page = MockPage::new();

    page.make_clickable(&surface::add_to_estimate_candidates()[0]);
    page.make_clickable(&surface::picker_surface_candidates()[0]);
    page.make_clickable(&surface::product_tile_candidates("Compute Engine")[0]);

    page.add_field(&surface::instance_count_field(), "1");
    page.add_field(&surface::usage_hours_field(), "730");

    page.add_combobox(
        &surface::region_control().trigger,
        "region-list",
        vec![vec![
            opt("region-1", Some("us-east1"), "South Carolina (us-east1)"),
            opt("region-2", Some("us-central1"), "Iowa (us-central1)"),
            opt("region-3", Some("europe-west1"), "Belgium (europe-west1)"),
        ]],
    );
    page.add_combobox(
        &surface::provisioning_model_control().trigger,
        "provisioning-list",
        vec![vec![
            opt("prov-1", None, "Regular"),
            opt("prov-2", None, "Spot (Preemptible)"),
        ]],
    );
    page.add_combobox(
        &surface::series_control().trigger,
        "series-list",
        vec![vec![
            opt("series-1", Some("E2"), "E2"),
            opt("series-2", Some("N2"), "N2"),
        ]],
    );
    page.add_combobox(
        &surface::machine_type_control().trigger,
        "machine-type-list",
        vec![vec![
            opt("mt-1", Some("e2-standard-2"), "e2-standard-2"),
            opt("mt-2", Some("e2-standard-4"), "e2-standard-4"),
        ]],
    );
    page.add_combobox(
        &surface::usage_units_control().trigger,
        "units-list",
        vec![vec![opt("unit-1", None, "Hours"), opt("unit-2", None, "Days")]],
    );
    page.add_combobox(
        &surface::time_period_control().trigger,
        "period-list",
        vec![vec![
            opt("period-1", None, "per month"),
            opt("period-2", None, "per year"),
        ]],
    );
    page.add_combobox(
        &surface::operating_system_control().trigger,
        "os-list",
        vec![vec![
            opt("os-1", None, "Free: Debian, CentOS, CoreOS, Ubuntu"),
            opt("os-2", None, "Paid: Windows Server"),
            opt("os-3", None, "Paid: Red Hat Enterprise Linux"),
            opt("os-4", None, "Paid: SLES"),
        ]],
    );
    page.add_combobox(
        &surface::committed_use_control().trigger,
        "cud-list",
        vec![vec![
            opt("cud-1", None, "None"),
            opt("cud-2", None, "1 year"),
            opt("cud-3", None, "3 years"),
        ]],
    );

    // An empty estimate rail that each commit click appends to.
    let commit = surface::commit_candidates()[0].clone();
    let rail = surface::estimate_item_selector();
    page.make_clickable(&commit);
    page.with(|s| {
        s.windows.insert(rail.clone(), vec![vec![]]);
        s.commit_wiring = Some((commit, rail));
    });
    page.set_text(&surface::subtotal_candidates()[0], "$70.84");
    page.set_body_text("Estimated total: $70.84 / month");

    page.make_clickable(&surface::share_button_candidates()[0]);
    page.make_clickable(&surface::copy_link_candidates()[0]);
    page.set_value(
        &surface::share_url_field_candidates()[0],
        "https://cloud.google.com/products/calculator?dl=CiQ2Yzgw",
    );
    page.set_html(
        &surface::share_surface_candidates()[0],
        "<div><p>Share your estimate</p>\
         <a aria-label=\"Download CSV\" href=\"https://cloud.google.com/estimate-export/estimate.csv\">Download CSV</a></div>",
    );

    page
}
