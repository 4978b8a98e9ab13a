use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector as HtmlSelector};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::manager::SessionManager;
use crate::core::config::Config;
use crate::core::driver::PageDriver;
use crate::diagnostics::DiagnosticsCollector;
use crate::engine::sequencer::InstanceSequencer;
use crate::engine::surface;
use crate::errors::{EngineError, Result};
use crate::types::{
    EstimateRequest, EstimateResult, EstimateSummary, LineItemSummary,
};

/// Top-level flow phases; `Failed` is reachable from any of them. The
/// current phase names the failing stage when a timeout has to be
/// reclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    ProductPickerOpen,
    ProductSelected,
    ConfiguringInstances,
    TotalValidated,
    ShareSurfaceOpen,
    ShareUrlExtracted,
    CsvLinkExtracted,
    Done,
}

impl SessionPhase {
    fn label(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::ProductPickerOpen => "ProductPickerOpen",
            SessionPhase::ProductSelected => "ProductSelected",
            SessionPhase::ConfiguringInstances => "ConfiguringInstances",
            SessionPhase::TotalValidated => "TotalValidated",
            SessionPhase::ShareSurfaceOpen => "ShareSurfaceOpen",
            SessionPhase::ShareUrlExtracted => "ShareUrlExtracted",
            SessionPhase::CsvLinkExtracted => "CsvLinkExtracted",
            SessionPhase::Done => "Done",
        }
    }
}

#[derive(Debug)]
pub(crate) struct DriveOutput {
    share_url: String,
    csv_download_url: Option<String>,
    summary: EstimateSummary,
}

/// The public entry point: validates the request, owns the browser session
/// lifecycle, and converts every outcome into an [`EstimateResult`]. No
/// error escapes as a raised fault.
pub struct EstimateEngine {
    config: Config,
}

impl EstimateEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    pub async fn run_estimate(&self, request: EstimateRequest) -> EstimateResult {
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(session = %session_id, instances = request.instances.len(), "estimate session starting");

        // Malformed requests fail before any browser launch.
        if let Err(err) = request.validate() {
            warn!(session = %session_id, error = %err, "request rejected");
            return EstimateResult::failed(&err, None, None);
        }

        // One clock for the whole run: acquisition spends from the same
        // budget as the driven flow.
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(request.timeout_ms);

        let manager = SessionManager::new(self.config.clone());
        let acquiring = within_budget(
            deadline,
            manager.acquire(request.headless),
            "browser acquisition",
            request.timeout_ms,
        );
        let mut handle = match acquiring.await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(session = %session_id, error = %err, "browser acquisition failed");
                return EstimateResult::failed(&err, None, None);
            }
        };

        let mut diagnostics = if request.collect_artifacts {
            DiagnosticsCollector::enabled()
        } else {
            DiagnosticsCollector::disabled()
        };

        let page = match handle.page() {
            Ok(page) => page,
            Err(err) => {
                handle.release().await;
                return EstimateResult::failed(&err, None, None);
            }
        };
        if diagnostics.is_enabled() {
            if let Err(err) = page.install_console_hook().await {
                warn!(session = %session_id, error = %err, "console hook install failed");
            }
        }

        let mut last_phase = SessionPhase::Idle;
        let driven = tokio::time::timeout_at(
            deadline,
            self.drive(&page, &request, &mut diagnostics, &mut last_phase),
        )
        .await;

        let result = match driven {
            Ok(Ok(output)) => {
                info!(session = %session_id, share_url = %output.share_url, "estimate session complete");
                EstimateResult::completed(
                    output.share_url,
                    output.csv_download_url,
                    output.summary,
                    diagnostics.drain(&page).await,
                )
            }
            Ok(Err(err)) => {
                warn!(session = %session_id, error = %err, "estimate session failed");
                diagnostics.snapshot(&page, "failure").await;
                EstimateResult::failed(&err, None, diagnostics.drain(&page).await)
            }
            Err(_) => {
                let err = reclassify_timeout(last_phase, request.timeout_ms);
                warn!(session = %session_id, error = %err, "estimate session timed out");
                diagnostics.snapshot(&page, "timeout").await;
                EstimateResult::failed(&err, None, diagnostics.drain(&page).await)
            }
        };

        handle.release().await;
        result
    }

    /// The cooperative step sequence. Generic over the driver seam so the
    /// whole flow is testable against a scripted page.
    pub(crate) async fn drive<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        request: &EstimateRequest,
        diagnostics: &mut DiagnosticsCollector,
        phase: &mut SessionPhase,
    ) -> Result<DriveOutput> {
        let session = &self.config.session;

        page.navigate(surface::CALCULATOR_URL).await?;
        self.open_product_picker(page, phase).await?;
        self.select_product(page, &request.service, phase).await?;

        *phase = SessionPhase::ConfiguringInstances;
        let sequencer = InstanceSequencer::new(self.config.clone());
        let mut line_items = Vec::with_capacity(request.instances.len());
        let mut committed = 0usize;

        // Strictly in request order; the driven UI is unsafe against
        // concurrent mutation.
        for (index, descriptor) in request.instances.iter().enumerate() {
            match sequencer.run(page, index, descriptor).await {
                Ok(outcome) => {
                    if outcome.committed {
                        committed += 1;
                    }
                    line_items.push(LineItemSummary {
                        descriptor: descriptor.clone(),
                        committed: outcome.committed,
                        subtotal_text: outcome.subtotal_text,
                        skipped_stages: outcome.skipped.iter().map(|s| s.to_string()).collect(),
                        field_notes: outcome
                            .field_reports
                            .iter()
                            .filter_map(|r| r.note())
                            .collect(),
                    });
                }
                Err(err) => {
                    // A per-instance commit failure is recorded, not fatal;
                    // remaining instances still get their chance.
                    warn!(instance = index, error = %err, "instance not committed");
                    line_items.push(LineItemSummary {
                        descriptor: descriptor.clone(),
                        committed: false,
                        subtotal_text: None,
                        skipped_stages: vec![],
                        field_notes: vec![err.to_string()],
                    });
                }
            }
        }

        if committed == 0 {
            return Err(EngineError::CommitFailed {
                index: 0,
                reason: "no instance could be committed".to_string(),
            });
        }
        // One capture covering the last successful commit, not one per
        // instance.
        diagnostics.snapshot(page, "last-commit").await;

        let total_text = self.validate_total(page, session.total_wait_ms).await?;
        *phase = SessionPhase::TotalValidated;
        info!(total = %total_text, committed, "estimate total validated");

        self.open_share_surface(page, session.share_wait_ms, phase)
            .await?;
        diagnostics.snapshot(page, "share-surface").await;

        let share_url = self
            .extract_share_url(page, session.share_wait_ms)
            .await?;
        *phase = SessionPhase::ShareUrlExtracted;

        let csv_download_url = if request.want_csv_link {
            let href = self.extract_csv_link(page).await;
            *phase = SessionPhase::CsvLinkExtracted;
            href
        } else {
            None
        };

        *phase = SessionPhase::Done;
        Ok(DriveOutput {
            share_url,
            csv_download_url,
            summary: EstimateSummary {
                line_items,
                total_text: Some(total_text),
            },
        })
    }

    async fn open_product_picker<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        phase: &mut SessionPhase,
    ) -> Result<()> {
        click_first(page, &surface::add_to_estimate_candidates(), "add to estimate").await?;
        wait_first(
            page,
            &surface::picker_surface_candidates(),
            self.config.session.share_wait_ms,
            "product picker",
        )
        .await?;
        *phase = SessionPhase::ProductPickerOpen;
        Ok(())
    }

    async fn select_product<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        service: &str,
        phase: &mut SessionPhase,
    ) -> Result<()> {
        // Tiles are matched by stable identifying attributes, never by
        // visual position.
        click_first(page, &surface::product_tile_candidates(service), "product tile").await?;
        page.wait_for(&surface::config_form_ready(), self.config.session.share_wait_ms)
            .await?;
        *phase = SessionPhase::ProductSelected;
        debug!(service, "product selected");
        Ok(())
    }

    /// Scan visible text for a currency-formatted total; the first parseable
    /// match within the budget wins.
    async fn validate_total<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        budget_ms: u64,
    ) -> Result<String> {
        let pattern = Regex::new(r"[$€£]\s?\d[\d,]*(?:\.\d{2})?")
            .map_err(|e| EngineError::Driver(e.to_string()))?;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(budget_ms);

        loop {
            if let Ok(body) = page.body_text().await {
                if let Some(m) = pattern.find(&body) {
                    return Ok(m.as_str().to_string());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::ExtractionFailed {
                    stage: "TotalValidated".to_string(),
                    reason: "no currency-formatted total appeared".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(self.config.session.poll_interval_ms)).await;
        }
    }

    async fn open_share_surface<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        budget_ms: u64,
        phase: &mut SessionPhase,
    ) -> Result<()> {
        click_first(page, &surface::share_button_candidates(), "share button")
            .await
            .map_err(|err| EngineError::ExtractionFailed {
                stage: "ShareSurfaceOpen".to_string(),
                reason: err.to_string(),
            })?;
        wait_first(
            page,
            &surface::share_surface_candidates(),
            budget_ms,
            "share surface",
        )
        .await
        .map_err(|err| EngineError::ExtractionFailed {
            stage: "ShareSurfaceOpen".to_string(),
            reason: err.to_string(),
        })?;
        *phase = SessionPhase::ShareSurfaceOpen;
        Ok(())
    }

    /// Ordered strategies for reading the generated link: the copy-link
    /// affordance is triggered, then a readonly field, then any adjacent
    /// input, and the host clipboard strictly last (it is racy and
    /// permission-dependent). First syntactically valid absolute URL on the
    /// target domain wins.
    async fn extract_share_url<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        budget_ms: u64,
    ) -> Result<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(budget_ms);

        // Best-effort: some share surfaces only reveal the URL after the
        // copy affordance fires.
        if let Err(err) = click_first(page, &surface::copy_link_candidates(), "copy link").await {
            debug!(error = %err, "no copy-link affordance responded");
        }

        loop {
            for candidate in surface::share_url_field_candidates() {
                if let Ok(value) = page.read_value(&candidate).await {
                    if let Some(valid) = accept_share_url(&value) {
                        return Ok(valid);
                    }
                }
            }
            if let Ok(value) = page.read_clipboard().await {
                if let Some(valid) = accept_share_url(&value) {
                    debug!("share url recovered from clipboard");
                    return Ok(valid);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::ExtractionFailed {
                    stage: "ShareUrlExtracted".to_string(),
                    reason: "no valid share url surfaced".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(self.config.session.poll_interval_ms)).await;
        }
    }

    /// Request-gated CSV affordance; absence is not a failure.
    async fn extract_csv_link<D: PageDriver + ?Sized>(&self, page: &D) -> Option<String> {
        for dialog in surface::share_surface_candidates() {
            let Ok(html) = page.inner_html(&dialog).await else {
                continue;
            };
            let fragment = Html::parse_fragment(&html);
            for candidate in surface::csv_link_candidates() {
                let Ok(selector) = HtmlSelector::parse(&candidate) else {
                    continue;
                };
                if let Some(element) = fragment.select(&selector).next() {
                    if let Some(href) = element.value().attr("href") {
                        debug!(href, "csv export link found");
                        return Some(href.to_string());
                    }
                }
            }
        }
        debug!("no csv export affordance present");
        None
    }
}

/// The share URL is opaque: only syntax and domain are checked, never its
/// internal encoding.
fn accept_share_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;
    if host == surface::SHARE_URL_DOMAIN
        || host.ends_with(&format!(".{}", surface::SHARE_URL_DOMAIN))
    {
        Some(raw.to_string())
    } else {
        None
    }
}

/// Pre-drive work draws on the shared deadline; expiry here is a resource
/// fault, not a flow timeout.
async fn within_budget<T>(
    deadline: tokio::time::Instant,
    work: impl std::future::Future<Output = Result<T>>,
    what: &str,
    timeout_ms: u64,
) -> Result<T> {
    match tokio::time::timeout_at(deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Resource(format!(
            "{} exceeded the {}ms budget",
            what, timeout_ms
        ))),
    }
}

fn reclassify_timeout(phase: SessionPhase, timeout_ms: u64) -> EngineError {
    match phase {
        SessionPhase::Idle => EngineError::Resource(format!(
            "page never became ready within {}ms",
            timeout_ms
        )),
        SessionPhase::ProductPickerOpen
        | SessionPhase::ProductSelected
        | SessionPhase::ConfiguringInstances => EngineError::CommitFailed {
            index: 0,
            reason: format!("timed out during {} after {}ms", phase.label(), timeout_ms),
        },
        _ => EngineError::ExtractionFailed {
            stage: phase.label().to_string(),
            reason: format!("timed out after {}ms", timeout_ms),
        },
    }
}

async fn click_first<D: PageDriver + ?Sized>(
    page: &D,
    candidates: &[String],
    what: &str,
) -> Result<()> {
    for candidate in candidates {
        if page.exists(candidate).await.unwrap_or(false) {
            match page.click(candidate).await {
                Ok(()) => return Ok(()),
                Err(err) => debug!(candidate, error = %err, "candidate click failed"),
            }
        }
    }
    Err(EngineError::Driver(format!(
        "no {} affordance responded",
        what
    )))
}

async fn wait_first<D: PageDriver + ?Sized>(
    page: &D,
    candidates: &[String],
    budget_ms: u64,
    what: &str,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(budget_ms);
    loop {
        for candidate in candidates {
            if page.exists(candidate).await.unwrap_or(false) {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::Timeout {
                waiting_for: what.to_string(),
                elapsed_ms: budget_ms,
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
