use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::driver::PageDriver;
use crate::engine::fields::{FieldReport, FieldSetter};
use crate::engine::selector::{ControlSelector, OptionTarget, SelectOutcome};
use crate::engine::surface;
use crate::errors::{EngineError, Result};
use crate::types::InstanceDescriptor;

/// Ordered per-instance configuration stages. Commit is the only stage whose
/// failure escalates; a configuration not committed is not part of the
/// estimate, but any other missing option merely degrades the line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelectRegion,
    SelectProvisioningModel,
    SelectSeries,
    SelectMachineType,
    SetInstanceCount,
    SetUsageHours,
    SetUnits,
    SetTimePeriod,
    SelectOperatingSystem,
    SelectCommittedUse,
    Commit,
}

impl Stage {
    pub const ORDER: [Stage; 11] = [
        Stage::SelectRegion,
        Stage::SelectProvisioningModel,
        Stage::SelectSeries,
        Stage::SelectMachineType,
        Stage::SetInstanceCount,
        Stage::SetUsageHours,
        Stage::SetUnits,
        Stage::SetTimePeriod,
        Stage::SelectOperatingSystem,
        Stage::SelectCommittedUse,
        Stage::Commit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::SelectRegion => "SelectRegion",
            Stage::SelectProvisioningModel => "SelectProvisioningModel",
            Stage::SelectSeries => "SelectSeries",
            Stage::SelectMachineType => "SelectMachineType",
            Stage::SetInstanceCount => "SetInstanceCount",
            Stage::SetUsageHours => "SetUsageHours",
            Stage::SetUnits => "SetUnits",
            Stage::SetTimePeriod => "SetTimePeriod",
            Stage::SelectOperatingSystem => "SelectOperatingSystem",
            Stage::SelectCommittedUse => "SelectCommittedUse",
            Stage::Commit => "Commit",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstanceOutcome {
    pub committed: bool,
    pub skipped: Vec<&'static str>,
    pub field_reports: Vec<FieldReport>,
    pub subtotal_text: Option<String>,
}

/// Runs the ordered field-setting stages for one descriptor and commits it
/// to the estimate.
pub struct InstanceSequencer {
    selector: ControlSelector,
    fields: FieldSetter,
    config: Config,
}

impl InstanceSequencer {
    pub fn new(config: Config) -> Self {
        Self {
            selector: ControlSelector::new(config.selector.clone()),
            fields: FieldSetter::new(config.fields.clone()),
            config,
        }
    }

    pub async fn run<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        index: usize,
        descriptor: &InstanceDescriptor,
    ) -> Result<InstanceOutcome> {
        let mut outcome = InstanceOutcome::default();

        for stage in Stage::ORDER {
            match stage {
                Stage::Commit => {
                    self.commit(page, index).await?;
                    outcome.committed = true;
                    outcome.subtotal_text = self.read_subtotal(page).await;
                    info!(instance = index, "instance committed");
                }
                _ => {
                    let result = self.run_stage(page, stage, descriptor).await;
                    self.absorb(stage, result, &mut outcome);
                }
            }

            if stage == Stage::SelectSeries {
                // The machine-type list repopulates asynchronously after a
                // series change; configuring it too early selects stale
                // options.
                tokio::time::sleep(Duration::from_millis(self.config.session.series_settle_ms))
                    .await;
            }
        }

        Ok(outcome)
    }

    async fn run_stage<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        stage: Stage,
        descriptor: &InstanceDescriptor,
    ) -> Result<Option<FieldReport>> {
        match stage {
            Stage::SelectRegion => {
                let target = match descriptor.region_code() {
                    Some(code) => OptionTarget::code_and_label(code, &descriptor.region),
                    None => OptionTarget::label(&descriptor.region),
                };
                self.select(page, surface::region_control(), target).await
            }
            Stage::SelectProvisioningModel => {
                self.select(
                    page,
                    surface::provisioning_model_control(),
                    OptionTarget::label(descriptor.provisioning_model.display_label()),
                )
                .await
            }
            Stage::SelectSeries => {
                self.select(
                    page,
                    surface::series_control(),
                    OptionTarget::code(&descriptor.series),
                )
                .await
            }
            Stage::SelectMachineType => {
                self.select(
                    page,
                    surface::machine_type_control(),
                    OptionTarget::code(&descriptor.machine_type),
                )
                .await
            }
            Stage::SetInstanceCount => {
                let report = self
                    .fields
                    .set(
                        page,
                        &surface::instance_count_field(),
                        &descriptor.instance_count.to_string(),
                    )
                    .await?;
                Ok(Some(report))
            }
            Stage::SetUsageHours => {
                let report = self
                    .fields
                    .set(
                        page,
                        &surface::usage_hours_field(),
                        &descriptor.total_hours.to_string(),
                    )
                    .await?;
                Ok(Some(report))
            }
            Stage::SetUnits => {
                self.select(
                    page,
                    surface::usage_units_control(),
                    OptionTarget::label("Hours"),
                )
                .await
            }
            Stage::SetTimePeriod => {
                self.select(
                    page,
                    surface::time_period_control(),
                    OptionTarget::label("per month"),
                )
                .await
            }
            Stage::SelectOperatingSystem => {
                self.select(
                    page,
                    surface::operating_system_control(),
                    OptionTarget::label(descriptor.operating_system.display_label()),
                )
                .await
            }
            Stage::SelectCommittedUse => {
                self.select(
                    page,
                    surface::committed_use_control(),
                    OptionTarget::label(descriptor.committed_use.display_label()),
                )
                .await
            }
            Stage::Commit => unreachable!("commit handled by caller"),
        }
    }

    async fn select<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        control: surface::ControlRef,
        target: OptionTarget,
    ) -> Result<Option<FieldReport>> {
        match self.selector.select(page, &control, &target).await? {
            SelectOutcome::Selected | SelectOutcome::AlreadySelected => Ok(None),
            SelectOutcome::NotFound => Err(EngineError::ControlNotFound {
                control: control.name.to_string(),
                wanted: target.describe(),
            }),
        }
    }

    /// Non-commit stages are best-effort: not every option exists for every
    /// machine/region pairing, so a missing option degrades the line item
    /// instead of aborting it. An unsettled field travels as a note on the
    /// line item, not as a skip.
    fn absorb(&self, stage: Stage, result: Result<Option<FieldReport>>, outcome: &mut InstanceOutcome) {
        match result {
            Ok(Some(report)) => {
                debug!(stage = stage.label(), settled = report.settled, "stage complete");
                outcome.field_reports.push(report);
            }
            Ok(None) => debug!(stage = stage.label(), "stage complete"),
            Err(err) => {
                warn!(stage = stage.label(), error = %err, "stage skipped");
                outcome.skipped.push(stage.label());
            }
        }
    }

    async fn commit<D: PageDriver + ?Sized>(&self, page: &D, index: usize) -> Result<()> {
        let before = self.estimate_item_count(page).await;

        let mut clicked = false;
        for candidate in surface::commit_candidates() {
            if page.exists(&candidate).await.unwrap_or(false) && page.click(&candidate).await.is_ok()
            {
                clicked = true;
                break;
            }
        }
        if !clicked {
            return Err(EngineError::CommitFailed {
                index,
                reason: "no commit affordance responded".to_string(),
            });
        }

        // The estimate rail gains a line item when the commit lands.
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.session.total_wait_ms);
        loop {
            if self.estimate_item_count(page).await > before {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::CommitFailed {
                    index,
                    reason: "estimate did not gain a line item".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(self.config.session.poll_interval_ms)).await;
        }
    }

    async fn estimate_item_count<D: PageDriver + ?Sized>(&self, page: &D) -> usize {
        match page.options(&surface::estimate_item_selector()).await {
            Ok(items) => items.len(),
            Err(_) => 0,
        }
    }

    async fn read_subtotal<D: PageDriver + ?Sized>(&self, page: &D) -> Option<String> {
        for candidate in surface::subtotal_candidates() {
            if let Ok(text) = page.read_text(&candidate).await {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
        }
        None
    }
}
