use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// Upper bound for `total_hours`: 31 days at 24 hours.
pub const MAX_USAGE_HOURS: u32 = 744;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingSystem {
    Linux,
    Windows,
    Rhel,
    Sles,
}

impl OperatingSystem {
    /// The display label the calculator UI uses for this choice.
    pub fn display_label(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "Free: Debian, CentOS, CoreOS, Ubuntu",
            OperatingSystem::Windows => "Paid: Windows Server",
            OperatingSystem::Rhel => "Paid: Red Hat Enterprise Linux",
            OperatingSystem::Sles => "Paid: SLES",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningModel {
    Regular,
    Spot,
}

impl ProvisioningModel {
    pub fn display_label(&self) -> &'static str {
        match self {
            ProvisioningModel::Regular => "Regular",
            ProvisioningModel::Spot => "Spot (Preemptible)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommittedUseTerm {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "3y")]
    ThreeYears,
}

impl CommittedUseTerm {
    pub fn display_label(&self) -> &'static str {
        match self {
            CommittedUseTerm::None => "None",
            CommittedUseTerm::OneYear => "1 year",
            CommittedUseTerm::ThreeYears => "3 years",
        }
    }
}

/// One fully-specified instance configuration to enter into the estimate.
/// Immutable once constructed; bounds-checked before any browser work starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    pub instance_count: u32,
    pub total_hours: u32,
    pub operating_system: OperatingSystem,
    pub provisioning_model: ProvisioningModel,
    /// Series code, e.g. "E2".
    pub series: String,
    /// Machine type code, e.g. "e2-standard-2".
    pub machine_type: String,
    /// Display-mapped region string, e.g. "Iowa (us-central1)".
    pub region: String,
    #[serde(default = "CommittedUseTerm::default_term", rename = "committedUse")]
    pub committed_use: CommittedUseTerm,
}

impl CommittedUseTerm {
    fn default_term() -> Self {
        CommittedUseTerm::None
    }
}

impl InstanceDescriptor {
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.instance_count == 0 {
            return Err(EngineError::Validation(format!(
                "instance {}: instanceCount must be positive",
                index
            )));
        }
        if self.total_hours == 0 || self.total_hours > MAX_USAGE_HOURS {
            return Err(EngineError::Validation(format!(
                "instance {}: totalHours must be in 1..={}, got {}",
                index, MAX_USAGE_HOURS, self.total_hours
            )));
        }
        if self.series.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "instance {}: series must not be empty",
                index
            )));
        }
        if self.machine_type.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "instance {}: machineType must not be empty",
                index
            )));
        }
        if self.region.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "instance {}: region must not be empty",
                index
            )));
        }
        Ok(())
    }

    /// Region code embedded in the display string, e.g. "us-central1"
    /// out of "Iowa (us-central1)".
    pub fn region_code(&self) -> Option<&str> {
        let open = self.region.rfind('(')?;
        let close = self.region.rfind(')')?;
        if close > open + 1 {
            Some(self.region[open + 1..close].trim())
        } else {
            None
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    120_000
}

/// One end-to-end automation request: an ordered, non-empty list of
/// descriptors plus session options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub instances: Vec<InstanceDescriptor>,
    /// Target product name in the calculator's picker, e.g. "Compute Engine".
    pub service: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub want_csv_link: bool,
    #[serde(default)]
    pub collect_artifacts: bool,
}

impl EstimateRequest {
    /// Rejects malformed requests before any browser launch.
    pub fn validate(&self) -> Result<()> {
        if self.instances.is_empty() {
            return Err(EngineError::Validation(
                "request must contain at least one instance".to_string(),
            ));
        }
        if self.service.trim().is_empty() {
            return Err(EngineError::Validation(
                "service must not be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(EngineError::Validation(
                "timeoutMs must be positive".to_string(),
            ));
        }
        for (index, descriptor) in self.instances.iter().enumerate() {
            descriptor.validate(index)?;
        }
        Ok(())
    }
}

/// Echo of one descriptor plus whatever the driven UI reported back for it.
/// `subtotal_text` is best-effort scraped text; absence is never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemSummary {
    pub descriptor: InstanceDescriptor,
    pub committed: bool,
    pub subtotal_text: Option<String>,
    /// Stages that were skipped because their target option was unavailable.
    #[serde(default)]
    pub skipped_stages: Vec<String>,
    /// Field-level discrepancies (requested vs observed) that did not block
    /// the instance from committing.
    #[serde(default)]
    pub field_notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateSummary {
    pub line_items: Vec<LineItemSummary>,
    pub total_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub label: String,
    pub base64_png: String,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLine {
    pub level: String,
    pub text: String,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBundle {
    pub screenshots: Vec<Screenshot>,
    pub console: Vec<ConsoleLine>,
}

/// The single response object every run converges to, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_summary: Option<EstimateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
}

impl EstimateResult {
    pub fn completed(
        share_url: String,
        csv_download_url: Option<String>,
        summary: EstimateSummary,
        artifacts: Option<ArtifactBundle>,
    ) -> Self {
        Self {
            success: true,
            share_url: Some(share_url),
            csv_download_url,
            estimate_summary: Some(summary),
            artifacts,
            error: None,
            failed_stage: None,
        }
    }

    pub fn failed(
        error: &EngineError,
        summary: Option<EstimateSummary>,
        artifacts: Option<ArtifactBundle>,
    ) -> Self {
        Self {
            success: false,
            share_url: None,
            csv_download_url: None,
            estimate_summary: summary,
            artifacts,
            error: Some(error.to_string()),
            failed_stage: Some(error.code().to_string()),
        }
    }
}
