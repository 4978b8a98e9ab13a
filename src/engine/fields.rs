use std::time::Duration;

use tracing::{debug, warn};

use crate::core::config::FieldConfig;
use crate::core::driver::PageDriver;
use crate::engine::surface::FieldRef;
use crate::errors::Result;

/// Outcome of one field write. `settled == false` means every strategy left
/// the field disagreeing with the requested value; the discrepancy is
/// surfaced through the line item, never as a stage failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReport {
    pub field: String,
    pub requested: String,
    pub observed: Option<String>,
    pub settled: bool,
    pub strategy: Option<&'static str>,
}

impl FieldReport {
    pub fn note(&self) -> Option<String> {
        if self.settled {
            None
        } else {
            Some(format!(
                "{}: requested '{}' but field shows '{}'",
                self.field,
                self.requested,
                self.observed.as_deref().unwrap_or("<unreadable>")
            ))
        }
    }
}

/// Sets free-text/numeric fields with layered verification: one-shot fill,
/// then character-by-character typing, then the stepper affordances. Each
/// layer only runs if the previous one failed its post-write check.
pub struct FieldSetter {
    config: FieldConfig,
}

impl FieldSetter {
    pub fn new(config: FieldConfig) -> Self {
        Self { config }
    }

    pub async fn set<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        field: &FieldRef,
        value: &str,
    ) -> Result<FieldReport> {
        let mut applied: Option<&'static str> = None;
        for name in ["fill", "type", "stepper"] {
            let attempt = match name {
                "fill" => self.fill_strategy(page, field, value).await,
                "type" => self.type_strategy(page, field, value).await,
                _ => self.stepper_strategy(page, field, value).await,
            };
            match attempt {
                Ok(()) => {
                    tokio::time::sleep(Duration::from_millis(self.config.confirm_wait_ms)).await;
                    if self.verify(page, field, value).await {
                        debug!(field = field.name, strategy = name, value, "field write verified");
                        applied = Some(name);
                        break;
                    }
                    warn!(field = field.name, strategy = name, "write did not verify, escalating");
                }
                Err(err) => {
                    warn!(field = field.name, strategy = name, error = %err, "strategy failed");
                }
            }
        }

        // Authoritative final read; discrepancies travel in the report.
        let observed = page.read_value(&field.input).await.ok();
        let settled = observed
            .as_deref()
            .map(|o| values_equal(o, value))
            .unwrap_or(false);
        if !settled {
            warn!(
                field = field.name,
                requested = value,
                observed = observed.as_deref().unwrap_or("<unreadable>"),
                "field left unsettled"
            );
        }
        Ok(FieldReport {
            field: field.name.to_string(),
            requested: value.to_string(),
            observed,
            settled,
            strategy: applied,
        })
    }

    async fn fill_strategy<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        field: &FieldRef,
        value: &str,
    ) -> Result<()> {
        page.click(&field.input).await?;
        page.fill(&field.input, value).await?;
        page.press_key("Enter").await
    }

    async fn type_strategy<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        field: &FieldRef,
        value: &str,
    ) -> Result<()> {
        page.fill(&field.input, "").await?;
        page.click(&field.input).await?;
        page.type_text(&field.input, value).await?;
        page.press_key("Tab").await
    }

    /// Numeric-only fallback: press the increment/decrement affordances the
    /// computed delta count, bounded by the configured cap.
    async fn stepper_strategy<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        field: &FieldRef,
        value: &str,
    ) -> Result<()> {
        let target: i64 = value.trim().parse().map_err(|_| {
            crate::errors::EngineError::Driver(format!(
                "stepper fallback needs a numeric target, got '{}'",
                value
            ))
        })?;
        let current: i64 = page
            .read_value(&field.input)
            .await?
            .trim()
            .parse()
            .unwrap_or(0);

        let delta = target - current;
        let button = if delta >= 0 {
            field.increment.as_ref()
        } else {
            field.decrement.as_ref()
        };
        let Some(button) = button else {
            return Err(crate::errors::EngineError::Driver(format!(
                "field '{}' has no stepper affordance",
                field.name
            )));
        };

        let presses = delta.unsigned_abs().min(self.config.stepper_cap as u64);
        debug!(field = field.name, delta, presses, "stepper fallback engaged");
        for _ in 0..presses {
            page.click(button).await?;
        }
        Ok(())
    }

    async fn verify<D: PageDriver + ?Sized>(
        &self,
        page: &D,
        field: &FieldRef,
        value: &str,
    ) -> bool {
        match page.read_value(&field.input).await {
            Ok(observed) => values_equal(&observed, value),
            Err(_) => false,
        }
    }
}

fn values_equal(observed: &str, requested: &str) -> bool {
    let observed = observed.trim();
    let requested = requested.trim();
    if observed == requested {
        return true;
    }
    // "730" vs "730.0" vs " 730 " from re-rendered numeric inputs.
    match (observed.parse::<f64>(), requested.parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() < f64::EPSILON,
        _ => false,
    }
}
