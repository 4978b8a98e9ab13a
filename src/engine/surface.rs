//! The concrete map of the driven calculator UI: which selectors identify
//! which controls, fields and affordances. The third party owns this surface
//! and changes it without notice, so every hook lives in this one module and
//! the fragile ones are ordered candidate lists (first present wins).

/// Entry point of the driven calculator.
pub const CALCULATOR_URL: &str = "https://cloud.google.com/products/calculator";

/// Share URLs must resolve to this domain to be accepted.
pub const SHARE_URL_DOMAIN: &str = "cloud.google.com";

/// A dropdown-style control: the trigger element plus a human name for logs.
/// The option-list surface is resolved at runtime through the trigger's
/// `aria-controls`/`aria-owns` relationship.
#[derive(Debug, Clone)]
pub struct ControlRef {
    pub name: &'static str,
    pub trigger: String,
}

impl ControlRef {
    fn combobox(name: &'static str, aria_label: &str) -> Self {
        Self {
            name,
            trigger: format!("[role=\"combobox\"][aria-label=\"{}\"]", aria_label),
        }
    }
}

/// A free-text/numeric field plus its optional stepper affordances.
#[derive(Debug, Clone)]
pub struct FieldRef {
    pub name: &'static str,
    pub input: String,
    pub increment: Option<String>,
    pub decrement: Option<String>,
}

pub fn region_control() -> ControlRef {
    ControlRef::combobox("region", "Region")
}

pub fn provisioning_model_control() -> ControlRef {
    ControlRef::combobox("provisioning model", "Provisioning model")
}

pub fn series_control() -> ControlRef {
    ControlRef::combobox("series", "Series")
}

pub fn machine_type_control() -> ControlRef {
    ControlRef::combobox("machine type", "Machine type")
}

pub fn usage_units_control() -> ControlRef {
    ControlRef::combobox("usage units", "Units")
}

pub fn time_period_control() -> ControlRef {
    ControlRef::combobox("time period", "Time period")
}

pub fn operating_system_control() -> ControlRef {
    ControlRef::combobox("operating system", "Operating System / Software")
}

pub fn committed_use_control() -> ControlRef {
    ControlRef::combobox("committed use", "Committed use discount options")
}

pub fn instance_count_field() -> FieldRef {
    FieldRef {
        name: "instance count",
        input: "input[aria-label=\"Number of instances\"]".to_string(),
        increment: Some("button[aria-label=\"Increment number of instances\"]".to_string()),
        decrement: Some("button[aria-label=\"Decrement number of instances\"]".to_string()),
    }
}

pub fn usage_hours_field() -> FieldRef {
    FieldRef {
        name: "usage hours",
        input: "input[aria-label=\"Total instance usage time\"]".to_string(),
        increment: Some("button[aria-label=\"Increment usage time\"]".to_string()),
        decrement: Some("button[aria-label=\"Decrement usage time\"]".to_string()),
    }
}

/// Top-level action that opens the product picker.
pub fn add_to_estimate_candidates() -> Vec<String> {
    vec![
        "button[aria-label=\"Add to estimate\"]".to_string(),
        "[data-action=\"add-to-estimate\"]".to_string(),
        "button.add-estimate".to_string(),
    ]
}

pub fn picker_surface_candidates() -> Vec<String> {
    vec![
        "[role=\"dialog\"][aria-label=\"Add to this estimate\"]".to_string(),
        "[role=\"dialog\"][aria-modal=\"true\"]".to_string(),
    ]
}

/// Product tile inside the picker, identified by stable attributes rather
/// than position.
pub fn product_tile_candidates(service: &str) -> Vec<String> {
    vec![
        format!("[data-service=\"{}\"]", service),
        format!("[role=\"button\"][aria-label=\"{}\"]", service),
        format!("[role=\"option\"][aria-label=\"{}\"]", service),
    ]
}

/// Present once the per-instance configuration form has rendered.
pub fn config_form_ready() -> String {
    "input[aria-label=\"Number of instances\"]".to_string()
}

/// Commits the configured instance to the estimate.
pub fn commit_candidates() -> Vec<String> {
    vec![
        "button[aria-label=\"Add configuration to estimate\"]".to_string(),
        "[data-action=\"commit-configuration\"]".to_string(),
        "button[aria-label=\"Update estimate\"]".to_string(),
    ]
}

/// One committed line item in the estimate rail.
pub fn estimate_item_selector() -> String {
    "[aria-label=\"Estimate summary\"] [role=\"listitem\"]".to_string()
}

/// Best-effort per-item subtotal text.
pub fn subtotal_candidates() -> Vec<String> {
    vec![
        "[aria-label=\"Estimate summary\"] [role=\"listitem\"]:last-child [data-price]"
            .to_string(),
        "[aria-label=\"Estimate summary\"] [role=\"listitem\"]:last-child .price".to_string(),
    ]
}

pub fn share_button_candidates() -> Vec<String> {
    vec![
        "button[aria-label=\"Open Share Estimate dialog\"]".to_string(),
        "button[aria-label=\"Share\"]".to_string(),
        "[data-action=\"share-estimate\"]".to_string(),
    ]
}

pub fn share_surface_candidates() -> Vec<String> {
    vec![
        "[role=\"dialog\"][aria-label=\"Share Estimate\"]".to_string(),
        "[role=\"dialog\"][aria-label=\"Share estimate\"]".to_string(),
    ]
}

pub fn copy_link_candidates() -> Vec<String> {
    vec![
        "button[aria-label=\"Copy link\"]".to_string(),
        "[data-action=\"copy-share-link\"]".to_string(),
        "button.copy-link".to_string(),
    ]
}

/// Where the generated link becomes DOM-visible: a readonly field first,
/// then any input inside the dialog. The clipboard is handled separately by
/// the controller as a last resort.
pub fn share_url_field_candidates() -> Vec<String> {
    vec![
        "[role=\"dialog\"] input[aria-label=\"Share link\"]".to_string(),
        "[role=\"dialog\"] input[readonly]".to_string(),
        "[role=\"dialog\"] input[type=\"text\"]".to_string(),
    ]
}

/// CSV-export affordance on the share surface. Absence is not a failure.
pub fn csv_link_candidates() -> Vec<String> {
    vec![
        "a[aria-label=\"Download CSV\"]".to_string(),
        "a[href$=\".csv\"]".to_string(),
        "a[download][href*=\"csv\"]".to_string(),
    ]
}
