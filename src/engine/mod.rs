pub mod controller;
pub mod fields;
pub mod selector;
pub mod sequencer;
pub mod surface;

pub use controller::EstimateEngine;
pub use fields::{FieldReport, FieldSetter};
pub use selector::{ControlSelector, OptionTarget, SelectOutcome};
pub use sequencer::{InstanceOutcome, InstanceSequencer, Stage};
