//! Parameter transformation engine
//!
//! Turns the editable settings (computation tree and export sections) into
//! the JSON the service expects on avatar submission.

pub mod catalog;
pub mod computation;
pub mod export;
pub mod tree;

pub use catalog::{ParameterCatalog, ParameterKind};
pub use computation::generate_computation_parameters;
pub use export::{
    generate_export_parameters, generate_visual_export_parameters, ExportSection, Inheritable,
    SelectionList,
};
pub use tree::{
    remove_export_duplicates, CategoryParameters, ConfigTree, Enabled, ExportParameterSpec,
    GuiColor, ParamValue, ParameterSpec, Size, TreeValue,
};

use serde_json::Value;

/// Wire value of the `export_parameters` form field: `[visual, full]`
pub fn export_parameters_pair(section: &ExportSection) -> Value {
    let full = generate_export_parameters(section);
    let visual = generate_visual_export_parameters(&full);
    Value::Array(vec![visual, full])
}
