//! Pipelines and their subtypes
//!
//! A pipeline selection is shown and entered as `"pipeline | subtype"`.

use crate::error::{AsdkError, AsdkResult};
use std::fmt;

/// Separator between pipeline and subtype in a label
pub const LABEL_SEPARATOR: &str = " | ";

/// Built-in pipelines with their subtypes
pub const PIPELINES: &[(&str, &[&str])] = &[
    ("head_1.2", &["base/static", "base/legacy", "base/mobile"]),
    ("head_2.0", &["bust/mobile", "bust/static", "head/mobile"]),
    ("body_0.3", &["mobile", "female", "male"]),
];

/// Chosen pipeline and subtype
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSelection {
    pub pipeline: String,
    pub subtype: String,
}

impl PipelineSelection {
    pub fn new(pipeline: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            subtype: subtype.into(),
        }
    }

    /// Parse a `"pipeline | subtype"` label and check it against the catalog
    pub fn parse(label: &str) -> AsdkResult<Self> {
        let (pipeline, subtype) = label
            .split_once(LABEL_SEPARATOR.trim())
            .map(|(p, s)| (p.trim(), s.trim()))
            .ok_or_else(|| AsdkError::Validation("Please select a pipeline".to_string()))?;

        let selection = Self::new(pipeline, subtype);
        selection.validate()?;
        Ok(selection)
    }

    /// Whether the pipeline and subtype exist in the built-in catalog
    pub fn validate(&self) -> AsdkResult<()> {
        let known = PIPELINES
            .iter()
            .find(|(p, _)| *p == self.pipeline)
            .is_some_and(|(_, subtypes)| subtypes.contains(&self.subtype.as_str()));

        if known {
            Ok(())
        } else {
            Err(AsdkError::Validation("Please select a pipeline".to_string()))
        }
    }

    pub fn label(&self) -> String {
        format!("{}{}{}", self.pipeline, LABEL_SEPARATOR, self.subtype)
    }
}

impl fmt::Display for PipelineSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Every catalog selection, in catalog order
pub fn all_selections() -> Vec<PipelineSelection> {
    PIPELINES
        .iter()
        .flat_map(|(pipeline, subtypes)| {
            subtypes
                .iter()
                .map(move |subtype| PipelineSelection::new(*pipeline, *subtype))
        })
        .collect()
}
