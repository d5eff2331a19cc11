//! Editable settings tree for computation parameters
//!
//! Keys are `category.group.parameter` (group is empty for ungrouped
//! categories). A boolean parameter stores a plain flag; every other kind is
//! wrapped with an `enabled` switch. A missing key means "not enabled".

use super::catalog::{ParameterCatalog, ParameterKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Reserved leaf that toggles every flag of a category at once
pub const ALL_NONE_KEY: &str = "_allNone";

/// Boolean categories with more parameters than this get an all/none toggle
pub const ALL_NONE_THRESHOLD: usize = 3;

/// Parameters of one category: a flat list, or lists keyed by group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryParameters {
    Flat(Vec<String>),
    Grouped(BTreeMap<String, Vec<String>>),
}

impl CategoryParameters {
    /// Number of parameters across all groups
    pub fn len(&self) -> usize {
        match self {
            CategoryParameters::Flat(names) => names.len(),
            CategoryParameters::Grouped(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(group, parameter)` pairs; group is `""` for flat categories
    pub fn entries(&self) -> Vec<(&str, &str)> {
        match self {
            CategoryParameters::Flat(names) => names.iter().map(|p| ("", p.as_str())).collect(),
            CategoryParameters::Grouped(groups) => groups
                .iter()
                .flat_map(|(g, names)| names.iter().map(move |p| (g.as_str(), p.as_str())))
                .collect(),
        }
    }
}

/// Server-declared catalog of computation parameters: subtype → category → parameters
pub type ParameterSpec = BTreeMap<String, BTreeMap<String, CategoryParameters>>;

/// Server-declared catalog of export parameters: category → selectable names
pub type ExportParameterSpec = BTreeMap<String, Vec<String>>;

/// Drop computation categories that the export catalog also declares
///
/// Such categories (haircuts, blendshapes, ...) are configured through the
/// export parameters instead.
pub fn remove_export_duplicates(
    mut spec: ParameterSpec,
    export_spec: &ExportParameterSpec,
) -> ParameterSpec {
    if let Some(categories) = spec.values_mut().next() {
        categories.retain(|category, _| !export_spec.contains_key(category));
    }
    spec
}

/// Color as edited: `{r, g, b}` with 0-255 components
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl GuiColor {
    /// Wire shape `{red, green, blue}`
    pub fn to_wire(self) -> Value {
        json!({"red": self.r, "green": self.g, "blue": self.b})
    }
}

/// Texture or image size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// Value carried by an enable-wrapped parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Color(GuiColor),
    Size(Size),
    Integer(i64),
    Float(f64),
    Choice(String),
}

impl ParamValue {
    /// JSON sent to the service; colors change shape, everything else is copied
    pub fn to_wire(&self) -> Value {
        match self {
            ParamValue::Color(c) => c.to_wire(),
            ParamValue::Size(s) => json!({"width": s.width, "height": s.height}),
            ParamValue::Integer(i) => json!(i),
            ParamValue::Float(f) => json!(f),
            ParamValue::Choice(s) => json!(s),
        }
    }
}

/// A value paired with a switch deciding whether it is sent at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enabled<T> {
    pub enabled: bool,
    pub value: T,
}

impl<T> Enabled<T> {
    /// Disabled wrapper around a default value
    pub fn off(value: T) -> Self {
        Self {
            enabled: false,
            value,
        }
    }

    pub fn on(value: T) -> Self {
        Self {
            enabled: true,
            value,
        }
    }
}

/// One leaf of the settings tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeValue {
    Flag(bool),
    Wrapped(Enabled<ParamValue>),
}

impl TreeValue {
    /// Truthiness of the stored value
    ///
    /// A wrapped value counts by its `enabled` switch.
    pub fn is_truthy(&self) -> bool {
        match self {
            TreeValue::Flag(b) => *b,
            TreeValue::Wrapped(e) => e.enabled,
        }
    }

    /// The `enabled` switch, `false` for plain flags
    pub fn enabled_flag(&self) -> bool {
        matches!(self, TreeValue::Wrapped(e) if e.enabled)
    }
}

/// Parsed `category.group.parameter` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterKey<'a> {
    pub category: &'a str,
    pub group: &'a str,
    pub parameter: &'a str,
}

impl<'a> ParameterKey<'a> {
    /// Split a tree key
    ///
    /// Only the first two dots separate; parameter names such as
    /// `cartoonish_v0.3` keep their own dots.
    pub fn parse(key: &'a str) -> Self {
        let mut parts = key.splitn(3, '.');
        Self {
            category: parts.next().unwrap_or(""),
            group: parts.next().unwrap_or(""),
            parameter: parts.next().unwrap_or(""),
        }
    }

    /// Whether this is a category's all/none toggle rather than a parameter
    pub fn is_all_none(&self) -> bool {
        self.group == ALL_NONE_KEY
    }
}

/// Build a tree key
pub fn tree_key(category: &str, group: &str, parameter: &str) -> String {
    [category, group, parameter].join(".")
}

/// Editable computation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree {
    entries: BTreeMap<String, TreeValue>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default tree for a parameter listing: everything present, nothing enabled
    ///
    /// Uses the first subtype of `spec`. Names the catalog cannot classify are
    /// reported and left out.
    pub fn from_spec(spec: &ParameterSpec, catalog: &ParameterCatalog) -> Self {
        let mut tree = Self::new();

        let Some(categories) = spec.values().next() else {
            return tree;
        };

        for (category, parameters) in categories {
            if catalog.is_boolean_category(category) && parameters.len() > ALL_NONE_THRESHOLD {
                tree.insert(
                    format!("{}.{}", category, ALL_NONE_KEY),
                    TreeValue::Flag(false),
                );
            }

            for (group, parameter) in parameters.entries() {
                let key = tree_key(category, group, parameter);

                let value = match catalog.kind_of(category, parameter) {
                    Some(ParameterKind::Boolean) => TreeValue::Flag(false),
                    Some(ParameterKind::Float) => wrapped_off(ParamValue::Float(0.0)),
                    Some(ParameterKind::Integer) => wrapped_off(ParamValue::Integer(0)),
                    Some(ParameterKind::Color) => {
                        wrapped_off(ParamValue::Color(GuiColor::default()))
                    }
                    Some(ParameterKind::Size) => wrapped_off(ParamValue::Size(Size::default())),
                    Some(ParameterKind::Options(options)) => match options.first() {
                        Some(first) => wrapped_off(ParamValue::Choice(first.clone())),
                        None => {
                            warn!(key = %key, "Options parameter without options");
                            continue;
                        }
                    },
                    None => {
                        warn!(key = %key, "Unknown parameter");
                        continue;
                    }
                };

                tree.insert(key, value);
            }
        }

        tree
    }

    pub fn insert(&mut self, key: impl Into<String>, value: TreeValue) -> Option<TreeValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&TreeValue> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TreeValue> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TreeValue> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Switch a leaf on or off, whatever its shape
    ///
    /// Returns `false` if the key does not exist.
    pub fn set_enabled(&mut self, key: &str, enabled: bool) -> bool {
        match self.entries.get_mut(key) {
            Some(TreeValue::Flag(b)) => {
                *b = enabled;
                true
            }
            Some(TreeValue::Wrapped(e)) => {
                e.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Set the value of a wrapped leaf and enable it
    pub fn set_value(&mut self, key: &str, value: ParamValue) -> bool {
        match self.entries.get_mut(key) {
            Some(TreeValue::Wrapped(e)) => {
                e.value = value;
                e.enabled = true;
                true
            }
            _ => false,
        }
    }

    /// Flip the all/none toggle of `category` and apply it to every flag in it
    ///
    /// Returns the new state, or `None` when the category has no toggle.
    pub fn toggle_all(&mut self, category: &str) -> Option<bool> {
        let marker = format!("{}.{}", category, ALL_NONE_KEY);
        let current = !self.entries.get(&marker)?.is_truthy();

        for (key, value) in self.entries.iter_mut() {
            let parsed = ParameterKey::parse(key);
            if parsed.category != category {
                continue;
            }
            match value {
                TreeValue::Flag(b) => *b = current,
                TreeValue::Wrapped(e) => e.enabled = current,
            }
        }

        Some(current)
    }
}

fn wrapped_off(value: ParamValue) -> TreeValue {
    TreeValue::Wrapped(Enabled::off(value))
}
