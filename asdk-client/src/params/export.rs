//! Export settings and their wire JSON
//!
//! The full export configuration is one recursive section type: the top level
//! and each category (haircuts, outfits, blendshapes) hold the same kind of
//! fields. Most fields can say "as avatar", meaning the service should fall
//! back to the avatar-level value, in which case they are left out of the
//! JSON entirely.

use super::catalog::ParameterCatalog;
use super::tree::{
    Enabled, ExportParameterSpec, GuiColor, Size, ALL_NONE_KEY, ALL_NONE_THRESHOLD,
};
use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Sentinel for "inherit the avatar-level value"
pub const AS_AVATAR: &str = "as avatar";

/// Format forced on the visualization export
pub const VISUAL_FORMAT: &str = "glb";

/// Field that is either set explicitly or inherited from the avatar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inheritable<T> {
    Inherit,
    Set(T),
}

impl<T> Inheritable<T> {
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Inheritable::Inherit => None,
            Inheritable::Set(v) => Some(v),
        }
    }
}

impl<T: Serialize> Serialize for Inheritable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Inheritable::Inherit => serializer.serialize_str(AS_AVATAR),
            Inheritable::Set(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Inheritable<T> {
    /// Accepts the sentinel, a literal `T`, or `"true"`/`"false"` strings for
    /// boolean fields (the shape option pickers produce)
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        if raw.as_str() == Some(AS_AVATAR) {
            return Ok(Inheritable::Inherit);
        }

        match T::deserialize(raw.clone()) {
            Ok(v) => Ok(Inheritable::Set(v)),
            Err(e) => {
                let coerced = match raw.as_str() {
                    Some("true") => Value::Bool(true),
                    Some("false") => Value::Bool(false),
                    _ => return Err(D::Error::custom(e)),
                };
                T::deserialize(coerced)
                    .map(Inheritable::Set)
                    .map_err(D::Error::custom)
            }
        }
    }
}

/// Checkbox list: name → selected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionList(pub BTreeMap<String, bool>);

impl SelectionList {
    /// All names, none selected
    pub fn unselected<S: AsRef<str>>(names: &[S]) -> Self {
        Self(
            names
                .iter()
                .map(|n| (n.as_ref().to_string(), false))
                .collect(),
        )
    }

    pub fn set(&mut self, name: &str, selected: bool) -> bool {
        match self.0.get_mut(name) {
            Some(v) => {
                *v = selected;
                true
            }
            None => false,
        }
    }

    pub fn set_all(&mut self, selected: bool) {
        self.0.values_mut().for_each(|v| *v = selected);
    }

    /// Names whose flag is set
    pub fn selected(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|&(_, &v)| v)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One level of export settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Inheritable<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Inheritable<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointclouds: Option<Inheritable<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_textures: Option<Inheritable<bool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_textures: Option<SelectionList>,
    /// Items of the category to export (haircut names, outfit names, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<SelectionList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lod: Option<Enabled<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Enabled<GuiColor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_size: Option<Enabled<Size>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haircuts: Option<Box<ExportSection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfits: Option<Box<ExportSection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blendshapes: Option<Box<ExportSection>>,

    /// All/none toggle state of this section's list; never sent
    #[serde(
        rename = "_allNone",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub all_none: Option<bool>,

    /// Keys this client does not understand; reported and dropped on output
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

impl ExportSection {
    /// Default export settings for a pipeline and its export catalog
    pub fn from_spec(
        pipeline: &str,
        export_spec: &ExportParameterSpec,
        catalog: &ParameterCatalog,
    ) -> Self {
        let mut root = ExportSection {
            format: Some(Inheritable::Set(catalog.default_format.clone())),
            embed: Some(Inheritable::Set(true)),
            pointclouds: Some(Inheritable::Set(false)),
            embed_textures: Some(Inheritable::Set(false)),
            texture_size: Some(Enabled::off(Size::default())),
            lod: Some(Enabled::off(0)),
            ..Default::default()
        };
        root.set_list_field(
            ListField::AdditionalTextures,
            SelectionList::unselected(catalog.additional_textures_for(pipeline)),
        );

        for (category, values) in export_spec {
            // the catalog sometimes repeats the top-level texture list as a category
            if category == "additional_textures" {
                continue;
            }

            let mut section = ExportSection {
                format: Some(Inheritable::Inherit),
                embed: Some(Inheritable::Inherit),
                pointclouds: Some(Inheritable::Inherit),
                ..Default::default()
            };
            section.set_list_field(ListField::List, SelectionList::unselected(values));

            match category.as_str() {
                "haircuts" => {
                    section.color = Some(Enabled::off(GuiColor::default()));
                    section.texture_size = Some(Enabled::off(Size::default()));
                    section.embed_textures = Some(Inheritable::Inherit);
                    root.haircuts = Some(Box::new(section));
                }
                "outfits" => {
                    section.set_list_field(
                        ListField::AdditionalTextures,
                        SelectionList::unselected(&catalog.additional_textures_outfits),
                    );
                    section.texture_size = Some(Enabled::off(Size::default()));
                    section.embed_textures = Some(Inheritable::Inherit);
                    root.outfits = Some(Box::new(section));
                }
                "blendshapes" => {
                    root.blendshapes = Some(Box::new(section));
                }
                other => {
                    warn!(category = %other, "Unknown export category");
                }
            }
        }

        root
    }

    fn set_list_field(&mut self, field: ListField, list: SelectionList) {
        if list.len() > ALL_NONE_THRESHOLD {
            self.all_none = Some(false);
        }
        match field {
            ListField::List => self.list = Some(list),
            ListField::AdditionalTextures => self.additional_textures = Some(list),
        }
    }

    /// Nested category section by name
    pub fn category_mut(&mut self, name: &str) -> Option<&mut ExportSection> {
        match name {
            "haircuts" => self.haircuts.as_deref_mut(),
            "outfits" => self.outfits.as_deref_mut(),
            "blendshapes" => self.blendshapes.as_deref_mut(),
            _ => None,
        }
    }

    /// Flip the all/none toggle and apply it to this section's lists
    pub fn toggle_all(&mut self) -> Option<bool> {
        let current = !self.all_none?;
        for list in [self.list.as_mut(), self.additional_textures.as_mut()]
            .into_iter()
            .flatten()
        {
            list.set_all(current);
        }
        self.all_none = Some(current);
        Some(current)
    }
}

enum ListField {
    List,
    AdditionalTextures,
}

/// Build the full `export_parameters` object from export settings
///
/// Inherited fields, empty lists, disabled values and empty category
/// sections are all omitted.
pub fn generate_export_parameters(section: &ExportSection) -> Value {
    Value::Object(process_section(section))
}

fn process_section(section: &ExportSection) -> Map<String, Value> {
    let mut ret = Map::new();

    let inheritable = [
        ("format", section.format.as_ref().map(inherit_to_wire)),
        ("embed", section.embed.as_ref().map(inherit_to_wire)),
        ("pointclouds", section.pointclouds.as_ref().map(inherit_to_wire)),
        ("embed_textures", section.embed_textures.as_ref().map(inherit_to_wire)),
    ];
    for (key, value) in inheritable {
        if let Some(Some(v)) = value {
            ret.insert(key.to_string(), v);
        }
    }

    for (key, list) in [
        ("additional_textures", &section.additional_textures),
        ("list", &section.list),
    ] {
        if let Some(list) = list {
            let selected = list.selected();
            if !selected.is_empty() {
                ret.insert(key.to_string(), json!(selected));
            }
        }
    }

    if let Some(lod) = section.lod.as_ref().filter(|e| e.enabled) {
        ret.insert("lod".to_string(), json!(lod.value));
    }
    if let Some(color) = section.color.as_ref().filter(|e| e.enabled) {
        ret.insert("color".to_string(), color.value.to_wire());
    }
    if let Some(size) = section.texture_size.as_ref().filter(|e| e.enabled) {
        ret.insert(
            "texture_size".to_string(),
            json!({"width": size.value.width, "height": size.value.height}),
        );
    }

    for (key, nested) in [
        ("haircuts", &section.haircuts),
        ("outfits", &section.outfits),
        ("blendshapes", &section.blendshapes),
    ] {
        if let Some(nested) = nested {
            let processed = process_section(nested);
            if !processed.is_empty() {
                ret.insert(key.to_string(), Value::Object(processed));
            }
        }
    }

    for key in section.unknown.keys() {
        if key != ALL_NONE_KEY {
            warn!(key = %key, "Unknown export parameter, dropped");
        }
    }

    ret
}

fn inherit_to_wire<T: Serialize>(value: &Inheritable<T>) -> Option<Value> {
    value.as_set().and_then(|v| serde_json::to_value(v).ok())
}

/// Derive the cheap visualization export from the full export JSON
///
/// Always glb with embedded textures. Only `lod`, `texture_size` and `color`
/// carry over, at the top level and for haircuts/outfits, and each category
/// list keeps just its first item.
pub fn generate_visual_export_parameters(full: &Value) -> Value {
    const KEYS_TO_COPY: [&str; 3] = ["lod", "texture_size", "color"];

    let mut ret = Map::new();
    ret.insert("format".to_string(), json!(VISUAL_FORMAT));
    ret.insert("embed".to_string(), json!(true));
    ret.insert("embed_textures".to_string(), json!(true));

    let copy_keys = |source: &Value, target: &mut Map<String, Value>| {
        for key in KEYS_TO_COPY {
            if let Some(v) = source.get(key) {
                target.insert(key.to_string(), v.clone());
            }
        }
    };

    copy_keys(full, &mut ret);

    for category in ["haircuts", "outfits"] {
        let Some(source) = full.get(category) else {
            continue;
        };

        let mut target = Map::new();
        if let Some(first) = source
            .get("list")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
        {
            target.insert("list".to_string(), json!([first]));
        }
        copy_keys(source, &mut target);

        ret.insert(category.to_string(), Value::Object(target));
    }

    Value::Object(ret)
}
