//! Parameter catalog: the name tables that decide a parameter's kind
//!
//! The service's parameter listing carries names only, no types. The kind of
//! each parameter is inferred from static membership in these tables, so the
//! tables are data: `ParameterCatalog::default()` holds the built-in set, and
//! a replacement can be deserialized from JSON or TOML without touching the
//! transformation code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inferred kind of a computation parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    Boolean,
    Float,
    Integer,
    /// RGB, components 0-255
    Color,
    /// width x height
    Size,
    /// One of a fixed set of strings
    Options(Vec<String>),
}

/// Name tables for kind inference and default export settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterCatalog {
    /// Categories whose every parameter is a boolean flag
    pub boolean_categories: Vec<String>,
    /// Categories serialized as `{name: value}` instead of a list of names
    pub dict_categories: Vec<String>,
    pub boolean_parameters: Vec<String>,
    pub float_parameters: Vec<String>,
    pub integer_parameters: Vec<String>,
    pub color_parameters: Vec<String>,
    pub size_parameters: Vec<String>,
    pub options_parameters: BTreeMap<String, Vec<String>>,

    /// Extra textures offered for body pipelines
    pub additional_textures_body: Vec<String>,
    /// Extra textures offered for outfits
    pub additional_textures_outfits: Vec<String>,
    /// Extra textures offered for head pipelines
    pub additional_textures_head: Vec<String>,
    /// Export model formats
    pub formats: Vec<String>,
    /// Format preselected for the full export
    pub default_format: String,
    /// Pipeline whose exports use the body texture list
    pub body_pipeline: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ParameterCatalog {
    fn default() -> Self {
        let body = strings(&["normal_map", "roughness_map", "metallic_map"]);
        let mut outfits = body.clone();
        outfits.push("body_visibility_mask".to_string());

        let mut options_parameters = BTreeMap::new();
        options_parameters.insert(
            "gender".to_string(),
            strings(&["non_binary", "female", "male"]),
        );

        Self {
            boolean_categories: strings(&[
                "haircuts",
                "blendshapes",
                "model_info",
                "additional_textures",
            ]),
            dict_categories: strings(&[
                "shape_modifications",
                "avatar_modifications",
                "body_shape",
            ]),
            boolean_parameters: strings(&[
                "add_eyelid_shadow",
                "add_glare",
                "allow_modify_neck",
                "curved_bottom",
                "enhance_lighting",
                "parametric_eyes_texture",
                "parametric_eyes_texture_v2",
                "remove_smile",
                "remove_stubble",
                "remove_glasses",
                "repack_texture",
                "slightly_cartoonish_texture",
            ]),
            float_parameters: strings(&[
                "caricature_amount",
                "cartoonish_v0.3",
                "cartoonish_v1.0",
                "height",
                "weight",
                "chest",
                "waist",
                "hips",
            ]),
            integer_parameters: strings(&["generated_haircut_faces_count"]),
            color_parameters: strings(&[
                "eye_iris_color",
                "eye_sclera_color",
                "hair_color",
                "lips_color",
                "teeth_color",
            ]),
            size_parameters: strings(&["generated_haircut_texture_size", "texture_size"]),
            options_parameters,
            additional_textures_body: body,
            additional_textures_outfits: outfits,
            additional_textures_head: strings(&["roughness_map", "metallic_map", "lips_mask"]),
            formats: strings(&["gltf", "glb", "fbx", "obj", "ply"]),
            default_format: "glb".to_string(),
            body_pipeline: "body_0.3".to_string(),
        }
    }
}

fn contains(list: &[String], name: &str) -> bool {
    list.iter().any(|s| s == name)
}

impl ParameterCatalog {
    pub fn is_boolean_category(&self, category: &str) -> bool {
        contains(&self.boolean_categories, category)
    }

    pub fn is_dict_category(&self, category: &str) -> bool {
        contains(&self.dict_categories, category)
    }

    /// Whether a parameter is a plain flag, either by category or by name
    pub fn is_boolean(&self, category: &str, parameter: &str) -> bool {
        self.is_boolean_category(category) || contains(&self.boolean_parameters, parameter)
    }

    pub fn is_color(&self, parameter: &str) -> bool {
        contains(&self.color_parameters, parameter)
    }

    /// Infer the kind of `parameter` within `category`
    ///
    /// Returns `None` for names that appear in no table.
    pub fn kind_of(&self, category: &str, parameter: &str) -> Option<ParameterKind> {
        if self.is_boolean(category, parameter) {
            Some(ParameterKind::Boolean)
        } else if contains(&self.float_parameters, parameter) {
            Some(ParameterKind::Float)
        } else if contains(&self.integer_parameters, parameter) {
            Some(ParameterKind::Integer)
        } else if self.is_color(parameter) {
            Some(ParameterKind::Color)
        } else if contains(&self.size_parameters, parameter) {
            Some(ParameterKind::Size)
        } else {
            self.options_parameters
                .get(parameter)
                .map(|options| ParameterKind::Options(options.clone()))
        }
    }

    /// Top-level additional textures offered for `pipeline`
    pub fn additional_textures_for(&self, pipeline: &str) -> &[String] {
        if pipeline == self.body_pipeline {
            &self.additional_textures_body
        } else {
            &self.additional_textures_head
        }
    }
}
