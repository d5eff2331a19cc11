//! Settings → wire JSON over realistic service listings

use asdk_client::params::{
    export_parameters_pair, generate_computation_parameters, generate_export_parameters,
    generate_visual_export_parameters, remove_export_duplicates, ConfigTree, Enabled,
    ExportParameterSpec, ExportSection, GuiColor, Inheritable, ParamValue, ParameterCatalog,
    ParameterSpec, Size, TreeValue,
};
use serde_json::{json, Value};

fn head_listing() -> (ParameterSpec, ExportParameterSpec) {
    let spec: ParameterSpec = serde_json::from_value(json!({
        "bust/mobile": {
            "haircuts": ["bob", "long"],
            "model_info": ["hair_color", "gender", "age", "race"],
            "plus": ["remove_smile", "add_glare", "caricature_amount", "generated_haircut_faces_count"],
            "avatar_modifications": [
                "hair_color", "eye_iris_color", "texture_size", "remove_glasses", "cartoonish_v1.0"
            ],
            "shape_modifications": {
                "face": ["cartoonish_v0.3"]
            }
        }
    }))
    .unwrap();

    let export_spec: ExportParameterSpec = serde_json::from_value(json!({
        "haircuts": ["bob", "long", "short", "balding", "wavy"],
        "outfits": ["suit"],
        "blendshapes": ["basic", "visemes"]
    }))
    .unwrap();

    (spec, export_spec)
}

fn default_tree() -> ConfigTree {
    let (spec, export_spec) = head_listing();
    ConfigTree::from_spec(
        &remove_export_duplicates(spec, &export_spec),
        &ParameterCatalog::default(),
    )
}

#[test]
fn test_untouched_defaults_send_nothing() {
    let tree = default_tree();
    let catalog = ParameterCatalog::default();

    assert!(tree.get("haircuts..bob").is_none());
    assert_eq!(tree.get("model_info._allNone"), Some(&TreeValue::Flag(false)));
    assert_eq!(generate_computation_parameters(&tree, &catalog), json!({}));
}

#[test]
fn test_enabled_tree_matches_fixture() {
    let mut tree = default_tree();
    let catalog = ParameterCatalog::default();

    assert_eq!(tree.toggle_all("model_info"), Some(true));
    assert!(tree.set_enabled("plus..add_glare", true));
    assert!(tree.set_value("plus..caricature_amount", ParamValue::Float(0.75)));
    assert!(tree.set_value(
        "avatar_modifications..eye_iris_color",
        ParamValue::Color(GuiColor { r: 0, g: 128, b: 255 })
    ));
    assert!(tree.set_value(
        "avatar_modifications..texture_size",
        ParamValue::Size(Size { width: 2048, height: 2048 })
    ));
    assert!(tree.set_enabled("avatar_modifications..remove_glasses", true));
    assert!(tree.set_value("shape_modifications.face.cartoonish_v0.3", ParamValue::Float(1.0)));

    // set then switched back off: must not appear
    assert!(tree.set_value("avatar_modifications..cartoonish_v1.0", ParamValue::Float(0.3)));
    assert!(tree.set_enabled("avatar_modifications..cartoonish_v1.0", false));

    assert_eq!(
        generate_computation_parameters(&tree, &catalog),
        json!({
            "model_info": ["age", "gender", "hair_color", "race"],
            "plus": ["add_glare", "caricature_amount"],
            "avatar_modifications": {
                "eye_iris_color": {"red": 0, "green": 128, "blue": 255},
                "texture_size": {"width": 2048, "height": 2048},
                "remove_glasses": true
            },
            "shape_modifications": {"face": {"cartoonish_v0.3": 1.0}}
        })
    );
}

#[test]
fn test_tree_survives_json_round_trip() {
    let mut tree = default_tree();
    tree.set_value(
        "avatar_modifications..hair_color",
        ParamValue::Color(GuiColor { r: 1, g: 2, b: 3 }),
    );

    let text = serde_json::to_string(&tree).unwrap();
    let back: ConfigTree = serde_json::from_str(&text).unwrap();

    let catalog = ParameterCatalog::default();
    assert_eq!(
        generate_computation_parameters(&back, &catalog),
        generate_computation_parameters(&tree, &catalog)
    );
}

fn inherit_everything(section: &mut ExportSection) {
    section.format = Some(Inheritable::Inherit);
    section.embed = Some(Inheritable::Inherit);
    section.pointclouds = Some(Inheritable::Inherit);
    section.embed_textures = Some(Inheritable::Inherit);
}

#[test]
fn test_inherit_only_export_is_empty_at_every_level() {
    let (_, export_spec) = head_listing();
    let mut root = ExportSection::from_spec("head_2.0", &export_spec, &ParameterCatalog::default());

    inherit_everything(&mut root);
    for name in ["haircuts", "outfits", "blendshapes"] {
        inherit_everything(root.category_mut(name).unwrap());
    }

    assert_eq!(generate_export_parameters(&root), json!({}));
}

#[test]
fn test_export_settings_loaded_from_user_json() {
    let section: ExportSection = serde_json::from_value(json!({
        "format": "fbx",
        "embed": "false",
        "pointclouds": "as avatar",
        "texture_size": {"enabled": true, "value": {"width": 1024, "height": 1024}},
        "haircuts": {
            "format": "as avatar",
            "list": {"bob": true, "long": false, "wavy": true},
            "color": {"enabled": true, "value": {"r": 10, "g": 20, "b": 30}},
            "_allNone": false
        },
        "outfits": {
            "list": {"suit": true},
            "additional_textures": {"normal_map": true, "body_visibility_mask": false},
            "embed_textures": true
        }
    }))
    .unwrap();

    let full = generate_export_parameters(&section);
    assert_eq!(
        full,
        json!({
            "format": "fbx",
            "embed": false,
            "texture_size": {"width": 1024, "height": 1024},
            "haircuts": {
                "list": ["bob", "wavy"],
                "color": {"red": 10, "green": 20, "blue": 30}
            },
            "outfits": {
                "list": ["suit"],
                "additional_textures": ["normal_map"],
                "embed_textures": true
            }
        })
    );

    let visual = generate_visual_export_parameters(&full);
    assert_eq!(visual["format"], "glb");
    assert_eq!(visual["embed"], true);
    assert_eq!(visual["embed_textures"], true);
    assert_eq!(visual["texture_size"], json!({"width": 1024, "height": 1024}));
    assert_eq!(visual["haircuts"]["list"], json!(["bob"]));
    assert_eq!(visual["outfits"], json!({"list": ["suit"]}));
}

#[test]
fn test_visual_export_truncates_every_list() {
    let fulls = [
        json!({}),
        json!({"format": "obj", "embed": false, "embed_textures": false}),
        json!({"haircuts": {"list": ["a", "b", "c"]}, "outfits": {"list": []}}),
        json!({"outfits": {"list": ["x", "y"], "lod": 1}}),
    ];

    for full in fulls {
        let visual = generate_visual_export_parameters(&full);
        assert_eq!(visual["format"], "glb");
        assert_eq!(visual["embed"], true);
        assert_eq!(visual["embed_textures"], true);

        for category in ["haircuts", "outfits"] {
            let len = visual
                .get(category)
                .and_then(|c| c.get("list"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            assert!(len <= 1, "{} list too long in {}", category, visual);
        }
    }
}

#[test]
fn test_export_pair_is_visual_then_full() {
    let (_, export_spec) = head_listing();
    let mut root = ExportSection::from_spec("head_2.0", &export_spec, &ParameterCatalog::default());
    root.lod = Some(Enabled::on(1));

    let pair = export_parameters_pair(&root);
    let pair = pair.as_array().unwrap();

    assert_eq!(pair.len(), 2);
    assert_eq!(pair[0]["embed_textures"], true);
    assert_eq!(pair[1]["embed_textures"], false);
    assert_eq!(pair[0]["lod"], 1);
    assert_eq!(pair[1]["lod"], 1);
}
