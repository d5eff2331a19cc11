//! Settings tree → `parameters` wire JSON
//!
//! Disabled leaves are omitted. Dict categories become `{name: value}`
//! objects; every other category becomes a list of enabled names. A non-empty
//! group adds one level of nesting under the category.

use super::catalog::ParameterCatalog;
use super::tree::{ConfigTree, ParameterKey, TreeValue};
use serde_json::{Map, Value};
use tracing::warn;

/// Build the computation `parameters` object from a settings tree
///
/// Pure: the same tree always produces the same JSON.
pub fn generate_computation_parameters(tree: &ConfigTree, catalog: &ParameterCatalog) -> Value {
    let mut ret = Map::new();

    for (key, value) in tree.iter() {
        let parsed = ParameterKey::parse(key);
        if parsed.is_all_none() {
            continue;
        }

        let is_boolean = catalog.is_boolean(parsed.category, parsed.parameter);
        let is_enabled = (is_boolean && value.is_truthy()) || value.enabled_flag();
        if !is_enabled {
            continue;
        }

        let is_dict = catalog.is_dict_category(parsed.category);
        let has_group = !parsed.group.is_empty();

        let category = ret
            .entry(parsed.category.to_string())
            .or_insert_with(|| empty_container(has_group || is_dict));

        let target = if has_group {
            match category {
                Value::Object(groups) => groups
                    .entry(parsed.group.to_string())
                    .or_insert_with(|| empty_container(is_dict)),
                _ => {
                    warn!(key = %key, "Grouped parameter in an ungrouped category, skipped");
                    continue;
                }
            }
        } else {
            category
        };

        match target {
            Value::Object(obj) if is_dict => {
                let wire = match value {
                    TreeValue::Wrapped(e) if !is_boolean => e.value.to_wire(),
                    _ => Value::Bool(true),
                };
                obj.insert(parsed.parameter.to_string(), wire);
            }
            Value::Array(names) if !is_dict => {
                names.push(Value::String(parsed.parameter.to_string()));
            }
            _ => {
                warn!(key = %key, "Parameter does not fit its category layout, skipped");
            }
        }
    }

    Value::Object(ret)
}

fn empty_container(object: bool) -> Value {
    if object {
        Value::Object(Map::new())
    } else {
        Value::Array(Vec::new())
    }
}
