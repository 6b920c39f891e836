//! Template merging and the process-wide render lock, grounded in
//! `ci.util.merge_dicts` and `makoutil.template_lock`.
//!
//! The lock guards only the `Handlebars::render` call, not the surrounding
//! merge/context-building work — that is what "the template engine has
//! non-reentrant global state" actually requires, and is a deliberate
//! correction of the original's broader (and, per its own comment, probably
//! accidental) lock scope. See DESIGN.md.

use std::sync::Mutex;

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::TemplateError;

static TEMPLATE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Deep-merges `override_value` onto `base`: object keys merge recursively,
/// any other type (including arrays) in `override_value` replaces the
/// corresponding value in `base` outright. Mirrors `ci.util.merge_dicts`.
pub fn merge_dicts(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, override_val) in override_map {
                let merged_val = match merged.get(key) {
                    Some(base_val) => merge_dicts(base_val, override_val),
                    None => override_val.clone(),
                };
                merged.insert(key.clone(), merged_val);
            }
            Value::Object(merged)
        }
        (_, override_value) => override_value.clone(),
    }
}

/// Folds `base` and every entry of `overrides` (in order, later wins) into a
/// single merged definition tree.
pub fn merge_all(base: &Value, overrides: &[Value]) -> Value {
    overrides
        .iter()
        .fold(base.clone(), |acc, override_value| merge_dicts(&acc, override_value))
}

/// Registry of named templates plus their shared include-directory partials,
/// loaded once at startup (`load include-directory for template imports`).
pub struct TemplateRegistry {
    handlebars: Handlebars<'static>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        Self { handlebars }
    }

    /// Registers a named top-level template.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| TemplateError::Compile(Box::new(e)))
    }

    /// Registers every `*.hbs` file under `dir` as a partial, keyed by file
    /// stem, matching "load include-directory for template imports".
    pub fn register_include_dir(&mut self, dir: &std::path::Path) -> Result<(), TemplateError> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir).map_err(TemplateError::Io)? {
            let entry = entry.map_err(TemplateError::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path).map_err(TemplateError::Io)?;
            self.handlebars
                .register_partial(stem, source)
                .map_err(|e| TemplateError::Compile(Box::new(e)))?;
        }
        Ok(())
    }

    /// Renders `template_name` against `context`, holding the process-wide
    /// [`TEMPLATE_LOCK`] only for the duration of the render call.
    pub fn render(&self, template_name: &str, context: &Value) -> Result<String, TemplateError> {
        let _guard = TEMPLATE_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.handlebars
            .render(template_name, context)
            .map_err(|e| TemplateError::Render(Box::new(e)))
    }

    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.get_template(name).is_some()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_dicts_overrides_scalar_and_recurses_into_objects() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let over = json!({"a": 2, "nested": {"y": 3, "z": 4}});
        let merged = merge_dicts(&base, &over);
        assert_eq!(merged, json!({"a": 2, "nested": {"x": 1, "y": 3, "z": 4}}));
    }

    #[test]
    fn merge_dicts_array_replaces_rather_than_concatenates() {
        let base = json!({"items": [1, 2, 3]});
        let over = json!({"items": [9]});
        let merged = merge_dicts(&base, &over);
        assert_eq!(merged, json!({"items": [9]}));
    }

    #[test]
    fn merge_all_applies_overrides_in_order() {
        let base = json!({"a": 1});
        let overrides = vec![json!({"a": 2}), json!({"a": 3, "b": 1})];
        let merged = merge_all(&base, &overrides);
        assert_eq!(merged, json!({"a": 3, "b": 1}));
    }

    #[test]
    #[serial_test::serial]
    fn render_holds_lock_only_around_the_render_call() {
        let mut registry = TemplateRegistry::new();
        registry.register_template("greet", "hello {{name}}").unwrap();
        let out = registry.render("greet", &json!({"name": "world"})).unwrap();
        assert_eq!(out, "hello world");
    }
}
