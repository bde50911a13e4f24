use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::merge_with;
use crate::document::NodeId;
use crate::error::MapError;
use crate::map::Datamap;

/// Draws a plugin's data into its layer: `(map, layer, data, options)`.
pub type PluginFn = Arc<dyn Fn(&mut Datamap, NodeId, &Value, &Value) -> Result<(), MapError> + Send + Sync>;

struct PluginEntry {
    render: PluginFn,
    layer: Option<NodeId>,
    options: Option<Value>,
}

/// Named drawing capabilities of one map, with the layer and options each
/// one last created.
#[derive(Default)]
pub struct PluginRegistry {
    entries: HashMap<String, PluginEntry>,
}

impl PluginRegistry {
    /// Returns false, leaving the existing entry alone, if `name` is taken.
    pub fn register(&mut self, name: &str, render: PluginFn) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(
            name.to_string(),
            PluginEntry { render, layer: None, options: None },
        );
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn layer(&self, name: &str) -> Option<NodeId> {
        self.entries.get(name).and_then(|entry| entry.layer)
    }

    pub fn stored_options(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(|entry| entry.options.as_ref())
    }
}

impl Datamap {
    pub fn add_plugin<F>(&mut self, name: &str, render: F) -> bool
    where
        F: Fn(&mut Datamap, NodeId, &Value, &Value) -> Result<(), MapError> + Send + Sync + 'static,
    {
        self.plugins.register(name, Arc::new(render))
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Run a registered plugin. Returns the layer it drew into.
    pub fn plugin(
        &mut self,
        name: &str,
        data: Value,
        options: Option<Value>,
        create_new_layer: bool,
    ) -> Result<NodeId, MapError> {
        self.plugin_with_callback(name, data, options, create_new_layer, |_, _| {})
    }

    /// Like [`Datamap::plugin`], then hands the layer to `callback`.
    pub fn plugin_with_callback<F>(
        &mut self,
        name: &str,
        data: Value,
        options: Option<Value>,
        create_new_layer: bool,
        callback: F,
    ) -> Result<NodeId, MapError>
    where
        F: FnOnce(&mut Datamap, NodeId),
    {
        let entry = self
            .plugins
            .entries
            .get(name)
            .ok_or_else(|| MapError::UnknownPlugin(name.to_string()))?;
        let render = entry.render.clone();
        let existing = entry.layer;
        let stored = entry.options.clone();

        let explicit = options.is_some();
        let mut resolved = options.unwrap_or_else(|| Value::Object(Map::new()));
        merge_with(&mut resolved, &self.options.plugin_defaults(name))?;

        let layer = match existing {
            Some(layer) if !create_new_layer => {
                if !explicit {
                    if let Some(stored) = stored {
                        resolved = stored;
                    }
                }
                layer
            }
            _ => {
                let layer = self.add_layer(name, None, false);
                if let Some(entry) = self.plugins.entries.get_mut(name) {
                    entry.layer = Some(layer);
                    entry.options = Some(resolved.clone());
                }
                debug!("Created layer for plugin '{}'", name);
                layer
            }
        };

        render(self, layer, &data, &resolved)?;
        callback(self, layer);
        Ok(layer)
    }

    pub fn bubbles(&mut self, data: Value, options: Option<Value>) -> Result<NodeId, MapError> {
        self.plugin("bubbles", data, options, false)
    }

    pub fn arc(&mut self, data: Value, options: Option<Value>) -> Result<NodeId, MapError> {
        self.plugin("arc", data, options, false)
    }

    pub fn labels(&mut self, options: Option<Value>) -> Result<NodeId, MapError> {
        self.plugin("labels", options.unwrap_or(Value::Null), None, false)
    }

    pub fn legend(&mut self, data: Value) -> Result<NodeId, MapError> {
        self.plugin("legend", data, None, false)
    }

    pub fn graticule(&mut self) -> Result<NodeId, MapError> {
        self.plugin("graticule", Value::Null, None, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapOptions;
    use crate::document::Document;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn map() -> Datamap {
        Datamap::new(Document::new(400.0, 300.0), MapOptions::from_value(json!({})).unwrap()).unwrap()
    }

    fn mark(map: &mut Datamap, layer: NodeId, data: &Value, options: &Value) -> Result<(), MapError> {
        let node = map.document_mut().append(layer, "text");
        map.document_mut().set_text(node, format!("{}|{}", data, options["tone"]));
        Ok(())
    }

    #[test]
    fn second_registration_is_a_no_op() {
        let mut map = map();
        assert!(map.add_plugin("stamp", mark));
        assert!(!map.add_plugin("stamp", |_, _, _, _| Err(MapError::Config("replaced".into()))));
        assert!(map.plugin("stamp", json!(1), None, false).is_ok());

        assert!(!map.add_plugin("bubbles", mark));
        assert!(matches!(
            map.bubbles(json!("nope"), None),
            Err(MapError::NotAnArray("bubbles"))
        ));
    }

    #[test]
    fn layer_is_reused_unless_a_new_one_is_requested() {
        let mut map = map();
        map.add_plugin("stamp", mark);
        let first = map.plugin("stamp", json!(1), None, false).unwrap();
        let again = map.plugin("stamp", json!(2), None, false).unwrap();
        assert_eq!(first, again);
        assert_eq!(map.document().select_all(map.svg(), Some("g"), Some("stamp")).len(), 1);

        let fresh = map.plugin("stamp", json!(3), None, true).unwrap();
        assert_ne!(first, fresh);
        assert_eq!(map.document().select_all(map.svg(), Some("g"), Some("stamp")).len(), 2);
        assert_eq!(map.plugins().layer("stamp"), Some(fresh));
    }

    #[test]
    fn stored_options_are_reused_when_none_are_passed() {
        let mut map = map();
        map.add_plugin("stamp", mark);
        let layer = map.plugin("stamp", json!(1), Some(json!({"tone": "loud"})), false).unwrap();
        map.plugin("stamp", json!(2), None, false).unwrap();
        map.plugin("stamp", json!(3), Some(json!({"tone": "soft"})), false).unwrap();

        let doc = map.document();
        let texts: Vec<&str> = doc.children(layer).iter().filter_map(|n| doc.text(*n)).collect();
        assert_eq!(texts, vec!["1|\"loud\"", "2|\"loud\"", "3|\"soft\""]);
    }

    #[test]
    fn options_are_filled_from_the_plugin_section() {
        let mut map = map();
        map.add_plugin("arcinspect", |_, _, _, options| {
            assert_eq!(options["strokeColor"], "#DD1C77");
            assert_eq!(options["arcSharpness"], 3);
            Ok(())
        });
        // "arc" defaults come from arcConfig; a custom name has none.
        let defaults = map.options().plugin_defaults("arc");
        assert_eq!(defaults["animationSpeed"], 600);
        let mut options = json!({"arcSharpness": 3});
        merge_with(&mut options, &defaults).unwrap();
        map.plugin("arcinspect", json!([]), Some(options), false).unwrap();
    }

    #[test]
    fn callback_receives_the_layer() {
        let mut map = map();
        map.add_plugin("stamp", mark);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let layer = map
            .plugin_with_callback("stamp", json!(1), None, false, move |map, layer| {
                counter.store(map.document().children(layer).len(), Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(map.document().has_class(layer, "stamp"));
    }

    #[test]
    fn unknown_plugin_is_an_error() {
        let mut map = map();
        assert!(matches!(
            map.plugin("sparkles", json!([]), None, false),
            Err(MapError::UnknownPlugin(_))
        ));
    }
}
