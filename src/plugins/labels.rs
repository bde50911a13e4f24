use serde_json::Value;

use crate::config::LabelsConfig;
use crate::document::NodeId;
use crate::error::MapError;
use crate::map::Datamap;

const LEFT_SHIFT: f64 = 15.0;

/// One text per drawn region, near its centroid. Settings passed as data
/// take precedence over the `labelsConfig` section.
pub(super) fn render(map: &mut Datamap, layer: NodeId, data: &Value, options: &Value) -> Result<(), MapError> {
    let mut settings = match data {
        Value::Object(_) => data.clone(),
        _ => Value::Object(Default::default()),
    };
    crate::config::merge_with(&mut settings, options)?;
    let config: LabelsConfig =
        serde_json::from_value(settings).map_err(|e| MapError::Config(e.to_string()))?;

    for old in map.document.children(layer).to_vec() {
        map.document.remove(old);
    }

    let placed: Vec<([f64; 2], String)> = map
        .regions
        .iter()
        .filter_map(|region| {
            let center = map.path.centroid(&region.geometry)?;
            Some((center, region.property_str("name_local").unwrap_or_default().to_string()))
        })
        .collect();

    for ([x, y], name) in placed {
        let doc = &mut map.document;
        let text = doc.append(layer, "text");
        doc.set_attr(text, "x", x - LEFT_SHIFT);
        doc.set_attr(text, "y", y);
        doc.set_style(text, "font-size", format!("{}px", config.font_size));
        doc.set_style(text, "font-family", &config.font_family);
        doc.set_style(text, "fill", &config.label_color);
        doc.set_text(text, name);
    }
    Ok(())
}
