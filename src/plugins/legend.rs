use serde_json::Value;

use crate::document::{xml_escape, NodeId};
use crate::error::MapError;
use crate::map::Datamap;

pub const LEGEND_CLASS: &str = "datamaps-legend";

/// Key of the fills, appended to the host element. `defaultFill` is listed
/// only when `defaultFillName` is given.
pub(super) fn render(map: &mut Datamap, _layer: NodeId, data: &Value, _options: &Value) -> Result<(), MapError> {
    let title = data.get("legendTitle").and_then(Value::as_str);
    let default_name = data.get("defaultFillName").and_then(Value::as_str);
    let labels = data.get("labels");

    let entries: Vec<(String, String)> = map
        .options
        .fills
        .iter()
        .filter_map(|(key, color)| {
            let label = if key == "defaultFill" {
                default_name?.to_string()
            } else {
                labels
                    .and_then(|l| l.get(key))
                    .and_then(Value::as_str)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{key}: "))
            };
            Some((label, color.to_string()))
        })
        .collect();

    let host = map.document.host();
    let doc = &mut map.document;
    for stale in doc.select_all(host, Some("div"), Some(LEGEND_CLASS)) {
        doc.remove(stale);
    }

    let legend = doc.append(host, "div");
    doc.add_class(legend, LEGEND_CLASS);
    if let Some(title) = title {
        let heading = doc.append(legend, "h2");
        doc.set_text(heading, title);
    }
    let list = doc.append(legend, "dl");
    for (label, color) in entries {
        let term = doc.append(list, "dt");
        doc.set_html(term, xml_escape(&label));
        let swatch = doc.append(list, "dd");
        doc.set_style(swatch, "background-color", color);
        doc.set_html(swatch, "&nbsp;");
    }
    Ok(())
}
