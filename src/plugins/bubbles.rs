use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BubblesConfig;
use crate::document::{NodeId, Property, DEFAULT_TRANSITION_MS};
use crate::error::MapError;
use crate::interaction::Interaction;
use crate::map::Datamap;
use crate::types::{datum_key, BubbleDatum};

use super::keyed_children;

pub const BUBBLE_CLASS: &str = "datamaps-bubble";
const GROW_MS: u64 = 400;

pub(super) fn render(map: &mut Datamap, layer: NodeId, data: &Value, options: &Value) -> Result<(), MapError> {
    let items = data.as_array().ok_or(MapError::NotAnArray("bubbles"))?;
    let config: BubblesConfig =
        serde_json::from_value(options.clone()).map_err(|e| MapError::Config(e.to_string()))?;

    let mut bubbles = Vec::with_capacity(items.len());
    for item in items {
        let bubble: BubbleDatum = serde_json::from_value(item.clone()).map_err(|e| MapError::InvalidDatum {
            plugin: "bubbles",
            reason: e.to_string(),
        })?;
        bubbles.push((datum_key(item), item, bubble));
    }

    let existing = keyed_children(map, layer, BUBBLE_CLASS);
    let drawn: HashSet<&str> = existing.iter().map(|(key, _)| key.as_str()).collect();
    let wanted: HashSet<&str> = bubbles.iter().map(|(key, _, _)| key.as_str()).collect();

    let mut entered = 0;
    for (key, raw, bubble) in &bubbles {
        if drawn.contains(key.as_str()) {
            continue;
        }
        let center = match (bubble.coordinates(), bubble.centered.as_deref()) {
            (Some(at), _) => map.lat_lng_to_xy(at.latitude, at.longitude),
            (None, Some(region)) => map.region_centroid(region),
            (None, None) => None,
        };
        if center.is_none() {
            warn!("Bubble {} has no position on this map", key);
        }

        let fill = bubble
            .fill_key
            .as_deref()
            .and_then(|k| map.options.fills.get(k))
            .unwrap_or_else(|| map.options.fills.default_fill())
            .to_string();

        let doc = &mut map.document;
        let circle = doc.append(layer, "circle");
        doc.add_class(circle, BUBBLE_CLASS);
        doc.set_attr(circle, "data-key", key);
        if let Some([cx, cy]) = center {
            doc.set_attr(circle, "cx", cx);
            doc.set_attr(circle, "cy", cy);
        }
        doc.set_attr(circle, "data-info", raw.to_string());
        doc.set_style(circle, "stroke", bubble.border_color.as_deref().unwrap_or(&config.border_color));
        doc.set_style(circle, "stroke-width", bubble.border_width.unwrap_or(config.border_width));
        doc.set_style(circle, "fill-opacity", bubble.fill_opacity.unwrap_or(config.fill_opacity));
        doc.set_style(circle, "fill", fill);
        if config.animate {
            doc.set_attr(circle, "r", 0);
            doc.transition(circle, Property::attr("r"), bubble.radius, 0, GROW_MS);
        } else {
            doc.set_attr(circle, "r", bubble.radius);
        }

        map.interactions.insert(
            circle,
            Interaction::Bubble {
                datum: (*raw).clone(),
                hover: config.hover_style(),
                center,
                radius: bubble.radius,
            },
        );
        entered += 1;
    }

    let mut exited = 0;
    for (key, circle) in &existing {
        if wanted.contains(key.as_str()) {
            continue;
        }
        map.document
            .transition(*circle, Property::attr("r"), 0, config.exit_delay, DEFAULT_TRANSITION_MS);
        map.document.exit(*circle);
        if map.hovered == Some(*circle) {
            map.pointer_leave(*circle);
        }
        map.interactions.remove(circle);
        exited += 1;
    }

    debug!("Bubbles: {} entered, {} exiting", entered, exited);
    map.rebuild_hit_index();
    Ok(())
}
