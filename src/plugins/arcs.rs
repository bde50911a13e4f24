use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ArcConfig;
use crate::document::{NodeId, Property, DEFAULT_TRANSITION_MS};
use crate::error::MapError;
use crate::map::Datamap;
use crate::projection::fmt_num;
use crate::types::{datum_key, ArcDatum};

use super::keyed_children;

pub const ARC_CLASS: &str = "datamaps-arc";
const DRAW_DELAY_MS: u64 = 100;
const BEND: f64 = 90.0;
const LENGTH_SAMPLES: usize = 64;

/// Curve from `origin` to `destination` bowing toward the top of the
/// surface. Returns the path data and its length.
pub fn arc_path(origin: [f64; 2], destination: [f64; 2], sharpness: f64) -> (String, f64) {
    let control = control_point(origin, destination, sharpness);
    let d = format!(
        "M{},{}S{},{},{},{}",
        fmt_num(origin[0]),
        fmt_num(origin[1]),
        fmt_num(control[0]),
        fmt_num(control[1]),
        fmt_num(destination[0]),
        fmt_num(destination[1]),
    );
    (d, curve_length(origin, control, destination))
}

fn control_point(o: [f64; 2], d: [f64; 2], sharpness: f64) -> [f64; 2] {
    let mid = [(o[0] + d[0]) / 2.0, (o[1] + d[1]) / 2.0];
    let (dx, dy) = (d[0] - o[0], d[1] - o[1]);
    let chord = dx.hypot(dy);
    let (mut nx, mut ny) = if chord > 0.0 { (dy / chord, -dx / chord) } else { (0.0, -1.0) };
    if ny > 0.0 || (ny == 0.0 && nx < 0.0) {
        nx = -nx;
        ny = -ny;
    }
    let offset = BEND * sharpness;
    [mid[0] + nx * offset, mid[1] + ny * offset]
}

/// With no preceding curve, `S c d` is the cubic with control points
/// `o, c` ending at `d`.
fn curve_length(o: [f64; 2], c: [f64; 2], d: [f64; 2]) -> f64 {
    let at = |t: f64| {
        let u = 1.0 - t;
        let (a, b, k, e) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        [
            (a + b) * o[0] + k * c[0] + e * d[0],
            (a + b) * o[1] + k * c[1] + e * d[1],
        ]
    };
    let mut length = 0.0;
    let mut previous = o;
    for step in 1..=LENGTH_SAMPLES {
        let point = at(step as f64 / LENGTH_SAMPLES as f64);
        length += (point[0] - previous[0]).hypot(point[1] - previous[1]);
        previous = point;
    }
    length
}

pub(super) fn render(map: &mut Datamap, layer: NodeId, data: &Value, options: &Value) -> Result<(), MapError> {
    let items = data.as_array().ok_or(MapError::NotAnArray("arcs"))?;
    let config: ArcConfig =
        serde_json::from_value(options.clone()).map_err(|e| MapError::Config(e.to_string()))?;

    let mut arcs = Vec::with_capacity(items.len());
    for item in items {
        let arc: ArcDatum = serde_json::from_value(item.clone()).map_err(|e| MapError::InvalidDatum {
            plugin: "arc",
            reason: e.to_string(),
        })?;
        arcs.push((datum_key(item), arc));
    }

    let existing = keyed_children(map, layer, ARC_CLASS);
    let drawn: HashSet<&str> = existing.iter().map(|(key, _)| key.as_str()).collect();
    let wanted: HashSet<&str> = arcs.iter().map(|(key, _)| key.as_str()).collect();

    for (key, arc) in &arcs {
        if drawn.contains(key.as_str()) {
            continue;
        }
        let from = map.lat_lng_to_xy(arc.origin.latitude, arc.origin.longitude);
        let to = map.lat_lng_to_xy(arc.destination.latitude, arc.destination.longitude);
        let (Some(from), Some(to)) = (from, to) else {
            warn!("Arc {} has an endpoint outside the visible map", key);
            continue;
        };
        let (d, length) = arc_path(from, to, config.arc_sharpness);

        let doc = &mut map.document;
        let path = doc.append(layer, "path");
        doc.add_class(path, ARC_CLASS);
        doc.set_attr(path, "data-key", key);
        doc.set_attr(path, "d", d);
        doc.set_style(path, "stroke-linecap", "round");
        doc.set_style(path, "stroke", arc.options.stroke_color.as_deref().unwrap_or(&config.stroke_color));
        doc.set_style(path, "fill", "none");
        doc.set_style(path, "stroke-width", arc.options.stroke_width.unwrap_or(config.stroke_width));
        doc.set_style(path, "stroke-dasharray", format!("{0} {0}", fmt_num(length)));
        doc.set_style(path, "stroke-dashoffset", fmt_num(length));
        doc.transition(path, Property::style("stroke-dashoffset"), 0, DRAW_DELAY_MS, config.animation_speed);
    }

    for (key, path) in &existing {
        if !wanted.contains(key.as_str()) {
            map.document.transition(*path, Property::style("opacity"), 0, 0, DEFAULT_TRANSITION_MS);
            map.document.exit(*path);
        }
    }

    debug!("Arcs: {} requested, {} previously drawn", arcs.len(), existing.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapOptions;
    use crate::document::Document;
    use serde_json::json;

    fn map() -> Datamap {
        Datamap::new(Document::new(720.0, 360.0), MapOptions::from_value(json!({})).unwrap()).unwrap()
    }

    #[test]
    fn control_point_bows_upward() {
        let c = control_point([0.0, 100.0], [200.0, 100.0], 1.0);
        assert_eq!(c, [100.0, 10.0]);
        let c = control_point([200.0, 100.0], [0.0, 100.0], 0.5);
        assert_eq!(c, [100.0, 55.0]);
        let c = control_point([0.0, 0.0], [0.0, 0.0], 1.0);
        assert_eq!(c, [0.0, -90.0]);
    }

    #[test]
    fn straight_arc_length_is_the_chord() {
        let (d, length) = arc_path([0.0, 0.0], [100.0, 0.0], 0.0);
        assert_eq!(d, "M0,0S50,0,100,0");
        assert!((length - 100.0).abs() < 1e-6);
        let (_, bent) = arc_path([0.0, 0.0], [100.0, 0.0], 1.0);
        assert!(bent > 100.0);
    }

    #[test]
    fn arcs_draw_in_with_a_dash_offset() {
        let mut map = map();
        let layer = map
            .arc(
                json!([
                    {"origin": {"latitude": 10, "longitude": -20}, "destination": {"latitude": 30, "longitude": 40}},
                    {"origin": {"latitude": 0, "longitude": 0}, "destination": {"latitude": 5, "longitude": 5},
                     "options": {"strokeColor": "#00f", "strokeWidth": 3}}
                ]),
                Some(json!({"animationSpeed": 900})),
            )
            .unwrap();
        let paths = map.document().select_all(layer, Some("path"), Some(ARC_CLASS));
        assert_eq!(paths.len(), 2);

        let doc = map.document();
        assert_eq!(doc.style(paths[0], "stroke"), Some("#DD1C77"));
        assert_eq!(doc.style(paths[0], "fill"), Some("none"));
        assert_eq!(doc.style(paths[0], "stroke-linecap"), Some("round"));
        assert_eq!(doc.style(paths[1], "stroke"), Some("#00f"));
        assert_eq!(doc.style(paths[1], "stroke-width"), Some("3"));

        let offset = doc.style(paths[0], "stroke-dashoffset").unwrap().to_string();
        assert_eq!(doc.style(paths[0], "stroke-dasharray"), Some(format!("{offset} {offset}").as_str()));
        let draw = &doc.pending_transitions(paths[0])[0];
        assert_eq!((draw.to.as_str(), draw.delay_ms, draw.duration_ms), ("0", 100, 900));

        map.document_mut().settle();
        assert_eq!(map.document().style(paths[0], "stroke-dashoffset"), Some("0"));
    }

    #[test]
    fn dropped_arcs_fade_out() {
        let mut map = map();
        let keep = json!({"origin": {"latitude": 0, "longitude": 0}, "destination": {"latitude": 5, "longitude": 5}});
        let drop = json!({"origin": {"latitude": 1, "longitude": 1}, "destination": {"latitude": 9, "longitude": 9}});
        let layer = map.arc(json!([keep.clone(), drop]), None).unwrap();
        map.arc(json!([keep]), None).unwrap();
        let paths = map.document().select_all(layer, Some("path"), Some(ARC_CLASS));
        assert!(!map.document().is_exiting(paths[0]));
        assert!(map.document().is_exiting(paths[1]));
        map.document_mut().settle();
        assert_eq!(map.document().select_all(layer, Some("path"), Some(ARC_CLASS)).len(), 1);
    }

    #[test]
    fn rejects_non_arrays() {
        let mut map = map();
        let err = map.arc(json!(null), None).unwrap_err();
        assert_eq!(err.to_string(), "Datamaps Error - arcs must be an array");
    }
}
