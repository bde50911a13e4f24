//! Drawing capabilities registered on every map.

mod arcs;
mod bubbles;
mod graticule;
mod labels;
mod legend;

use crate::document::NodeId;
use crate::map::Datamap;

pub use arcs::{arc_path, ARC_CLASS};
pub use bubbles::BUBBLE_CLASS;
pub use graticule::GRATICULE_CLASS;
pub use legend::LEGEND_CLASS;

pub(crate) fn register_builtins(map: &mut Datamap) {
    map.add_plugin("bubbles", bubbles::render);
    map.add_plugin("legend", legend::render);
    map.add_plugin("arc", arcs::render);
    map.add_plugin("labels", labels::render);
    map.add_plugin("graticule", graticule::render);
}

/// Keys of the live (not exiting) children of `layer` carrying `class`.
fn keyed_children(map: &Datamap, layer: NodeId, class: &str) -> Vec<(String, NodeId)> {
    let doc = &map.document;
    doc.children(layer)
        .iter()
        .copied()
        .filter(|node| doc.has_class(*node, class) && !doc.is_exiting(*node))
        .filter_map(|node| doc.attr(node, "data-key").map(|key| (key.to_string(), node)))
        .collect()
}
