use serde_json::Value;

use crate::document::NodeId;
use crate::error::MapError;
use crate::map::Datamap;
use crate::projection::graticule;
use crate::render::SUBUNITS_LAYER;

pub const GRATICULE_CLASS: &str = "datamaps-graticule";

/// Grid lines drawn beneath the regions. Calling again redraws the same path.
pub(super) fn render(map: &mut Datamap, _layer: NodeId, _data: &Value, _options: &Value) -> Result<(), MapError> {
    let d = map.path.line_d(&graticule());
    let svg = map.svg;
    let doc = &mut map.document;

    let path = match doc.select(svg, Some("path"), Some(GRATICULE_CLASS)) {
        Some(path) => path,
        None => {
            let below = doc
                .children(svg)
                .iter()
                .copied()
                .find(|node| doc.has_class(*node, SUBUNITS_LAYER));
            let path = doc.insert_before(svg, "path", below);
            doc.add_class(path, GRATICULE_CLASS);
            path
        }
    };
    doc.set_attr(path, "d", d);
    Ok(())
}
