use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::MapOptions;
use crate::data;
use crate::document::{Document, NodeId, Size};
use crate::error::MapError;
use crate::interaction::{HitIndex, Interaction};
use crate::plugin::PluginRegistry;
use crate::plugins;
use crate::projection::{set_projection, GeoPath, Projection};
use crate::types::Region;

pub const STYLE_MARKER: &str = "datamaps-style-block";

pub const DEFAULT_STYLES: &str = ".datamap path.datamaps-graticule { fill: none; stroke: #777; stroke-width: 0.5px; stroke-opacity: .5; pointer-events: none; } \
.datamap .labels { pointer-events: none; } \
.datamap path { stroke: #FFFFFF; stroke-width: 1px; } \
.datamaps-legend dt, .datamaps-legend dd { float: left; margin: 0 3px 0 0; } \
.datamaps-legend dd { width: 20px; margin-right: 6px; border-radius: 3px; } \
.datamaps-legend { padding-bottom: 20px; z-index: 1001; position: absolute; left: 4px; font-size: 12px; font-family: \"Helvetica Neue\", Helvetica, Arial, sans-serif; } \
.datamaps-hoverover { display: none; font-family: \"Helvetica Neue\", Helvetica, Arial, sans-serif; } \
.hoverinfo { padding: 4px; border-radius: 1px; background-color: #FFF; box-shadow: 1px 1px 5px #CCC; font-size: 12px; border: 1px solid #CCC; } \
.hoverinfo hr { border: 1px dotted #CCC; }";

/// A map mounted in a host document.
pub struct Datamap {
    pub(crate) options: MapOptions,
    pub(crate) document: Document,
    pub(crate) svg: NodeId,
    pub(crate) size: Size,
    pub(crate) projection: Projection,
    pub(crate) path: GeoPath,
    pub(crate) regions: Vec<Region>,
    pub(crate) plugins: PluginRegistry,
    pub(crate) interactions: HashMap<NodeId, Interaction>,
    pub(crate) hit_index: HitIndex,
    pub(crate) hovered: Option<NodeId>,
    pub(crate) tracking: Option<NodeId>,
    pub(crate) popup: Option<NodeId>,
    done_fired: bool,
}

impl Datamap {
    /// Mount the drawing surface, register the built-in plugins and select
    /// the projection. Nothing is drawn until [`Datamap::draw`].
    pub fn new(mut document: Document, options: MapOptions) -> Result<Self, MapError> {
        let host = document.host();
        let measured = document.host_size();
        let size = Size {
            width: options.width.filter(|w| *w > 0.0).unwrap_or(measured.width),
            height: options.height.filter(|h| *h > 0.0).unwrap_or(measured.height),
        };

        let svg = match document.child_by_tag(host, "svg") {
            Some(svg) => svg,
            None => {
                let svg = document.append(host, "svg");
                document.set_attr(svg, "width", size.width);
                document.set_attr(svg, "height", size.height);
                document.add_class(svg, "datamap");
                document.set_style(svg, "overflow", "hidden");
                svg
            }
        };

        if !options.disable_default_styles {
            document.inject_style_once(STYLE_MARKER, DEFAULT_STYLES);
        }

        let selected = match &options.set_projection {
            Some(strategy) => strategy.apply(&mut document, svg, &options, size)?,
            None => set_projection(&mut document, svg, &options, size)?,
        };
        debug!("Selected {:?} projection for scope '{}'", selected.projection.kind(), options.scope);

        let mut map = Datamap {
            options,
            document,
            svg,
            size,
            projection: selected.projection,
            path: selected.path,
            regions: Vec::new(),
            plugins: PluginRegistry::default(),
            interactions: HashMap::new(),
            hit_index: HitIndex::default(),
            hovered: None,
            tracking: None,
            popup: None,
            done_fired: false,
        };
        plugins::register_builtins(&mut map);
        Ok(map)
    }

    /// Load the boundary data, draw it, fire `done`, then apply remote
    /// choropleth data if `dataUrl` is configured.
    pub async fn draw(&mut self) -> Result<(), MapError> {
        let regions = data::load_regions(&self.options).await?;
        self.draw_regions(regions);
        self.fire_done();

        if let Some(url) = self.options.data_url.clone().filter(|u| !u.is_empty()) {
            let remote = data::load_remote_data(&url, self.options.data_type).await?;
            info!("Applying {} remote data entries from {}", remote.len(), url);
            self.update_choropleth(&remote);
        }
        Ok(())
    }

    /// Draw already-decoded regions and wire their hover behavior.
    pub fn draw_regions(&mut self, regions: Vec<Region>) {
        self.draw_subunits(regions);
        self.rebuild_hit_index();
    }

    fn fire_done(&mut self) {
        if self.done_fired {
            return;
        }
        self.done_fired = true;
        if let Some(done) = self.options.done.clone() {
            done.call(self);
        }
    }

    /// Add a `<g>` layer to the surface. `first` places it below every
    /// existing layer.
    pub fn add_layer(&mut self, class: &str, id: Option<&str>, first: bool) -> NodeId {
        let before = if first {
            self.document
                .children(self.svg)
                .iter()
                .copied()
                .find(|c| self.document.tag(*c) == "g")
        } else {
            None
        };
        let layer = self.document.insert_before(self.svg, "g", before);
        if !class.is_empty() {
            self.document.add_class(layer, class);
        }
        if let Some(id) = id {
            self.document.set_attr(layer, "id", id);
        }
        layer
    }

    pub fn lat_lng_to_xy(&self, latitude: f64, longitude: f64) -> Option<[f64; 2]> {
        self.projection.project([longitude, latitude])
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Centroid of a drawn region's path.
    pub fn region_centroid(&self, id: &str) -> Option<[f64; 2]> {
        self.region(id).and_then(|r| self.path.centroid(&r.geometry))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn stored_data(&self, id: &str) -> Option<Value> {
        self.options
            .data
            .get(id)
            .and_then(|datum| serde_json::to_value(datum).ok())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn svg(&self) -> NodeId {
        self.svg
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn path(&self) -> &GeoPath {
        &self.path
    }

    pub fn to_html(&self) -> String {
        self.document.to_html()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> MapOptions {
        MapOptions::from_value(value).unwrap()
    }

    #[test]
    fn surface_takes_explicit_size_over_host_size() {
        let map = Datamap::new(Document::new(300.0, 200.0), options(json!({"width": 640, "height": 480}))).unwrap();
        let doc = map.document();
        assert_eq!(doc.attr(map.svg(), "width"), Some("640"));
        assert_eq!(doc.attr(map.svg(), "height"), Some("480"));
        assert!(doc.has_class(map.svg(), "datamap"));
    }

    #[test]
    fn zero_sized_host_is_tolerated() {
        let map = Datamap::new(Document::default(), options(json!({}))).unwrap();
        assert_eq!(map.size(), Size { width: 0.0, height: 0.0 });
        assert_eq!(map.document().attr(map.svg(), "width"), Some("0"));
    }

    #[test]
    fn existing_surface_and_style_block_are_reused() {
        let first = Datamap::new(Document::new(300.0, 200.0), options(json!({}))).unwrap();
        let doc = first.into_document();
        let second = Datamap::new(doc, options(json!({}))).unwrap();
        let doc = second.document();
        assert_eq!(doc.select_all(doc.host(), Some("svg"), None).len(), 1);
        assert_eq!(doc.children(doc.head()).len(), 1);
    }

    #[test]
    fn default_styles_can_be_disabled() {
        let map = Datamap::new(Document::default(), options(json!({"disableDefaultStyles": true}))).unwrap();
        assert!(map.document().children(map.document().head()).is_empty());
    }

    #[test]
    fn first_layers_go_below_later_ones() {
        let mut map = Datamap::new(Document::new(300.0, 200.0), options(json!({}))).unwrap();
        let top = map.add_layer("bubbles", None, false);
        let bottom = map.add_layer("datamaps-subunits", Some("regions"), true);
        assert_eq!(map.document().children(map.svg()), &[bottom, top]);
        assert_eq!(map.document().attr(bottom, "id"), Some("regions"));
    }

    #[test]
    fn custom_projection_strategy_is_used() {
        use crate::config::ProjectionKind;
        use crate::projection::{PathAndProjection, ProjectionStrategy};

        let strategy = ProjectionStrategy::new(|_, _, _, size| {
            let projection = Projection::new(ProjectionKind::Equirectangular)
                .scale(1.0)
                .translate([size.width, 0.0]);
            Ok(PathAndProjection { projection, path: GeoPath::new(projection) })
        });
        let map = Datamap::new(
            Document::new(100.0, 100.0),
            options(json!({})).with_projection_strategy(strategy),
        )
        .unwrap();
        assert_eq!(map.lat_lng_to_xy(0.0, 0.0), Some([100.0, 0.0]));
    }
}
