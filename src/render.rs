use std::collections::HashSet;

use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::debug;

use crate::document::{Property, DEFAULT_TRANSITION_MS};
use crate::interaction::Interaction;
use crate::map::Datamap;
use crate::types::{Region, RegionDatum};

pub const SUBUNITS_LAYER: &str = "datamaps-subunits";
pub const SUBUNIT_CLASS: &str = "datamaps-subunit";

impl Datamap {
    /// Draw one path per region that is not on the map yet. Regions already
    /// drawn are left untouched.
    pub(crate) fn draw_subunits(&mut self, regions: Vec<Region>) {
        let layer = match self.document.select(self.svg, Some("g"), Some(SUBUNITS_LAYER)) {
            Some(layer) => layer,
            None => self.add_layer(SUBUNITS_LAYER, None, true),
        };

        let drawn: HashSet<&str> = self.regions.iter().map(|r| r.id.as_str()).collect();
        let entering: Vec<Region> = regions
            .into_iter()
            .filter(|r| !drawn.contains(r.id.as_str()))
            .collect();

        let path = self.path;
        let outlines: Vec<String> = entering.par_iter().map(|r| path.d(&r.geometry)).collect();

        let geo = &self.options.geography_config;
        let (border_width, border_color) = (geo.border_width, geo.border_color.clone());

        for (region, d) in entering.into_iter().zip(outlines) {
            let datum = self.options.data.get(&region.id);
            let fill = self.options.fills.for_fill_key(datum);
            let info = datum.map(RegionDatum::to_json);

            let node = self.document.append(layer, "path");
            self.document.set_attr(node, "d", d);
            self.document.add_class(node, &format!("{} {}", SUBUNIT_CLASS, region.id));
            if let Some(info) = info {
                self.document.set_attr(node, "data-info", info);
            }
            self.document.set_style(node, "fill", fill);
            self.document.set_style(node, "stroke-width", border_width);
            self.document.set_style(node, "stroke", &border_color);

            self.interactions.insert(node, Interaction::Region(self.regions.len()));
            self.regions.push(region);
        }
        debug!("{} regions on the map", self.regions.len());
    }

    /// Recolor regions from new per-region data. Object values are merged
    /// into the stored entry; keys not mentioned keep their current color.
    pub fn update_choropleth(&mut self, data: &Map<String, Value>) {
        for (id, value) in data {
            if id.is_empty() || value.is_null() {
                continue;
            }
            let Ok(incoming) = serde_json::from_value::<RegionDatum>(value.clone()) else {
                debug!("Ignoring unusable data for {}", id);
                continue;
            };

            let elements = self.document.select_all(self.svg, None, Some(id));
            let color = self.options.fills.resolve(Some(&incoming));
            if let RegionDatum::Descriptor(_) = incoming {
                let stored = self
                    .options
                    .data
                    .entry(id.clone())
                    .or_insert_with(|| RegionDatum::Descriptor(Map::new()));
                stored.absorb(incoming);
                let info = stored.to_json();
                for node in &elements {
                    self.document.set_attr(*node, "data-info", &info);
                }
            }

            for node in elements {
                self.document
                    .transition(node, Property::style("fill"), &color, 0, DEFAULT_TRANSITION_MS);
            }
        }
    }
}
