//! Pointer-driven hover highlighting, the shared popup, and hit testing.

use std::collections::BTreeMap;

use geo::{Contains, MultiPolygon, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde_json::Value;

use crate::config::{HoverStyle, PopupSubject, PopupTemplate};
use crate::document::NodeId;
use crate::map::Datamap;

pub const POPUP_CLASS: &str = "datamaps-hoverover";
pub const PREVIOUS_ATTRIBUTES: &str = "data-previous-attributes";
const RESTORED_STYLES: [&str; 4] = ["fill", "stroke", "stroke-width", "fill-opacity"];

/// What a hoverable element stands for.
#[derive(Debug, Clone)]
pub enum Interaction {
    /// Index into the map's drawn regions.
    Region(usize),
    Bubble {
        datum: Value,
        hover: HoverStyle,
        center: Option<[f64; 2]>,
        radius: f64,
    },
}

#[derive(Debug, Clone)]
enum Shape {
    Area(MultiPolygon<f64>),
    Circle { center: [f64; 2], radius: f64 },
}

#[derive(Debug, Clone)]
pub struct HitTarget {
    node: NodeId,
    on_top: bool,
    aabb: AABB<[f64; 2]>,
    shape: Shape,
}

impl RTreeObject for HitTarget {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

impl HitTarget {
    fn contains(&self, x: f64, y: f64) -> bool {
        match &self.shape {
            Shape::Area(area) => area.contains(&Point::new(x, y)),
            Shape::Circle { center, radius } => {
                (x - center[0]).hypot(y - center[1]) <= *radius
            }
        }
    }
}

pub struct HitIndex {
    tree: RTree<HitTarget>,
}

impl Default for HitIndex {
    fn default() -> Self {
        HitIndex { tree: RTree::new() }
    }
}

impl Datamap {
    /// Rebuild the spatial index of hoverable elements.
    pub(crate) fn rebuild_hit_index(&mut self) {
        use geo::bounding_rect::BoundingRect;

        let items: Vec<HitTarget> = self
            .interactions
            .iter()
            .filter(|(node, _)| self.document.is_attached(**node) && !self.document.is_exiting(**node))
            .filter_map(|(node, interaction)| match interaction {
                Interaction::Region(index) => {
                    let area = self.path.project_geometry(&self.regions[*index].geometry);
                    let rect = area.bounding_rect()?;
                    Some(HitTarget {
                        node: *node,
                        on_top: false,
                        aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                        shape: Shape::Area(area),
                    })
                }
                Interaction::Bubble { center, radius, .. } => {
                    let [cx, cy] = (*center)?;
                    Some(HitTarget {
                        node: *node,
                        on_top: true,
                        aabb: AABB::from_corners([cx - radius, cy - radius], [cx + radius, cy + radius]),
                        shape: Shape::Circle { center: [cx, cy], radius: *radius },
                    })
                }
            })
            .collect();

        self.hit_index = HitIndex { tree: RTree::bulk_load(items) };
    }

    /// Topmost hoverable element under a surface point. Bubbles sit above
    /// regions.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<NodeId> {
        let envelope = AABB::from_point([x, y]);
        self.hit_index
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|candidate| candidate.contains(x, y))
            .max_by_key(|candidate| (candidate.on_top, candidate.node))
            .map(|candidate| candidate.node)
    }

    /// Feed a raw pointer position: leaves the previous element, enters the
    /// one under the pointer and moves the popup.
    pub fn pointer_at(&mut self, x: f64, y: f64) -> Option<NodeId> {
        let target = self.hit_test(x, y);
        if target != self.hovered {
            if let Some(previous) = self.hovered {
                self.pointer_leave(previous);
            }
            if let Some(next) = target {
                self.pointer_enter(next);
            }
        }
        self.pointer_move(x, y);
        target
    }

    pub fn pointer_enter(&mut self, node: NodeId) {
        let Some(hover) = self.hover_style(node) else {
            return;
        };
        if self.hovered == Some(node) {
            return;
        }
        if let Some(previous) = self.hovered {
            self.pointer_leave(previous);
        }
        if !hover.highlight_on_hover && !hover.popup_on_hover {
            return;
        }
        self.hovered = Some(node);

        if hover.highlight_on_hover {
            let previous: BTreeMap<&str, String> = RESTORED_STYLES
                .iter()
                .map(|name| (*name, self.document.style(node, name).unwrap_or_default().to_string()))
                .collect();
            let previous = serde_json::to_string(&previous).unwrap_or_default();

            self.document.set_style(node, "fill", &hover.fill_color);
            self.document.set_style(node, "stroke", &hover.border_color);
            self.document.set_style(node, "stroke-width", hover.border_width);
            self.document.set_style(node, "fill-opacity", hover.fill_opacity);
            self.document.set_attr(node, PREVIOUS_ATTRIBUTES, previous);
            if hover.raise {
                self.document.raise(node);
            }
        }

        if hover.popup_on_hover {
            self.tracking = Some(node);
            let popup = self.popup();
            self.document.set_style(popup, "display", "block");
        }
    }

    /// Reposition and refill the popup for the tracked element.
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        let Some(node) = self.tracking else {
            return;
        };
        let data: Option<Value> = self
            .document
            .attr(node, "data-info")
            .and_then(|info| serde_json::from_str(info).ok());

        let html = match self.interactions.get(&node) {
            Some(Interaction::Region(index)) => {
                let template = self
                    .options
                    .geography_config
                    .popup_template
                    .clone()
                    .unwrap_or_else(PopupTemplate::region_default);
                template.render(&PopupSubject::Region(&self.regions[*index]), data.as_ref())
            }
            Some(Interaction::Bubble { datum, .. }) => {
                let template = self
                    .options
                    .bubbles_config
                    .popup_template
                    .clone()
                    .unwrap_or_else(PopupTemplate::bubble_default);
                template.render(&PopupSubject::Bubble(datum), data.as_ref())
            }
            None => return,
        };

        let popup = self.popup();
        self.document.set_style(popup, "top", format!("{}px", y + 30.0));
        self.document.set_style(popup, "left", format!("{}px", x));
        self.document.set_html(popup, html);
    }

    pub fn pointer_leave(&mut self, node: NodeId) {
        let Some(hover) = self.hover_style(node) else {
            return;
        };

        if hover.highlight_on_hover {
            let previous: Option<BTreeMap<String, String>> = self
                .document
                .attr(node, PREVIOUS_ATTRIBUTES)
                .and_then(|saved| serde_json::from_str(saved).ok());
            for (name, value) in previous.unwrap_or_default() {
                if value.is_empty() {
                    self.document.remove_style(node, &name);
                } else {
                    self.document.set_style(node, &name, value);
                }
            }
        }

        if self.tracking == Some(node) {
            self.tracking = None;
        }
        if self.hovered == Some(node) {
            self.hovered = None;
        }
        if let Some(popup) = self.popup {
            self.document.set_style(popup, "display", "none");
        }
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    pub fn popup_node(&self) -> Option<NodeId> {
        self.popup
    }

    /// Region id or bubble datum behind a hoverable element.
    pub fn describe(&self, node: NodeId) -> Option<(String, Option<Value>)> {
        let data = self
            .document
            .attr(node, "data-info")
            .and_then(|info| serde_json::from_str(info).ok());
        match self.interactions.get(&node)? {
            Interaction::Region(index) => Some((self.regions[*index].id.clone(), data)),
            Interaction::Bubble { datum, .. } => {
                let key = self.document.attr(node, "data-key").unwrap_or_default().to_string();
                Some((key, Some(datum.clone())))
            }
        }
    }

    fn hover_style(&self, node: NodeId) -> Option<HoverStyle> {
        match self.interactions.get(&node)? {
            Interaction::Region(_) => Some(self.options.geography_config.hover_style()),
            Interaction::Bubble { hover, .. } => Some(hover.clone()),
        }
    }

    /// The shared popup element, created on first use.
    fn popup(&mut self) -> NodeId {
        if let Some(popup) = self.popup {
            return popup;
        }
        let host = self.document.host();
        let popup = self.document.append(host, "div");
        self.document.add_class(popup, POPUP_CLASS);
        self.document.set_style(popup, "z-index", 10001);
        self.document.set_style(popup, "position", "absolute");
        self.popup = Some(popup);
        popup
    }
}
