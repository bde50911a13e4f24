use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;
use std::fmt::Write;
use std::sync::Arc;

use geo::{Centroid, Coord, LineString, MultiLineString, MultiPolygon, Polygon};

use crate::config::{MapOptions, ProjectionKind};
use crate::document::{Document, NodeId, Size};
use crate::error::MapError;

// Beyond this latitude Mercator y diverges.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A configured map projection: rotation, optional clip circle, then the raw
/// projection scaled and translated onto the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    kind: ProjectionKind,
    scale: f64,
    translate: [f64; 2],
    center: [f64; 2],
    rotate: [f64; 3],
    clip_angle: Option<f64>,
}

impl Projection {
    pub fn new(kind: ProjectionKind) -> Self {
        Projection {
            kind,
            scale: 150.0,
            translate: [480.0, 250.0],
            center: [0.0, 0.0],
            rotate: [0.0, 0.0, 0.0],
            clip_angle: None,
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn translate(mut self, translate: [f64; 2]) -> Self {
        self.translate = translate;
        self
    }

    /// Geographic point (degrees) that lands on the translate point.
    pub fn center(mut self, center: [f64; 2]) -> Self {
        self.center = center;
        self
    }

    /// Rotation in degrees: `[lambda, phi]` or `[lambda, phi, gamma]`.
    pub fn rotate(mut self, rotation: &[f64]) -> Self {
        let mut rotate = [0.0; 3];
        for (slot, value) in rotate.iter_mut().zip(rotation) {
            *slot = *value;
        }
        self.rotate = rotate;
        self
    }

    pub fn clip_angle(mut self, degrees: f64) -> Self {
        self.clip_angle = Some(degrees);
        self
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    pub fn translation(&self) -> [f64; 2] {
        self.translate
    }

    pub fn clip(&self) -> Option<f64> {
        self.clip_angle
    }

    /// Project `[longitude, latitude]` to planar `[x, y]`. Returns `None` for
    /// points outside the clip circle.
    pub fn project(&self, point: [f64; 2]) -> Option<[f64; 2]> {
        let (lambda, phi) = self.rotation(point[0].to_radians(), point[1].to_radians());

        if let Some(angle) = self.clip_angle {
            if lambda.cos() * phi.cos() < angle.to_radians().cos() - 1e-9 {
                return None;
            }
        }

        let [x, y] = self.raw(lambda, phi);
        let [cx, cy] = self.raw(self.center[0].to_radians(), self.center[1].to_radians());
        let dx = self.translate[0] - cx * self.scale;
        let dy = self.translate[1] + cy * self.scale;
        Some([x * self.scale + dx, dy - y * self.scale])
    }

    fn raw(&self, lambda: f64, phi: f64) -> [f64; 2] {
        match self.kind {
            ProjectionKind::Equirectangular => [lambda, phi],
            ProjectionKind::Mercator => {
                let phi = phi.clamp(-MERCATOR_MAX_LAT.to_radians(), MERCATOR_MAX_LAT.to_radians());
                [lambda, (FRAC_PI_4 + phi / 2.0).tan().ln()]
            }
            ProjectionKind::Orthographic => [phi.cos() * lambda.sin(), phi.sin()],
        }
    }

    fn rotation(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let [d_lambda, d_phi, d_gamma] = self.rotate.map(|d| (d % 360.0).to_radians());
        let mut lambda = lambda + d_lambda;
        if lambda > PI {
            lambda -= 2.0 * PI;
        } else if lambda < -PI {
            lambda += 2.0 * PI;
        }
        if d_phi == 0.0 && d_gamma == 0.0 {
            return (lambda, phi);
        }

        let (sin_dphi, cos_dphi) = d_phi.sin_cos();
        let (sin_dgamma, cos_dgamma) = d_gamma.sin_cos();
        let cos_phi = phi.cos();
        let x = lambda.cos() * cos_phi;
        let y = lambda.sin() * cos_phi;
        let z = phi.sin();
        let k = z * cos_dphi + x * sin_dphi;
        (
            (y * cos_dgamma - k * sin_dgamma).atan2(x * cos_dphi - z * sin_dphi),
            (k * cos_dgamma + y * sin_dgamma).clamp(-1.0, 1.0).asin(),
        )
    }
}

/// Turns geographic geometry into SVG path data through a projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPath {
    projection: Projection,
}

impl GeoPath {
    pub fn new(projection: Projection) -> Self {
        GeoPath { projection }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Project every ring; clipped vertices are dropped and rings left with
    /// fewer than three vertices disappear.
    pub fn project_geometry(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let polygons = geometry
            .iter()
            .filter_map(|polygon| {
                let exterior = self.project_ring(polygon.exterior())?;
                let interiors = polygon
                    .interiors()
                    .iter()
                    .filter_map(|ring| self.project_ring(ring))
                    .collect();
                Some(Polygon::new(exterior, interiors))
            })
            .collect();
        MultiPolygon::new(polygons)
    }

    fn project_ring(&self, ring: &LineString<f64>) -> Option<LineString<f64>> {
        let coords: Vec<Coord<f64>> = ring
            .coords()
            .filter_map(|c| self.projection.project([c.x, c.y]))
            .map(|[x, y]| Coord { x, y })
            .collect();
        (coords.len() >= 3).then(|| LineString::new(coords))
    }

    pub fn d(&self, geometry: &MultiPolygon<f64>) -> String {
        planar_d(&self.project_geometry(geometry))
    }

    /// Open polylines, split wherever a vertex is clipped.
    pub fn line_d(&self, lines: &MultiLineString<f64>) -> String {
        let mut out = String::new();
        for line in lines {
            let mut pen_down = false;
            for c in line.coords() {
                match self.projection.project([c.x, c.y]) {
                    Some([x, y]) => {
                        out.push(if pen_down { 'L' } else { 'M' });
                        let _ = write!(out, "{},{}", fmt_num(x), fmt_num(y));
                        pen_down = true;
                    }
                    None => pen_down = false,
                }
            }
        }
        out
    }

    /// Planar centroid of the projected geometry.
    pub fn centroid(&self, geometry: &MultiPolygon<f64>) -> Option<[f64; 2]> {
        self.project_geometry(geometry)
            .centroid()
            .map(|point| [point.x(), point.y()])
    }

    /// Outline of the whole globe: the clip circle when clipped, otherwise
    /// the projected edge of the lon/lat rectangle.
    pub fn sphere_d(&self) -> String {
        let p = &self.projection;
        if let Some(angle) = p.clip_angle {
            let r = p.scale * angle.to_radians().sin();
            let [cx, cy] = p.translate;
            return format!(
                "M{},{}A{r},{r} 0 1,1 {},{}A{r},{r} 0 1,1 {},{}Z",
                fmt_num(cx),
                fmt_num(cy - r),
                fmt_num(cx),
                fmt_num(cy + r),
                fmt_num(cx),
                fmt_num(cy - r),
                r = fmt_num(r),
            );
        }
        let mut edge = Vec::new();
        let step = 2.5;
        let mut lat = -90.0;
        while lat <= 90.0 {
            edge.push(Coord { x: -180.0, y: lat });
            lat += step;
        }
        let mut lat = 90.0;
        while lat >= -90.0 {
            edge.push(Coord { x: 180.0, y: lat });
            lat -= step;
        }
        let outline = MultiPolygon::new(vec![Polygon::new(LineString::new(edge), vec![])]);
        self.d(&outline)
    }
}

/// SVG path data for already-projected polygons.
pub fn planar_d(geometry: &MultiPolygon<f64>) -> String {
    let mut out = String::new();
    for polygon in geometry {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for (i, c) in ring.coords().enumerate() {
                out.push(if i == 0 { 'M' } else { 'L' });
                let _ = write!(out, "{},{}", fmt_num(c.x), fmt_num(c.y));
            }
            out.push('Z');
        }
    }
    out
}

/// Number formatting for markup: three decimals, trailing zeros trimmed.
pub fn fmt_num(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    let text = format!("{rounded:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Latitude/longitude grid: meridians every 10 degrees reaching +-80 (every
/// 90 degrees reaching the poles) and parallels every 10 degrees up to +-80.
pub fn graticule() -> MultiLineString<f64> {
    let precision = 2.5;
    let mut lines = Vec::new();

    for lon in (-18..=18).map(|i| f64::from(i) * 10.0) {
        let extent = if lon % 90.0 == 0.0 { 90.0 } else { 80.0 };
        let mut coords = Vec::new();
        let mut lat = -extent;
        while lat <= extent + 1e-9 {
            coords.push(Coord { x: lon, y: lat });
            lat += precision;
        }
        lines.push(LineString::new(coords));
    }

    for lat in (-8..=8).map(|i| f64::from(i) * 10.0) {
        let mut coords = Vec::new();
        let mut lon = -180.0;
        while lon <= 180.0 + 1e-9 {
            coords.push(Coord { x: lon, y: lat });
            lon += precision;
        }
        lines.push(LineString::new(coords));
    }

    MultiLineString::new(lines)
}

#[derive(Debug, Clone, Copy)]
pub struct PathAndProjection {
    pub projection: Projection,
    pub path: GeoPath,
}

type ProjectionFn =
    dyn Fn(&mut Document, NodeId, &MapOptions, Size) -> Result<PathAndProjection, MapError> + Send + Sync;

/// Replaceable projection selection step.
#[derive(Clone)]
pub struct ProjectionStrategy(Arc<ProjectionFn>);

impl ProjectionStrategy {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Document, NodeId, &MapOptions, Size) -> Result<PathAndProjection, MapError>
            + Send
            + Sync
            + 'static,
    {
        ProjectionStrategy(Arc::new(f))
    }

    pub fn apply(
        &self,
        document: &mut Document,
        svg: NodeId,
        options: &MapOptions,
        size: Size,
    ) -> Result<PathAndProjection, MapError> {
        (self.0)(document, svg, options, size)
    }
}

impl fmt::Debug for ProjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProjectionStrategy(..)")
    }
}

/// Default projection policy keyed by scope and projection name.
pub fn set_projection(
    document: &mut Document,
    svg: NodeId,
    options: &MapOptions,
    size: Size,
) -> Result<PathAndProjection, MapError> {
    let Size { width, height } = size;

    let mut projection = if options.scope == "japan" {
        Projection::new(ProjectionKind::Mercator)
            .center([137.0, 36.0])
            .translate([width / 2.0, height / 2.0])
            .scale(width * 1.8)
    } else {
        let offset = if options.projection == ProjectionKind::Mercator { 1.45 } else { 1.8 };
        Projection::new(options.projection)
            .scale((width + 1.0) / 2.0 / PI)
            .translate([width / 2.0, height / offset])
    };

    if options.projection == ProjectionKind::Orthographic {
        projection = projection
            .scale(250.0)
            .clip_angle(90.0)
            .rotate(&options.projection_config.rotation);

        let path = GeoPath::new(projection);
        let defs = document.append(svg, "defs");
        let sphere = document.append(defs, "path");
        document.set_attr(sphere, "id", "sphere");
        document.set_attr(sphere, "d", path.sphere_d());
        for class in ["stroke", "fill"] {
            let used = document.append(svg, "use");
            document.add_class(used, class);
            document.set_attr(used, "xlink:href", "#sphere");
        }
    }

    Ok(PathAndProjection { projection, path: GeoPath::new(projection) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(diff < 1e-6, "expected {expected}, got {actual} (diff: {diff})");
    }

    fn select(options: serde_json::Value, width: f64, height: f64) -> (Document, PathAndProjection) {
        let options = MapOptions::from_value(options).unwrap();
        let mut doc = Document::new(width, height);
        let svg = doc.append(doc.host(), "svg");
        let selected = set_projection(&mut doc, svg, &options, Size { width, height }).unwrap();
        (doc, selected)
    }

    #[test]
    fn world_origin_lands_on_horizontal_midpoint() {
        let (_, selected) = select(json!({}), 800.0, 500.0);
        let [x, y] = selected.projection.project([0.0, 0.0]).unwrap();
        assert_close(x, 400.0);
        assert_close(y, 500.0 / 1.8);
        assert_close(selected.projection.scale_factor(), 801.0 / 2.0 / PI);
    }

    #[test]
    fn mercator_world_uses_larger_vertical_offset_divisor() {
        let (_, selected) = select(json!({"projection": "mercator"}), 800.0, 500.0);
        let [x, y] = selected.projection.project([0.0, 0.0]).unwrap();
        assert_close(x, 400.0);
        assert_close(y, 500.0 / 1.45);
    }

    #[test]
    fn japan_center_maps_to_surface_center() {
        let (_, selected) = select(json!({"scope": "japan"}), 600.0, 400.0);
        let [x, y] = selected.projection.project([137.0, 36.0]).unwrap();
        assert_close(x, 300.0);
        assert_close(y, 200.0);
        let [east, north] = selected.projection.project([140.0, 40.0]).unwrap();
        assert!(east > 300.0 && north < 200.0);
    }

    #[test]
    fn orthographic_rotates_clips_and_adds_sphere() {
        let (doc, selected) = select(json!({"projection": "orthographic"}), 800.0, 500.0);
        let [x, y] = selected.projection.project([-97.0, 0.0]).unwrap();
        assert_close(x, 400.0);
        assert_close(y, 500.0 / 1.8);
        assert!(selected.projection.project([83.0, 0.0]).is_none());
        assert_eq!(selected.projection.clip(), Some(90.0));

        let sphere = doc.select(doc.host(), Some("path"), None).unwrap();
        assert_eq!(doc.attr(sphere, "id"), Some("sphere"));
        assert!(doc.attr(sphere, "d").unwrap().contains('A'));
        assert_eq!(doc.select_all(doc.host(), Some("use"), None).len(), 2);
    }

    #[test]
    fn orthographic_over_japan_keeps_mercator() {
        let (doc, selected) =
            select(json!({"scope": "japan", "projection": "orthographic"}), 600.0, 400.0);
        let projection = selected.projection;
        assert_eq!(projection.kind(), ProjectionKind::Mercator);
        assert_close(projection.scale_factor(), 250.0);
        assert_eq!(projection.clip(), Some(90.0));
        assert_eq!(projection.translation(), [300.0, 200.0]);
        assert_eq!(doc.select_all(doc.host(), Some("use"), None).len(), 2);
    }

    #[test]
    fn path_data_and_centroid_of_a_square() {
        let path = GeoPath::new(
            Projection::new(ProjectionKind::Equirectangular)
                .scale(180.0 / PI)
                .translate([0.0, 0.0]),
        );
        let square = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![],
        )]);
        assert_eq!(path.d(&square), "M0,0L10,0L10,-10L0,-10L0,0Z");
        let [cx, cy] = path.centroid(&square).unwrap();
        assert_close(cx, 5.0);
        assert_close(cy, -5.0);
    }

    #[test]
    fn graticule_shape() {
        let grid = graticule();
        assert_eq!(grid.0.len(), 37 + 17);
        let prime = &grid.0[18];
        assert_eq!(prime.0.first().unwrap().y, -90.0);
        let ten_east = &grid.0[19];
        assert_eq!(ten_east.0.last().unwrap().y, 80.0);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(2.50), "2.5");
        assert_eq!(fmt_num(-0.0001), "0");
        assert_eq!(fmt_num(3.14159), "3.142");
    }
}
