use std::path::Path;

use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use serde_json::{Map, Value};
use shapefile::Reader;
use topojson::TopoJson;
use tracing::{debug, info};

use crate::config::{DataType, MapOptions};
use crate::error::MapError;
use crate::types::Region;

/// Feature id of Antarctica in the world topology.
pub const ANTARCTICA_ID: &str = "ATA";

const JAPAN_TOPOLOGY: &str = include_str!("../data/japan.topo.json");

/// Boundary data bundled with the library, keyed by scope.
pub fn embedded_topology(scope: &str) -> Option<&'static str> {
    match scope {
        "japan" => Some(JAPAN_TOPOLOGY),
        _ => None,
    }
}

/// Where the boundary data for a map comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologySource {
    Remote(String),
    Embedded(&'static str),
    Inline(Value),
}

impl TopologySource {
    pub fn for_options(options: &MapOptions) -> Result<Self, MapError> {
        let geo = &options.geography_config;
        if let Some(url) = geo.data_url.as_ref().filter(|u| !u.is_empty()) {
            return Ok(TopologySource::Remote(url.clone()));
        }
        if let Some(text) = embedded_topology(&options.scope) {
            return Ok(TopologySource::Embedded(text));
        }
        match &geo.data_json {
            Some(value) => Ok(TopologySource::Inline(value.clone())),
            None => Err(MapError::NoTopology(options.scope.clone())),
        }
    }
}

/// Resolve, decode and filter the regions to draw.
pub async fn load_regions(options: &MapOptions) -> Result<Vec<Region>, MapError> {
    let source = TopologySource::for_options(options)?;
    let id_property = options.geography_config.id_property.as_deref();
    let regions = match source {
        TopologySource::Remote(url) if is_shapefile(&url) => load_shapefile(Path::new(&url), id_property)?,
        TopologySource::Remote(url) => {
            let text = fetch_text(&url).await?;
            decode_regions(&text, &options.scope, id_property)?
        }
        TopologySource::Embedded(text) => decode_regions(text, &options.scope, id_property)?,
        TopologySource::Inline(value) => decode_value(value, &options.scope, id_property)?,
    };

    info!("Loaded {} regions for scope '{}'", regions.len(), options.scope);
    Ok(filter_regions(regions, options.geography_config.hide_antarctica))
}

pub fn filter_regions(regions: Vec<Region>, hide_antarctica: bool) -> Vec<Region> {
    if !hide_antarctica {
        return regions;
    }
    regions.into_iter().filter(|r| r.id != ANTARCTICA_ID).collect()
}

fn is_shapefile(location: &str) -> bool {
    Path::new(location)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("shp"))
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetch a document over HTTP(S), or read it from disk for any other location.
pub async fn fetch_text(location: &str) -> Result<String, MapError> {
    let fetch_error = |reason: String| MapError::Fetch { url: location.to_string(), reason };

    if !is_remote(location) {
        debug!("Reading {} from disk", location);
        return tokio::fs::read_to_string(location)
            .await
            .map_err(|e| fetch_error(e.to_string()));
    }

    debug!("Fetching {}", location);
    let resp = reqwest::get(location)
        .await
        .map_err(|e| fetch_error(format!("request failed: {e}")))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| fetch_error(format!("failed to read response body: {e}")))?;
    if !status.is_success() {
        let preview = body.chars().take(200).collect::<String>();
        return Err(fetch_error(format!("upstream status {status}; body preview: {preview}")));
    }
    Ok(body)
}

pub fn decode_value(value: Value, scope: &str, id_property: Option<&str>) -> Result<Vec<Region>, MapError> {
    decode_regions(&value.to_string(), scope, id_property)
}

/// Decode a TopoJSON topology (collection named by `scope`) or a GeoJSON
/// FeatureCollection into regions.
pub fn decode_regions(text: &str, scope: &str, id_property: Option<&str>) -> Result<Vec<Region>, MapError> {
    let head: Value = serde_json::from_str(text)?;
    let collection = match head.get("type").and_then(Value::as_str) {
        Some("Topology") => {
            let topo = text
                .parse::<TopoJson>()
                .map_err(|e| MapError::Decode(format!("invalid topology: {:?}", e)))?;
            let TopoJson::Topology(topology) = topo else {
                return Err(MapError::Decode("expected a Topology".into()));
            };
            topojson::to_geojson(&topology, &scope.to_string())
                .map_err(|e| MapError::Decode(format!("no object '{}' in topology: {:?}", scope, e)))?
        }
        Some("FeatureCollection") => match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(fc)) => fc,
            Ok(_) => return Err(MapError::Decode("expected a FeatureCollection".into())),
            Err(e) => return Err(MapError::Decode(e.to_string())),
        },
        other => {
            return Err(MapError::Decode(format!("unsupported document type {:?}", other)));
        }
    };
    features_to_regions(collection, id_property)
}

fn features_to_regions(
    collection: FeatureCollection,
    id_property: Option<&str>,
) -> Result<Vec<Region>, MapError> {
    let mut regions = Vec::new();

    for feature in collection.features {
        let properties = feature.properties.clone().unwrap_or_default();
        let id = match &feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s.clone()),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => id_property.and_then(|key| property_id(&properties, key)),
        };
        let Some(id) = id else {
            debug!("Skipping feature without an id");
            continue;
        };

        let geometry = match feature.geometry {
            Some(geometry) => {
                let valid_geo: geo::Geometry<f64> = geometry
                    .value
                    .try_into()
                    .map_err(|e| MapError::Decode(format!("failed to convert geometry of {}: {:?}", id, e)))?;
                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        regions.push(Region { id, geometry, properties });
    }

    Ok(regions)
}

fn property_id(properties: &Map<String, Value>, key: &str) -> Option<String> {
    match properties.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Read polygons from a shapefile; the id comes from the `id_property` field
/// of each record.
pub fn load_shapefile(path: &Path, id_property: Option<&str>) -> Result<Vec<Region>, MapError> {
    let key = id_property
        .ok_or_else(|| MapError::Config("geographyConfig.idProperty is required for shapefiles".into()))?;
    let mut reader = Reader::from_path(path)
        .map_err(|e| MapError::Decode(format!("failed to open shapefile {:?}: {}", path, e)))?;

    let mut regions = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| MapError::Decode(e.to_string()))?;

        let id = match record.get(key) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(shapefile::dbase::FieldValue::Numeric(Some(n))) => n.to_string(),
            Some(_) => continue,
            None => {
                return Err(MapError::Decode(format!("field '{}' not found in shapefile", key)));
            }
        };

        let converted: Result<MultiPolygon<f64>, String> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
            shapefile::Shape::PolygonM(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into().map_err(|e| format!("{:?}", e)),
            _ => continue,
        };
        let geometry = converted
            .map_err(|e| MapError::Decode(format!("failed to convert polygon {}: {}", id, e)))?;

        let mut properties = Map::new();
        properties.insert(key.to_string(), Value::String(id.clone()));
        regions.push(Region { id, geometry, properties });
    }
    Ok(regions)
}

/// Fetch choropleth data. CSV rows are re-keyed by their `id` column.
pub async fn load_remote_data(url: &str, data_type: DataType) -> Result<Map<String, Value>, MapError> {
    let text = fetch_text(url).await?;
    match data_type {
        DataType::Json => match serde_json::from_str(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(MapError::Decode(format!("{} is not a JSON object", url))),
        },
        DataType::Csv => index_rows_by_id(&text),
    }
}

pub fn index_rows_by_id(text: &str) -> Result<Map<String, Value>, MapError> {
    let mut rdr = ReaderBuilder::new().from_reader(text.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| MapError::Decode(e.to_string()))?
        .clone();
    let id_idx = headers
        .iter()
        .position(|h| h == "id")
        .ok_or_else(|| MapError::Decode("CSV data has no 'id' column".into()))?;

    let mut data = Map::new();
    for result in rdr.records() {
        let record = result.map_err(|e| MapError::Decode(e.to_string()))?;
        let id = record.get(id_idx).unwrap_or("").to_string();
        if id.is_empty() {
            continue;
        }
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        data.insert(id, Value::Object(row));
    }
    Ok(data)
}
