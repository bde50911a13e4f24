use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One administrative subdivision decoded from the boundary data.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub properties: Map<String, Value>,
}

impl Region {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Localized display name, falling back to `name` and then the id.
    pub fn local_name(&self) -> &str {
        self.property_str("name_local")
            .or_else(|| self.property_str("name"))
            .unwrap_or(&self.id)
    }
}

/// Per-region entry of the choropleth data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionDatum {
    Color(String),
    Descriptor(Map<String, Value>),
}

impl RegionDatum {
    pub fn fill_key(&self) -> Option<&str> {
        match self {
            RegionDatum::Color(_) => None,
            RegionDatum::Descriptor(fields) => fields.get("fillKey").and_then(Value::as_str),
        }
    }

    pub fn explicit_color(&self) -> Option<&str> {
        match self {
            RegionDatum::Color(color) => Some(color),
            RegionDatum::Descriptor(fields) => fields.get("color").and_then(Value::as_str),
        }
    }

    /// Merge an incoming entry into this one. Incoming fields win; fields the
    /// incoming object leaves out survive.
    pub fn absorb(&mut self, incoming: RegionDatum) {
        match (self, incoming) {
            (RegionDatum::Descriptor(existing), RegionDatum::Descriptor(fields)) => {
                for (key, value) in fields {
                    if !value.is_null() {
                        existing.insert(key, value);
                    }
                }
            }
            (slot, incoming) => *slot = incoming,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleDatum {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub centered: Option<String>,
    #[serde(default)]
    pub radius: f64,
    pub fill_key: Option<String>,
    pub border_color: Option<String>,
    pub border_width: Option<f64>,
    pub fill_opacity: Option<f64>,
}

impl BubbleDatum {
    pub fn coordinates(&self) -> Option<LatLng> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(LatLng { latitude, longitude }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArcDatum {
    pub origin: LatLng,
    pub destination: LatLng,
    #[serde(default)]
    pub options: ArcStyle,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcStyle {
    pub stroke_color: Option<String>,
    pub stroke_width: Option<f64>,
}

/// Identity of a plugin datum: its JSON with object keys sorted, so field
/// order does not matter and distinct datums never share a key.
pub fn datum_key(datum: &Value) -> String {
    canonical(datum).to_string()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> =
                keys.into_iter().map(|key| (key.clone(), canonical(&fields[key]))).collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
