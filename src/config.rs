use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

use crate::error::MapError;
use crate::map::Datamap;
use crate::projection::ProjectionStrategy;
use crate::types::{Region, RegionDatum};

/// Sub-sections that are filled key by key rather than taken whole.
pub const SECTIONS: [&str; 6] = [
    "fills",
    "geographyConfig",
    "projectionConfig",
    "bubblesConfig",
    "arcConfig",
    "labelsConfig",
];

pub fn default_options() -> Value {
    json!({
        "scope": "world",
        "projection": "equirectangular",
        "dataType": "json",
        "dataUrl": null,
        "data": {},
        "fills": {
            "defaultFill": "#ABDDA4"
        },
        "geographyConfig": {
            "dataUrl": null,
            "dataJson": null,
            "idProperty": "iso_3166_2",
            "hideAntarctica": true,
            "borderWidth": 1,
            "borderColor": "#FDFDFD",
            "popupOnHover": true,
            "highlightOnHover": true,
            "highlightFillColor": "#FC8D59",
            "highlightBorderColor": "rgba(250, 15, 160, 0.2)",
            "highlightBorderWidth": 2,
            "highlightFillOpacity": 1,
            "raiseOnHover": true
        },
        "projectionConfig": {
            "rotation": [97, 0]
        },
        "bubblesConfig": {
            "borderWidth": 2,
            "borderColor": "#FFFFFF",
            "popupOnHover": true,
            "fillOpacity": 0.75,
            "animate": true,
            "highlightOnHover": true,
            "highlightFillColor": "#FC8D59",
            "highlightBorderColor": "rgba(250, 15, 160, 0.2)",
            "highlightBorderWidth": 2,
            "highlightFillOpacity": 0.85,
            "exitDelay": 100
        },
        "arcConfig": {
            "strokeColor": "#DD1C77",
            "strokeWidth": 1,
            "arcSharpness": 1,
            "animationSpeed": 600
        },
        "labelsConfig": {
            "fontSize": 10,
            "fontFamily": "Verdana",
            "labelColor": "#000"
        }
    })
}

/// Copy every key of `defaults` that is missing or null in `target`.
pub fn fill_defaults(target: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, value) in defaults {
        match target.get(key) {
            Some(existing) if !existing.is_null() => {}
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Fill a user configuration in place with the documented defaults.
pub fn merge_options(user: &mut Value) -> Result<(), MapError> {
    merge_with(user, &default_options())
}

pub fn merge_with(user: &mut Value, defaults: &Value) -> Result<(), MapError> {
    if user.is_null() {
        *user = Value::Object(Map::new());
    }
    let Value::Object(target) = user else {
        return Err(MapError::Config("options must be an object".into()));
    };
    let Value::Object(defaults) = defaults else {
        return Err(MapError::Config("defaults must be an object".into()));
    };

    fill_defaults(target, defaults);

    for section in SECTIONS {
        let Some(Value::Object(section_defaults)) = defaults.get(section) else {
            continue;
        };
        if let Some(Value::Object(section_target)) = target.get_mut(section) {
            fill_defaults(section_target, section_defaults);
        }
    }
    Ok(())
}

/// Either side of a hover popup.
pub enum PopupSubject<'a> {
    Region(&'a Region),
    Bubble(&'a Value),
}

type PopupFn = dyn Fn(&PopupSubject<'_>, Option<&Value>) -> String + Send + Sync;

#[derive(Clone)]
pub struct PopupTemplate(Arc<PopupFn>);

impl PopupTemplate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&PopupSubject<'_>, Option<&Value>) -> String + Send + Sync + 'static,
    {
        PopupTemplate(Arc::new(f))
    }

    pub fn render(&self, subject: &PopupSubject<'_>, data: Option<&Value>) -> String {
        (self.0)(subject, data)
    }

    pub fn region_default() -> Self {
        PopupTemplate::new(|subject, _| match subject {
            PopupSubject::Region(region) => {
                format!("<div class=\"hoverinfo\"><strong>{}</strong></div>", region.local_name())
            }
            PopupSubject::Bubble(_) => String::new(),
        })
    }

    pub fn bubble_default() -> Self {
        PopupTemplate::new(|_, data| {
            let name = data
                .and_then(|d| d.get("name_local"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("<div class=\"hoverinfo\"><strong>{name}</strong></div>")
        })
    }
}

impl fmt::Debug for PopupTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PopupTemplate(..)")
    }
}

#[derive(Clone)]
pub struct DoneCallback(Arc<dyn Fn(&mut Datamap) + Send + Sync>);

impl DoneCallback {
    pub fn call(&self, map: &mut Datamap) {
        (self.0)(map)
    }
}

impl fmt::Debug for DoneCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DoneCallback(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    Equirectangular,
    Mercator,
    Orthographic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Json,
    Csv,
}

/// Fill key to color table. Keeps declaration order for the legend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Fills(Map<String, Value>);

impl Fills {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn default_fill(&self) -> &str {
        self.get("defaultFill").unwrap_or("#ABDDA4")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|color| (key.as_str(), color)))
    }

    /// Color a region is first drawn with: its known fill key, else the
    /// default fill.
    pub fn for_fill_key(&self, datum: Option<&RegionDatum>) -> String {
        datum
            .and_then(RegionDatum::fill_key)
            .and_then(|key| self.get(key))
            .unwrap_or_else(|| self.default_fill())
            .to_string()
    }

    /// Color for a choropleth update: literal, explicit `color`, known fill
    /// key, then the default fill.
    pub fn resolve(&self, datum: Option<&RegionDatum>) -> String {
        let Some(datum) = datum else {
            return self.default_fill().to_string();
        };
        datum
            .explicit_color()
            .or_else(|| datum.fill_key().and_then(|key| self.get(key)))
            .unwrap_or_else(|| self.default_fill())
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographyConfig {
    pub data_url: Option<String>,
    pub data_json: Option<Value>,
    pub id_property: Option<String>,
    pub hide_antarctica: bool,
    pub border_width: f64,
    pub border_color: String,
    pub popup_on_hover: bool,
    pub highlight_on_hover: bool,
    pub highlight_fill_color: String,
    pub highlight_border_color: String,
    pub highlight_border_width: f64,
    pub highlight_fill_opacity: f64,
    pub raise_on_hover: bool,
    #[serde(skip)]
    pub popup_template: Option<PopupTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionConfig {
    pub rotation: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubblesConfig {
    pub border_width: f64,
    pub border_color: String,
    pub popup_on_hover: bool,
    pub fill_opacity: f64,
    pub animate: bool,
    pub highlight_on_hover: bool,
    pub highlight_fill_color: String,
    pub highlight_border_color: String,
    pub highlight_border_width: f64,
    pub highlight_fill_opacity: f64,
    pub exit_delay: u64,
    #[serde(skip)]
    pub popup_template: Option<PopupTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcConfig {
    pub stroke_color: String,
    pub stroke_width: f64,
    pub arc_sharpness: f64,
    pub animation_speed: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsConfig {
    pub font_size: f64,
    pub font_family: String,
    pub label_color: String,
}

/// Highlight settings shared by regions and bubbles.
#[derive(Debug, Clone)]
pub struct HoverStyle {
    pub highlight_on_hover: bool,
    pub popup_on_hover: bool,
    pub fill_color: String,
    pub border_color: String,
    pub border_width: f64,
    pub fill_opacity: f64,
    pub raise: bool,
}

impl GeographyConfig {
    pub fn hover_style(&self) -> HoverStyle {
        HoverStyle {
            highlight_on_hover: self.highlight_on_hover,
            popup_on_hover: self.popup_on_hover,
            fill_color: self.highlight_fill_color.clone(),
            border_color: self.highlight_border_color.clone(),
            border_width: self.highlight_border_width,
            fill_opacity: self.highlight_fill_opacity,
            raise: self.raise_on_hover,
        }
    }
}

impl BubblesConfig {
    pub fn hover_style(&self) -> HoverStyle {
        HoverStyle {
            highlight_on_hover: self.highlight_on_hover,
            popup_on_hover: self.popup_on_hover,
            fill_color: self.highlight_fill_color.clone(),
            border_color: self.highlight_border_color.clone(),
            border_width: self.highlight_border_width,
            fill_opacity: self.highlight_fill_opacity,
            raise: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptions {
    pub scope: String,
    pub projection: ProjectionKind,
    pub data_type: DataType,
    pub data_url: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    #[serde(default)]
    pub disable_default_styles: bool,
    pub fills: Fills,
    #[serde(default, deserialize_with = "region_data")]
    pub data: HashMap<String, RegionDatum>,
    pub geography_config: GeographyConfig,
    pub projection_config: ProjectionConfig,
    pub bubbles_config: BubblesConfig,
    pub arc_config: ArcConfig,
    pub labels_config: LabelsConfig,
    #[serde(skip)]
    pub done: Option<DoneCallback>,
    #[serde(skip)]
    pub set_projection: Option<ProjectionStrategy>,
    /// The merged option tree, used as the per-plugin default table.
    #[serde(skip)]
    pub merged: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn region_data<'de, D>(deserializer: D) -> Result<HashMap<String, RegionDatum>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(id, value)| {
            serde_json::from_value::<RegionDatum>(value)
                .ok()
                .map(|datum| (id, datum))
        })
        .collect())
}

impl MapOptions {
    /// Merge `user` with the defaults (in place) and decode it.
    pub fn from_value(mut user: Value) -> Result<Self, MapError> {
        merge_options(&mut user)?;
        let mut options: MapOptions = serde_json::from_value(user.clone())
            .map_err(|e| MapError::Config(e.to_string()))?;
        options.merged = user;
        Ok(options)
    }

    pub fn with_done<F>(mut self, done: F) -> Self
    where
        F: Fn(&mut Datamap) + Send + Sync + 'static,
    {
        self.done = Some(DoneCallback(Arc::new(done)));
        self
    }

    pub fn with_projection_strategy(mut self, strategy: ProjectionStrategy) -> Self {
        self.set_projection = Some(strategy);
        self
    }

    pub fn with_geography_popup(mut self, template: PopupTemplate) -> Self {
        self.geography_config.popup_template = Some(template);
        self
    }

    pub fn with_bubble_popup(mut self, template: PopupTemplate) -> Self {
        self.bubbles_config.popup_template = Some(template);
        self
    }

    /// Default options for a plugin, taken from its `<name>Config` section.
    pub fn plugin_defaults(&self, name: &str) -> Value {
        self.merged
            .get(format!("{name}Config"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

/// File configuration for the command line tool.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub map: Value,
    #[serde(default)]
    pub plugins: Vec<PluginCall>,
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PluginCall {
    pub name: String,
    #[serde(default)]
    pub data: Value,
    pub options: Option<Value>,
    #[serde(default)]
    pub new_layer: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { port: 8080 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    pub fn map_options(&self) -> Result<MapOptions> {
        MapOptions::from_value(self.map.clone()).context("Invalid [map] section")
    }
}
