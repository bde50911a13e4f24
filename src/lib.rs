pub mod config;
pub mod data;
pub mod document;
pub mod error;
pub mod interaction;
pub mod map;
pub mod plugin;
pub mod plugins;
pub mod projection;
pub mod render;
pub mod server;
pub mod types;

pub use config::{AppConfig, MapOptions, PopupSubject, PopupTemplate};
pub use document::{Document, NodeId, Size};
pub use error::MapError;
pub use map::Datamap;
pub use projection::{GeoPath, PathAndProjection, Projection, ProjectionStrategy};
pub use types::{Region, RegionDatum};
