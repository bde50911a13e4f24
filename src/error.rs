use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("invalid map configuration: {0}")]
    Config(String),

    #[error("Datamaps Error - {0} must be an array")]
    NotAnArray(&'static str),

    #[error("invalid {plugin} datum: {reason}")]
    InvalidDatum { plugin: &'static str, reason: String },

    #[error("no plugin registered under '{0}'")]
    UnknownPlugin(String),

    #[error("no boundary data for scope '{0}': set geographyConfig.dataUrl or dataJson")]
    NoTopology(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode boundary data: {0}")]
    Decode(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = MapError> = std::result::Result<T, E>;
