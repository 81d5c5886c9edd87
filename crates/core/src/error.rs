use crate::Kind;
use thiserror::Error;

/// Error enum for crate-specific errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The API answered with a non-success status code.
    #[error("api error at {url} ({status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,

        /// The requested url.
        url: String,

        /// The message drawn from the response body, if any.
        message: String,
    },

    /// [chrono::ParseError]
    #[error(transparent)]
    ChronoParse(#[from] chrono::ParseError),

    /// [geojson::Error]
    #[error(transparent)]
    Geojson(#[from] Box<geojson::Error>),

    /// Returned when deleting a dataset that still has children and cascade
    /// was not requested.
    #[error("dataset {id} has {count} child resource(s), use cascade to delete them")]
    HasChildren {
        /// The dataset id.
        id: String,

        /// The number of layers, widgets, metadata, and vocabularies.
        count: usize,
    },

    /// Returned when a backup file holds a kind that cannot be restored.
    #[error("cannot restore a backup of kind {0}")]
    InvalidBackup(Kind),

    /// This string is not a valid server name or url.
    #[error("invalid server: {0}")]
    InvalidServer(String),

    /// [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Returned when a mutating call is made without an API token.
    #[error("this operation requires an api token")]
    MissingToken,

    /// Returned when there is not a required field in a JSON object.
    #[error("no \"{0}\" field in the JSON object")]
    MissingField(&'static str),

    /// The operation only applies to tabular datasets.
    #[error("dataset {0} is not tabular")]
    NotTabular(String),

    /// This is not a JSON object.
    #[error("json value is not an object")]
    NotAnObject(serde_json::Value),

    /// [reqwest::Error]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// [serde_json::Error]
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// [serde_urlencoded::ser::Error]
    #[error(transparent)]
    SerdeUrlencoded(#[from] serde_urlencoded::ser::Error),

    /// The entity kind is not known.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// Tile urls can't be built for this layer provider.
    #[error("unsupported layer provider: {0}")]
    UnsupportedProvider(String),

    /// [url::ParseError]
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
}
