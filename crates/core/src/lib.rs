//! Rust client for the [Resource Watch](https://resourcewatch.org), [Global
//! Forest Watch](https://www.globalforestwatch.org), and
//! [Skydipper](https://skydipper.com) apis.
//!
//! These apis share one backend that stores geospatial datasets along with
//! the map layers, widgets, metadata, and vocabularies built on them. This
//! crate fetches, searches, edits, clones, merges, and backs up those records.
//!
//! # Searching
//!
//! [Collection::search] pages through every dataset visible to the client and
//! filters datasets, tables, layers, and widgets locally:
//!
//! ```no_run
//! use rwapi::{Client, Collection, Kind, SearchParams};
//!
//! # tokio_test::block_on(async {
//! let client = Client::from_env().unwrap();
//! let params = SearchParams::new().term("tree cover").kind(Kind::Layer).limit(5);
//! for entity in Collection::search(&client, &params).await.unwrap() {
//!     println!("{}: {}", entity.id(), entity.name().unwrap_or_default());
//! }
//! # })
//! ```
//!
//! # Records
//!
//! [Dataset], [Layer], and [Widget] implement [Record], which provides
//! [Record::get] and [Record::save]:
//!
//! ```no_run
//! use rwapi::{Client, Dataset, Record};
//!
//! # tokio_test::block_on(async {
//! let client = Client::from_env().unwrap();
//! let dataset = Dataset::get(&client, "a-dataset-id").await.unwrap();
//! println!("{} layer(s)", dataset.layers.len());
//! dataset.save("dataset.json").unwrap();
//! # })
//! ```
//!
//! Anything that writes to the server needs a token, either from
//! `RW_API_TOKEN` (see [Config::from_env]) or from [User::login].

pub mod attributes;
mod backup;
mod client;
pub mod collection;
mod config;
mod dataset;
mod document;
mod entity;
mod error;
mod geometry;
pub mod image;
mod kind;
mod layer;
mod metadata;
mod table;
mod user;
mod vocabulary;
mod widget;

pub use {
    backup::Backup,
    client::Client,
    collection::{Collection, Direction, SearchParams},
    config::{
        APPLICATION_ENV_VAR, Config, DEFAULT_CARTO_HOST, DEFAULT_PAGE_SIZE, ENVIRONMENT_ENV_VAR,
        Server, TOKEN_ENV_VAR, URL_ENV_VAR,
    },
    dataset::{Dataset, INCLUDES},
    document::{Document, ListDocument, Resource, unwrap_data, unwrap_resource},
    entity::{CloneOptions, DeleteOptions, Entity, MergeOptions, Record},
    error::Error,
    geometry::Geometry,
    image::{Image, ImageCollection, ImageSearch},
    kind::Kind,
    layer::Layer,
    metadata::Metadata,
    table::Table,
    user::User,
    vocabulary::Vocabulary,
    widget::Widget,
};

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns a string suitable for use as a HTTP user agent.
pub fn user_agent() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    #[test]
    fn user_agent() {
        assert!(super::user_agent().starts_with("rwapi/"));
    }
}
