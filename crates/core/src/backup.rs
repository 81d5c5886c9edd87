use crate::{
    Client, CloneOptions, Dataset, Entity, Error, Kind, Layer, Record, Resource, Result, Widget,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, io::BufWriter, path::Path};

/// A local copy of a record, as written by [Record::save].
///
/// Datasets are stored with their embedded children, so a backup is enough
/// to recreate a dataset with its layers, widgets, metadata, and vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    /// The kind of the saved record.
    pub kind: Kind,

    /// The saved record.
    pub data: Resource,

    /// When the record was saved.
    pub saved: DateTime<Utc>,
}

impl Backup {
    /// Creates a backup of a resource, saved now.
    pub fn new(kind: Kind, data: Resource) -> Backup {
        Backup {
            kind,
            data,
            saved: Utc::now(),
        }
    }

    /// Reads a backup from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Backup> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(Error::from)
    }

    /// Writes this backup to a file as pretty-printed JSON.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        tracing::debug!("wrote {} {} to {}", self.kind, self.data.id, path.display());
        Ok(())
    }

    /// Converts the saved record back into an entity, without touching the server.
    pub fn into_entity(self) -> Result<Entity> {
        match self.kind {
            Kind::Dataset | Kind::Table => {
                Dataset::from_resource(self.data).map(Entity::from_dataset)
            }
            Kind::Layer => Layer::from_resource(self.data).map(Entity::Layer),
            Kind::Widget => Widget::from_resource(self.data).map(Entity::Widget),
            Kind::Metadata | Kind::Vocabulary => Err(Error::InvalidBackup(self.kind)),
        }
    }

    /// Recreates the saved record on the server, returning the new entity.
    ///
    /// The record keeps its saved name. Datasets are recreated with all their
    /// children; layers and widgets are recreated under their saved dataset.
    pub async fn restore(&self, client: &Client) -> Result<Entity> {
        let entity = self.clone().into_entity()?;
        let options = CloneOptions {
            name: entity.name().map(String::from),
            clone_children: true,
            application: None,
        };
        let restored = match entity {
            Entity::Dataset(dataset) => dataset.clone_dataset(client, &options).await?.into(),
            Entity::Table(table) => table.clone_dataset(client, &options).await?.into(),
            Entity::Layer(layer) => layer.clone_layer(client, &options, None).await?.into(),
            Entity::Widget(widget) => widget.clone_widget(client, &options, None).await?.into(),
        };
        tracing::info!("restored {} {}", self.kind, self.data.id);
        Ok(restored)
    }
}
