use crate::{
    Backup, Client, Dataset, Error, Kind, Layer, Resource, Result, Table, Widget,
    document::unwrap_resource,
};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::{future::Future, path::Path};

/// A record that can be fetched by id and converted to and from an envelope resource.
///
/// [`Record::from_resource`], [`Record::to_resource`], and [`Record::path`]
/// are required. [`Record::get`] and [`Record::save`] have default
/// implementations built on them.
pub trait Record: Sized + Send {
    /// The kind of this record.
    const KIND: Kind;

    /// Creates a record from an envelope resource.
    fn from_resource(resource: Resource) -> Result<Self>;

    /// Converts this record back to an envelope resource.
    fn to_resource(&self) -> Resource;

    /// Returns the api path of a record with this id.
    fn path(id: &str) -> String;

    /// Returns the query parameters sent when getting a record.
    fn get_query() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Returns the kind of this particular record.
    fn kind(&self) -> Kind {
        Self::KIND
    }

    /// Gets a record by id.
    fn get(client: &Client, id: &str) -> impl Future<Output = Result<Self>> + Send {
        async move {
            let value = client.get_with_query(&Self::path(id), Self::get_query()).await?;
            Self::from_resource(unwrap_resource(value)?)
        }
    }

    /// Writes this record to a local backup file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rwapi::{Layer, Record};
    ///
    /// let layer = Layer::new("a-layer");
    /// layer.save("a-layer.json").unwrap();
    /// ```
    fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        Backup::new(self.kind(), self.to_resource()).to_path(path)
    }
}

/// Options for cloning a record.
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// The name of the clone.
    ///
    /// If not provided, the clone is named `"{name} (clone)"`.
    pub name: Option<String>,

    /// Whether to clone a dataset's layers, widgets, metadata, and vocabularies as well.
    pub clone_children: bool,

    /// Overrides the clone's applications.
    pub application: Option<Vec<String>>,
}

/// Options for merging one record into another.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Only these attributes are copied. If not provided, every writable attribute is.
    pub keys: Option<Vec<String>>,

    /// Whether to merge a dataset's layers and widgets as well.
    pub children: bool,
}

/// Options for deleting a dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Delete layers, widgets, metadata, and vocabularies first.
    pub cascade: bool,
}

impl CloneOptions {
    /// Sets the clone's name.
    pub fn name(mut self, name: impl ToString) -> CloneOptions {
        self.name = Some(name.to_string());
        self
    }

    /// Sets whether to clone children.
    pub fn children(mut self, clone_children: bool) -> CloneOptions {
        self.clone_children = clone_children;
        self
    }

    pub(crate) fn name_for(&self, original: Option<&str>) -> String {
        self.name.clone().unwrap_or_else(|| {
            format!("{} (clone)", original.unwrap_or("untitled"))
        })
    }

    /// Applies the name and application overrides to a set of attributes.
    pub(crate) fn apply(&self, attributes: &mut Map<String, Value>) {
        let name = self.name_for(attributes.get("name").and_then(Value::as_str));
        let _ = attributes.insert("name".to_string(), name.into());
        if let Some(application) = &self.application {
            let _ = attributes.insert("application".to_string(), application.clone().into());
        }
    }
}

/// A search result: one of the record kinds that a [Collection](crate::Collection) holds.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Entity {
    /// A non-tabular dataset.
    Dataset(Dataset),

    /// A tabular dataset.
    Table(Table),

    /// A layer.
    Layer(Layer),

    /// A widget.
    Widget(Widget),
}

impl Entity {
    /// Wraps a dataset, as a [Entity::Table] if it is tabular.
    pub fn from_dataset(dataset: Dataset) -> Entity {
        match Table::new(dataset) {
            Ok(table) => Entity::Table(table),
            Err(dataset) => Entity::Dataset(dataset),
        }
    }

    /// Gets an entity of the given kind.
    pub async fn get(client: &Client, kind: Kind, id: &str) -> Result<Entity> {
        match kind {
            Kind::Dataset | Kind::Table => Dataset::get(client, id).await.map(Entity::from_dataset),
            Kind::Layer => Layer::get(client, id).await.map(Entity::Layer),
            Kind::Widget => Widget::get(client, id).await.map(Entity::Widget),
            Kind::Metadata | Kind::Vocabulary => Err(Error::UnknownKind(kind.to_string())),
        }
    }

    /// Returns this entity's kind.
    pub fn kind(&self) -> Kind {
        match self {
            Entity::Dataset(_) => Kind::Dataset,
            Entity::Table(_) => Kind::Table,
            Entity::Layer(_) => Kind::Layer,
            Entity::Widget(_) => Kind::Widget,
        }
    }

    /// Returns this entity's id.
    pub fn id(&self) -> &str {
        match self {
            Entity::Dataset(dataset) => &dataset.id,
            Entity::Table(table) => &table.id,
            Entity::Layer(layer) => &layer.id,
            Entity::Widget(widget) => &widget.id,
        }
    }

    /// Returns this entity's name.
    pub fn name(&self) -> Option<&str> {
        self.attribute("name").and_then(Value::as_str)
    }

    /// Returns this entity's attributes.
    pub fn attributes(&self) -> &Map<String, Value> {
        match self {
            Entity::Dataset(dataset) => &dataset.attributes,
            Entity::Table(table) => &table.attributes,
            Entity::Layer(layer) => &layer.attributes,
            Entity::Widget(widget) => &widget.attributes,
        }
    }

    /// Returns a single attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes().get(key)
    }

    /// Converts this entity to an envelope resource.
    pub fn to_resource(&self) -> Resource {
        match self {
            Entity::Dataset(dataset) => dataset.to_resource(),
            Entity::Table(table) => table.to_resource(),
            Entity::Layer(layer) => layer.to_resource(),
            Entity::Widget(widget) => widget.to_resource(),
        }
    }

    /// Writes this entity to a local backup file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        Backup::new(self.kind(), self.to_resource()).to_path(path)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}

impl From<Dataset> for Entity {
    fn from(dataset: Dataset) -> Entity {
        Entity::from_dataset(dataset)
    }
}

impl From<Layer> for Entity {
    fn from(layer: Layer) -> Entity {
        Entity::Layer(layer)
    }
}

impl From<Widget> for Entity {
    fn from(widget: Widget) -> Entity {
        Entity::Widget(widget)
    }
}

/// Creates a child of a dataset, e.g. a layer or widget.
pub(crate) async fn create_child(
    client: &Client,
    dataset_id: &str,
    segment: &str,
    attributes: &Map<String, Value>,
) -> Result<Resource> {
    let value = client
        .post(&format!("v1/dataset/{dataset_id}/{segment}"), attributes)
        .await?;
    unwrap_resource(value)
}

/// Updates a child of a dataset.
pub(crate) async fn update_child(
    client: &Client,
    dataset_id: &str,
    segment: &str,
    id: &str,
    attributes: &Map<String, Value>,
) -> Result<Resource> {
    let value = client
        .patch(&format!("v1/dataset/{dataset_id}/{segment}/{id}"), attributes)
        .await?;
    unwrap_resource(value)
}

/// Deletes a child of a dataset.
pub(crate) async fn delete_child(
    client: &Client,
    dataset_id: &str,
    segment: &str,
    id: &str,
) -> Result<()> {
    let _ = client
        .delete(&format!("v1/dataset/{dataset_id}/{segment}/{id}"))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CloneOptions, Entity};
    use crate::{Dataset, Kind, Layer, Record, Resource};
    use serde_json::{Map, json};

    #[test]
    fn clone_options_name() {
        let mut attributes = Map::new();
        let _ = attributes.insert("name".to_string(), "Forest loss".into());
        CloneOptions::default().apply(&mut attributes);
        assert_eq!(attributes["name"], "Forest loss (clone)");

        let mut attributes = Map::new();
        CloneOptions::default()
            .name("Copy")
            .apply(&mut attributes);
        assert_eq!(attributes["name"], "Copy");
    }

    #[test]
    fn from_dataset_picks_table() {
        let mut resource = Resource::new("a-dataset", "dataset");
        let _ = resource
            .attributes
            .insert("provider".to_string(), "cartodb".into());
        let dataset = Dataset::from_resource(resource).unwrap();
        let entity = Entity::from_dataset(dataset);
        assert_eq!(entity.kind(), Kind::Table);
        assert_eq!(entity.id(), "a-dataset");
    }

    #[test]
    fn serialize_as_resource() {
        let entity = Entity::from(Layer::new("a-layer"));
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value, json!({"id": "a-layer", "type": "layer", "attributes": {}}));
    }
}
