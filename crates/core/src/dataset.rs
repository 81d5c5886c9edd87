use crate::{
    Client, CloneOptions, DeleteOptions, Error, Geometry, Kind, Layer, MergeOptions, Metadata,
    Record, Resource, Result, Table, Vocabulary, Widget,
    attributes::{self, str_value},
    document::unwrap_resource,
};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// The child records embedded when getting a dataset.
pub const INCLUDES: &str = "layer,widget,vocabulary,metadata";

/// Providers whose datasets are tables.
const TABULAR_PROVIDERS: &[&str] = &[
    "cartodb",
    "csv",
    "tsv",
    "json",
    "xml",
    "bigquery",
    "featureservice",
];

/// A dataset and its embedded children.
///
/// Children are unpacked from the `layer`, `widget`, `metadata`, and
/// `vocabulary` attributes when a dataset is built from a resource, and packed
/// back into them by [`Record::to_resource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// The dataset id.
    pub id: String,

    /// The attribute bag, without embedded children.
    pub attributes: Map<String, Value>,

    /// The dataset's layers.
    pub layers: Vec<Layer>,

    /// The dataset's widgets.
    pub widgets: Vec<Widget>,

    /// The dataset's metadata, one per application and language.
    pub metadata: Vec<Metadata>,

    /// The dataset's vocabularies.
    pub vocabularies: Vec<Vocabulary>,
}

impl Dataset {
    /// Creates a new, empty dataset.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::Dataset;
    ///
    /// let dataset = Dataset::new("a-dataset");
    /// assert!(dataset.layers.is_empty());
    /// ```
    pub fn new(id: impl ToString) -> Dataset {
        Dataset {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Creates a dataset on the server from a set of attributes.
    ///
    /// The dataset is fetched again afterwards, so the returned value carries
    /// server-assigned attributes.
    pub async fn create(client: &Client, attributes: &Map<String, Value>) -> Result<Dataset> {
        let value = client.post("v1/dataset", attributes).await?;
        let resource = unwrap_resource(value)?;
        tracing::info!("created dataset {}", resource.id);
        Dataset::get(client, &resource.id).await
    }

    /// Returns a single attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns this dataset's name.
    pub fn name(&self) -> Option<&str> {
        str_value(&self.attributes, "name")
    }

    /// Returns this dataset's slug.
    pub fn slug(&self) -> Option<&str> {
        str_value(&self.attributes, "slug")
    }

    /// Returns this dataset's provider, e.g. `cartodb` or `gee`.
    pub fn provider(&self) -> Option<&str> {
        str_value(&self.attributes, "provider")
    }

    /// Returns this dataset's connector type, e.g. `rest` or `document`.
    pub fn connector_type(&self) -> Option<&str> {
        str_value(&self.attributes, "connectorType")
    }

    /// Returns this dataset's table name.
    pub fn table_name(&self) -> Option<&str> {
        str_value(&self.attributes, "tableName")
    }

    /// Returns true if this dataset can be queried with sql.
    ///
    /// The `type` attribute decides when it's set, otherwise the provider does.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::Dataset;
    ///
    /// let mut dataset = Dataset::new("a-dataset");
    /// assert!(!dataset.is_tabular());
    /// let _ = dataset.attributes.insert("provider".into(), "cartodb".into());
    /// assert!(dataset.is_tabular());
    /// let _ = dataset.attributes.insert("type".into(), "raster".into());
    /// assert!(!dataset.is_tabular());
    /// ```
    pub fn is_tabular(&self) -> bool {
        match str_value(&self.attributes, "type") {
            Some(r#type) => r#type.eq_ignore_ascii_case("tabular"),
            None => self.provider().is_some_and(|provider| {
                TABULAR_PROVIDERS
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(provider))
            }),
        }
    }

    /// Returns this dataset as a [Table], if it is tabular.
    pub fn as_table(&self) -> Option<Table> {
        Table::new(self.clone()).ok()
    }

    /// Returns the number of embedded children.
    pub fn child_count(&self) -> usize {
        self.layers.len() + self.widgets.len() + self.metadata.len() + self.vocabularies.len()
    }

    /// Fetches this dataset again, replacing its attributes and children.
    pub async fn refresh(&mut self, client: &Client) -> Result<()> {
        *self = Dataset::get(client, &self.id).await?;
        Ok(())
    }

    /// Updates this dataset's attributes on the server, then refreshes.
    pub async fn update(&mut self, client: &Client, attributes: &Map<String, Value>) -> Result<()> {
        let _ = client.patch(&Dataset::path(&self.id), attributes).await?;
        tracing::info!("updated dataset {}", self.id);
        self.refresh(client).await
    }

    /// Deletes this dataset.
    ///
    /// A dataset with children is only deleted with [DeleteOptions::cascade],
    /// in which case its widgets, layers, metadata, and vocabularies are
    /// deleted first.
    pub async fn delete(self, client: &Client, options: DeleteOptions) -> Result<()> {
        let count = self.child_count();
        if count > 0 && !options.cascade {
            return Err(Error::HasChildren { id: self.id, count });
        }
        if client.token().is_none() {
            return Err(Error::MissingToken);
        }
        for widget in self.widgets {
            tracing::info!("deleting widget {}", widget.id);
            widget.delete(client).await?;
        }
        for layer in self.layers {
            tracing::info!("deleting layer {}", layer.id);
            layer.delete(client).await?;
        }
        for metadata in self.metadata {
            tracing::info!("deleting metadata {}", metadata.id);
            metadata.delete(client).await?;
        }
        for vocabulary in self.vocabularies {
            tracing::info!("deleting vocabulary {}", vocabulary.name);
            vocabulary.delete(client).await?;
        }
        let _ = client.delete(&Dataset::path(&self.id)).await?;
        tracing::info!("deleted dataset {}", self.id);
        Ok(())
    }

    /// Creates a copy of this dataset on the server.
    ///
    /// The clone is unpublished. With [CloneOptions::clone_children], layers,
    /// widgets, vocabularies, and metadata are recreated under the clone, and
    /// references to the old layer ids inside widget configs are pointed at
    /// the new layers.
    pub async fn clone_dataset(&self, client: &Client, options: &CloneOptions) -> Result<Dataset> {
        let mut attributes = attributes::writable(&self.attributes, None);
        options.apply(&mut attributes);
        let _ = attributes.insert("published".to_string(), false.into());
        let mut clone = Dataset::create(client, &attributes).await?;
        tracing::info!("cloned dataset {} to {}", self.id, clone.id);
        if options.clone_children {
            self.clone_children(client, &clone.id, options).await?;
            clone.refresh(client).await?;
        }
        Ok(clone)
    }

    async fn clone_children(
        &self,
        client: &Client,
        dataset_id: &str,
        options: &CloneOptions,
    ) -> Result<()> {
        let mut replacements = vec![(self.id.clone(), dataset_id.to_string())];
        for layer in &self.layers {
            let child_options = child_options(options, layer.name());
            let clone = layer.clone_into(client, dataset_id, &child_options).await?;
            replacements.push((layer.id.clone(), clone.id));
        }
        for widget in &self.widgets {
            let child_options = child_options(options, widget.name());
            let _ = widget
                .clone_into(client, dataset_id, &child_options, &replacements)
                .await?;
        }
        for vocabulary in &self.vocabularies {
            let _ = Vocabulary::create(
                client,
                dataset_id,
                &vocabulary.name,
                vocabulary.tags.clone(),
                &vocabulary.application,
            )
            .await?;
        }
        for metadata in &self.metadata {
            let _ = Metadata::create(client, dataset_id, &metadata.writable_attributes()).await?;
        }
        tracing::info!(
            "cloned {} layer(s) and {} widget(s) of dataset {} to {}",
            self.layers.len(),
            self.widgets.len(),
            self.id,
            dataset_id
        );
        Ok(())
    }

    /// Copies this dataset's attributes onto another dataset.
    ///
    /// With [MergeOptions::children], each layer and widget is merged into
    /// the target's child with the same name, or cloned into the target when
    /// there is no such child. Returns the refreshed target.
    pub async fn merge_into(
        &self,
        client: &Client,
        target_id: &str,
        options: &MergeOptions,
    ) -> Result<Dataset> {
        let mut target = Dataset::get(client, target_id).await?;
        let attributes = attributes::writable(&self.attributes, options.keys.as_deref());
        if !attributes.is_empty() {
            let _ = client.patch(&Dataset::path(target_id), &attributes).await?;
        }
        tracing::info!("merged dataset {} into {}", self.id, target_id);
        if options.children {
            let mut replacements = vec![(self.id.clone(), target.id.clone())];
            for layer in &self.layers {
                let target_layer = match find_by_name(&target.layers, layer.name(), Layer::name) {
                    Some(target_layer) => {
                        layer
                            .merge_into(client, &target_layer.id, options.keys.as_deref())
                            .await?
                    }
                    None => {
                        let child_options = child_options(&CloneOptions::default(), layer.name());
                        layer.clone_into(client, &target.id, &child_options).await?
                    }
                };
                replacements.push((layer.id.clone(), target_layer.id));
            }
            for widget in &self.widgets {
                match find_by_name(&target.widgets, widget.name(), Widget::name) {
                    Some(target_widget) => {
                        let _ = widget
                            .merge_into_with(
                                client,
                                &target_widget.id,
                                options.keys.as_deref(),
                                &replacements,
                            )
                            .await?;
                    }
                    None => {
                        let child_options =
                            child_options(&CloneOptions::default(), widget.name());
                        let _ = widget
                            .clone_into(client, &target.id, &child_options, &replacements)
                            .await?;
                    }
                }
            }
        }
        target.refresh(client).await?;
        Ok(target)
    }

    /// Adds a vocabulary to this dataset, then refreshes.
    pub async fn add_vocabulary(
        &mut self,
        client: &Client,
        name: &str,
        tags: Vec<String>,
        application: &str,
    ) -> Result<()> {
        let _ = Vocabulary::create(client, &self.id, name, tags, application).await?;
        self.refresh(client).await
    }

    /// Adds metadata to this dataset, then refreshes.
    ///
    /// `application` and `language` default to the client's first
    /// application and `en`.
    pub async fn add_metadata(
        &mut self,
        client: &Client,
        attributes: &Map<String, Value>,
    ) -> Result<()> {
        let _ = Metadata::create(client, &self.id, attributes).await?;
        self.refresh(client).await
    }

    /// Queries the rows of this tabular dataset that intersect a geostore.
    pub async fn intersect(
        &self,
        client: &Client,
        geometry: &Geometry,
    ) -> Result<Vec<Map<String, Value>>> {
        match self.as_table() {
            Some(table) => table.intersect(client, geometry).await,
            None => Err(Error::NotTabular(self.id.clone())),
        }
    }
}

fn child_options(options: &CloneOptions, name: Option<&str>) -> CloneOptions {
    CloneOptions {
        name: Some(name.unwrap_or("untitled").to_string()),
        clone_children: false,
        application: options.application.clone(),
    }
}

fn find_by_name<'a, T>(
    children: &'a [T],
    name: Option<&str>,
    get_name: impl Fn(&T) -> Option<&str>,
) -> Option<&'a T> {
    let name = name?;
    children.iter().find(|child| get_name(child) == Some(name))
}

impl Record for Dataset {
    const KIND: Kind = Kind::Dataset;

    fn from_resource(mut resource: Resource) -> Result<Dataset> {
        let dataset_id = resource.id.clone();
        let layers = resource
            .take_embedded("layer")
            .into_iter()
            .map(Layer::from_resource)
            .collect::<Result<Vec<_>>>()?;
        let widgets = resource
            .take_embedded("widget")
            .into_iter()
            .map(Widget::from_resource)
            .collect::<Result<Vec<_>>>()?;
        let metadata = resource
            .take_embedded("metadata")
            .into_iter()
            .map(|resource| Metadata::from_resource(resource, &dataset_id))
            .collect();
        let vocabularies = resource
            .take_embedded("vocabulary")
            .into_iter()
            .map(|resource| Vocabulary::from_resource(resource, &dataset_id))
            .collect();
        Ok(Dataset {
            id: resource.id,
            attributes: resource.attributes,
            layers,
            widgets,
            metadata,
            vocabularies,
        })
    }

    fn to_resource(&self) -> Resource {
        let mut attributes = self.attributes.clone();
        let _ = attributes.insert(
            "layer".to_string(),
            self.layers
                .iter()
                .map(|layer| resource_value(layer.to_resource()))
                .collect(),
        );
        let _ = attributes.insert(
            "widget".to_string(),
            self.widgets
                .iter()
                .map(|widget| resource_value(widget.to_resource()))
                .collect(),
        );
        let _ = attributes.insert(
            "metadata".to_string(),
            self.metadata
                .iter()
                .map(|metadata| resource_value(metadata.to_resource()))
                .collect(),
        );
        let _ = attributes.insert(
            "vocabulary".to_string(),
            self.vocabularies
                .iter()
                .map(|vocabulary| resource_value(vocabulary.to_resource()))
                .collect(),
        );
        Resource {
            id: self.id.clone(),
            r#type: "dataset".to_string(),
            attributes,
        }
    }

    fn path(id: &str) -> String {
        format!("v1/dataset/{id}")
    }

    fn get_query() -> &'static [(&'static str, &'static str)] {
        &[("includes", INCLUDES)]
    }

    fn kind(&self) -> Kind {
        if self.is_tabular() {
            Kind::Table
        } else {
            Kind::Dataset
        }
    }
}

fn resource_value(resource: Resource) -> Value {
    serde_json::to_value(resource).unwrap_or(Value::Null)
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}
