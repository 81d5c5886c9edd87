use crate::{
    Client, CloneOptions, Dataset, Error, Kind, Record, Resource, Result,
    attributes::{self, replace_strings, str_value},
    entity::{create_child, delete_child, update_child},
};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A chart or other visualization of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    /// The widget id.
    pub id: String,

    /// The attribute bag.
    pub attributes: Map<String, Value>,
}

impl Widget {
    /// Creates a new, empty widget.
    pub fn new(id: impl ToString) -> Widget {
        Widget {
            id: id.to_string(),
            attributes: Map::new(),
        }
    }

    /// Creates a widget under a dataset.
    pub async fn create(
        client: &Client,
        dataset_id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Widget> {
        let resource = create_child(client, dataset_id, "widget", attributes).await?;
        tracing::info!("created widget {} on dataset {dataset_id}", resource.id);
        Widget::from_resource(resource)
    }

    /// Returns this widget's name.
    pub fn name(&self) -> Option<&str> {
        str_value(&self.attributes, "name")
    }

    /// Returns the id of this widget's dataset.
    pub fn dataset_id(&self) -> Option<&str> {
        str_value(&self.attributes, "dataset")
    }

    /// Returns this widget's `widgetConfig`, usually a vega spec.
    pub fn widget_config(&self) -> Option<&Value> {
        self.attributes.get("widgetConfig")
    }

    fn require_dataset_id(&self) -> Result<&str> {
        self.dataset_id().ok_or(Error::MissingField("dataset"))
    }

    /// Fetches this widget's dataset.
    pub async fn dataset(&self, client: &Client) -> Result<Dataset> {
        Dataset::get(client, self.require_dataset_id()?).await
    }

    /// Fetches this widget again.
    pub async fn refresh(&mut self, client: &Client) -> Result<()> {
        *self = Widget::get(client, &self.id).await?;
        Ok(())
    }

    /// Updates this widget's attributes on the server.
    pub async fn update(&mut self, client: &Client, attributes: &Map<String, Value>) -> Result<()> {
        let dataset_id = self.require_dataset_id()?.to_string();
        let resource = update_child(client, &dataset_id, "widget", &self.id, attributes).await?;
        *self = Widget::from_resource(resource)?;
        Ok(())
    }

    /// Deletes this widget.
    pub async fn delete(self, client: &Client) -> Result<()> {
        delete_child(client, self.require_dataset_id()?, "widget", &self.id).await
    }

    /// Creates a copy of this widget.
    ///
    /// The copy is created under `dataset_id`, or under this widget's own
    /// dataset if `dataset_id` is `None`.
    pub async fn clone_widget(
        &self,
        client: &Client,
        options: &CloneOptions,
        dataset_id: Option<&str>,
    ) -> Result<Widget> {
        let dataset_id = match dataset_id {
            Some(dataset_id) => dataset_id,
            None => self.require_dataset_id()?,
        };
        self.clone_into(client, dataset_id, options, &[]).await
    }

    /// Clones this widget under `dataset_id`, rewriting every string in its
    /// attributes with `replacements`.
    pub(crate) async fn clone_into(
        &self,
        client: &Client,
        dataset_id: &str,
        options: &CloneOptions,
        replacements: &[(String, String)],
    ) -> Result<Widget> {
        let mut attributes = self.rewritten_attributes(None, replacements)?;
        options.apply(&mut attributes);
        let clone = Widget::create(client, dataset_id, &attributes).await?;
        tracing::info!("cloned widget {} to {}", self.id, clone.id);
        Ok(clone)
    }

    /// Copies this widget's attributes onto another widget, returning the updated target.
    ///
    /// If `keys` is given, only those attributes are copied. The target keeps
    /// its own dataset.
    pub async fn merge_into(
        &self,
        client: &Client,
        target_id: &str,
        keys: Option<&[String]>,
    ) -> Result<Widget> {
        self.merge_into_with(client, target_id, keys, &[]).await
    }

    /// Merges this widget into another, rewriting every string in the copied
    /// attributes with `replacements`.
    pub(crate) async fn merge_into_with(
        &self,
        client: &Client,
        target_id: &str,
        keys: Option<&[String]>,
        replacements: &[(String, String)],
    ) -> Result<Widget> {
        let mut target = Widget::get(client, target_id).await?;
        let attributes = self.rewritten_attributes(keys, replacements)?;
        target.update(client, &attributes).await?;
        tracing::info!("merged widget {} into {}", self.id, target_id);
        Ok(target)
    }

    fn rewritten_attributes(
        &self,
        keys: Option<&[String]>,
        replacements: &[(String, String)],
    ) -> Result<Map<String, Value>> {
        let mut attributes = attributes::writable(&self.attributes, keys);
        let _ = attributes.shift_remove("dataset");
        let mut value = Value::Object(attributes);
        replace_strings(&mut value, replacements);
        match value {
            Value::Object(attributes) => Ok(attributes),
            value => Err(Error::NotAnObject(value)),
        }
    }
}

impl Record for Widget {
    const KIND: Kind = Kind::Widget;

    fn from_resource(resource: Resource) -> Result<Widget> {
        Ok(Widget {
            id: resource.id,
            attributes: resource.attributes,
        })
    }

    fn to_resource(&self) -> Resource {
        Resource {
            id: self.id.clone(),
            r#type: "widget".to_string(),
            attributes: self.attributes.clone(),
        }
    }

    fn path(id: &str) -> String {
        format!("v1/widget/{id}")
    }
}

impl Serialize for Widget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}
