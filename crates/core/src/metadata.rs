use crate::{Client, Resource, Result, attributes, document::unwrap_resource};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// The language used when none is given.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Descriptive metadata for a dataset, in one application and language.
///
/// The server keys metadata by `(dataset, application, language)`, so
/// updates and deletes address it by those rather than by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// The metadata id.
    pub id: String,

    /// The id of the dataset this metadata describes.
    pub dataset: String,

    /// The attribute bag.
    pub attributes: Map<String, Value>,
}

impl Metadata {
    /// Builds metadata from an envelope resource.
    ///
    /// `dataset_id` is used when the resource itself doesn't name its dataset.
    pub fn from_resource(resource: Resource, dataset_id: &str) -> Metadata {
        let dataset = resource
            .str_attribute("dataset")
            .unwrap_or(dataset_id)
            .to_string();
        Metadata {
            id: resource.id,
            dataset,
            attributes: resource.attributes,
        }
    }

    /// Converts this metadata to an envelope resource.
    pub fn to_resource(&self) -> Resource {
        Resource {
            id: self.id.clone(),
            r#type: "metadata".to_string(),
            attributes: self.attributes.clone(),
        }
    }

    /// Creates metadata for a dataset.
    ///
    /// `application` defaults to the client's first application, `language`
    /// to [DEFAULT_LANGUAGE].
    pub async fn create(
        client: &Client,
        dataset_id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Metadata> {
        let mut attributes = attributes.clone();
        if !attributes.contains_key("application") {
            let _ = attributes.insert(
                "application".to_string(),
                default_application(client).into(),
            );
        }
        if !attributes.contains_key("language") {
            let _ = attributes.insert("language".to_string(), DEFAULT_LANGUAGE.into());
        }
        let value = client
            .post(&format!("v1/dataset/{dataset_id}/metadata"), &attributes)
            .await?;
        let metadata = Metadata::from_resource(unwrap_resource(value)?, dataset_id);
        tracing::info!("created metadata {} on dataset {dataset_id}", metadata.id);
        Ok(metadata)
    }

    /// Returns this metadata's application.
    pub fn application(&self) -> Option<&str> {
        attributes::str_value(&self.attributes, "application")
    }

    /// Returns this metadata's language.
    pub fn language(&self) -> Option<&str> {
        attributes::str_value(&self.attributes, "language")
    }

    /// Returns the attributes that can be sent back to create a copy.
    ///
    /// Server-managed keys and the `dataset` and `resource` references are removed.
    pub fn writable_attributes(&self) -> Map<String, Value> {
        let mut attributes = attributes::writable(&self.attributes, None);
        let _ = attributes.shift_remove("dataset");
        let _ = attributes.shift_remove("resource");
        attributes
    }

    /// Updates this metadata on the server.
    pub async fn update(&mut self, client: &Client, attributes: &Map<String, Value>) -> Result<()> {
        let mut attributes = attributes.clone();
        let _ = attributes.insert("application".to_string(), self.application_or_default(client).into());
        let _ = attributes.insert("language".to_string(), self.language_or_default().into());
        let value = client
            .patch(&format!("v1/dataset/{}/metadata", self.dataset), &attributes)
            .await?;
        *self = Metadata::from_resource(unwrap_resource(value)?, &self.dataset);
        Ok(())
    }

    /// Deletes this metadata.
    pub async fn delete(self, client: &Client) -> Result<()> {
        let query = [
            ("application", self.application_or_default(client)),
            ("language", self.language_or_default()),
        ];
        let _ = client
            .delete_with_query(&format!("v1/dataset/{}/metadata", self.dataset), &query)
            .await?;
        tracing::info!("deleted metadata {} of dataset {}", self.id, self.dataset);
        Ok(())
    }

    fn application_or_default<'a>(&'a self, client: &'a Client) -> &'a str {
        self.application()
            .unwrap_or_else(|| default_application(client))
    }

    fn language_or_default(&self) -> &str {
        self.language().unwrap_or(DEFAULT_LANGUAGE)
    }
}

fn default_application(client: &Client) -> &str {
    client
        .config()
        .application
        .first()
        .map(String::as_str)
        .unwrap_or("rw")
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}
