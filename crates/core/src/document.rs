//! JSON:API-style envelopes.
//!
//! Every api response wraps its payload in `{"data": ...}`. Single records
//! are [Resource]s, listings are [ListDocument]s.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record, as returned inside an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// The record id.
    #[serde(default)]
    pub id: String,

    /// The record type, e.g. `dataset` or `layer`.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,

    /// The attribute bag.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// A single-record envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<T> {
    /// The payload.
    pub data: T,
}

/// A listing envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDocument {
    /// This page of records.
    #[serde(default)]
    pub data: Vec<Resource>,

    /// Pagination links.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub links: Map<String, Value>,

    /// Listing metadata, e.g. `total-pages`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Resource {
    /// Creates a new resource.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::Resource;
    ///
    /// let resource = Resource::new("an-id", "dataset");
    /// assert!(resource.attributes.is_empty());
    /// ```
    pub fn new(id: impl ToString, r#type: impl ToString) -> Resource {
        Resource {
            id: id.to_string(),
            r#type: r#type.to_string(),
            attributes: Map::new(),
        }
    }

    /// Creates a resource from any JSON value that deserializes into one.
    pub fn from_value(value: Value) -> Result<Resource> {
        if value.is_object() {
            serde_json::from_value(value).map_err(Error::from)
        } else {
            Err(Error::NotAnObject(value))
        }
    }

    /// Removes an attribute holding an array of embedded resources.
    ///
    /// Missing or non-array attributes produce an empty vector. Array entries
    /// that are not resources are skipped.
    pub fn take_embedded(&mut self, key: &str) -> Vec<Resource> {
        match self.attributes.shift_remove(key) {
            Some(Value::Array(values)) => values
                .into_iter()
                .filter_map(|value| match Resource::from_value(value) {
                    Ok(resource) => Some(resource),
                    Err(err) => {
                        tracing::warn!("skipping embedded {key} record: {err}");
                        None
                    }
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                tracing::warn!("embedded {key} is not an array: {other}");
                Vec::new()
            }
        }
    }

    /// Returns a string attribute.
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

impl ListDocument {
    /// Returns true if the api indicated that another page exists.
    ///
    /// `meta.total-pages` is compared with the page that was requested when
    /// present; otherwise a `links.next` that differs from `links.self` means
    /// there is more.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::ListDocument;
    /// use serde_json::json;
    ///
    /// let page: ListDocument = serde_json::from_value(json!({
    ///     "data": [],
    ///     "meta": {"total-pages": 3}
    /// })).unwrap();
    /// assert!(page.has_next(1));
    /// assert!(!page.has_next(3));
    /// ```
    pub fn has_next(&self, page_number: usize) -> bool {
        if let Some(total_pages) = self.meta.get("total-pages").and_then(Value::as_u64) {
            return (page_number as u64) < total_pages;
        }
        match (
            self.links.get("next").and_then(Value::as_str),
            self.links.get("self").and_then(Value::as_str),
        ) {
            (Some(next), Some(this)) => next != this,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Extracts `data` from a JSON envelope.
///
/// # Examples
///
/// ```
/// use serde_json::json;
///
/// let data = rwapi::unwrap_data(json!({"data": {"id": "an-id"}})).unwrap();
/// assert_eq!(data["id"], "an-id");
/// ```
pub fn unwrap_data(value: Value) -> Result<Value> {
    match value {
        Value::Object(mut object) => object.remove("data").ok_or(Error::MissingField("data")),
        _ => Err(Error::NotAnObject(value)),
    }
}

/// Extracts a single [Resource] from a JSON envelope.
pub fn unwrap_resource(value: Value) -> Result<Resource> {
    let data = unwrap_data(value)?;
    match data {
        // Some endpoints wrap single records in a one-element array.
        Value::Array(mut values) if values.len() == 1 => Resource::from_value(values.remove(0)),
        Value::Array(_) => Err(Error::MissingField("data")),
        data => Resource::from_value(data),
    }
}

#[cfg(test)]
mod tests {
    use super::{ListDocument, Resource, unwrap_resource};
    use serde_json::json;

    #[test]
    fn take_embedded() {
        let mut resource: Resource = serde_json::from_value(json!({
            "id": "a-dataset",
            "type": "dataset",
            "attributes": {
                "name": "A dataset",
                "layer": [
                    {"id": "a-layer", "type": "layer", "attributes": {"name": "A layer"}},
                    "not a resource"
                ],
                "widget": null
            }
        }))
        .unwrap();
        let layers = resource.take_embedded("layer");
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].id, "a-layer");
        assert!(resource.take_embedded("widget").is_empty());
        assert!(resource.take_embedded("metadata").is_empty());
        assert!(!resource.attributes.contains_key("layer"));
        assert!(!resource.attributes.contains_key("widget"));
        assert_eq!(resource.str_attribute("name"), Some("A dataset"));
    }

    #[test]
    fn unwrap_single_and_one_element_array() {
        let resource = unwrap_resource(json!({"data": {"id": "a"}})).unwrap();
        assert_eq!(resource.id, "a");
        let resource = unwrap_resource(json!({"data": [{"id": "b"}]})).unwrap();
        assert_eq!(resource.id, "b");
        let _ = unwrap_resource(json!({"data": []})).unwrap_err();
        let _ = unwrap_resource(json!({"errors": []})).unwrap_err();
    }

    #[test]
    fn has_next_from_links() {
        let page: ListDocument = serde_json::from_value(json!({
            "data": [],
            "links": {
                "self": "https://api.resourcewatch.org/v1/dataset?page[number]=2",
                "next": "https://api.resourcewatch.org/v1/dataset?page[number]=2"
            }
        }))
        .unwrap();
        assert!(!page.has_next(2));

        let page: ListDocument = serde_json::from_value(json!({
            "data": [],
            "links": {"next": "https://api.resourcewatch.org/v1/dataset?page[number]=3"}
        }))
        .unwrap();
        assert!(page.has_next(2));

        assert!(!ListDocument::default().has_next(1));
    }
}
