use crate::{Client, Resource, Result};
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

/// A named set of tags attached to a dataset for one application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    /// The vocabulary name, e.g. `knowledge_graph`.
    pub name: String,

    /// The id of the tagged dataset.
    pub dataset: String,

    /// The application the tags belong to.
    pub application: String,

    /// The tags.
    pub tags: Vec<String>,
}

impl Vocabulary {
    /// Builds a vocabulary from an envelope resource.
    ///
    /// The name is taken from `attributes.name`, falling back to the resource id.
    pub fn from_resource(resource: Resource, dataset_id: &str) -> Vocabulary {
        let name = resource
            .str_attribute("name")
            .unwrap_or(resource.id.as_str())
            .to_string();
        let application = resource
            .str_attribute("application")
            .unwrap_or_default()
            .to_string();
        let tags = resource
            .attributes
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Vocabulary {
            name,
            dataset: dataset_id.to_string(),
            application,
            tags,
        }
    }

    /// Converts this vocabulary to an envelope resource.
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(&self.name, "vocabulary");
        let _ = resource
            .attributes
            .insert("name".to_string(), self.name.clone().into());
        let _ = resource
            .attributes
            .insert("application".to_string(), self.application.clone().into());
        let _ = resource
            .attributes
            .insert("tags".to_string(), self.tags.clone().into());
        resource
    }

    /// Tags a dataset.
    ///
    /// A successful create may answer with no records, in which case the
    /// returned vocabulary is built from the request.
    pub async fn create(
        client: &Client,
        dataset_id: &str,
        name: &str,
        tags: Vec<String>,
        application: &str,
    ) -> Result<Vocabulary> {
        let body = json!({"tags": tags, "application": application});
        let _ = client.post(&path(dataset_id, name), &body).await?;
        tracing::info!("created vocabulary {name} on dataset {dataset_id}");
        Ok(Vocabulary {
            name: name.to_string(),
            dataset: dataset_id.to_string(),
            application: application.to_string(),
            tags,
        })
    }

    /// Replaces this vocabulary's tags.
    pub async fn update(&mut self, client: &Client, tags: Vec<String>) -> Result<()> {
        let body = json!({"tags": tags, "application": self.application});
        let _ = client
            .patch(&path(&self.dataset, &self.name), &body)
            .await?;
        self.tags = tags;
        Ok(())
    }

    /// Deletes this vocabulary.
    pub async fn delete(self, client: &Client) -> Result<()> {
        let _ = client
            .delete_with_query(
                &path(&self.dataset, &self.name),
                &[("application", &self.application)],
            )
            .await?;
        tracing::info!("deleted vocabulary {} of dataset {}", self.name, self.dataset);
        Ok(())
    }
}

fn path(dataset_id: &str, name: &str) -> String {
    format!("v1/dataset/{dataset_id}/vocabulary/{name}")
}

impl Serialize for Vocabulary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::Vocabulary;
    use crate::{Client, Config, Error, Resource, Server};
    use mockito::{Matcher, Server as MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> Client {
        let config = Config::new().with_server(Server::Custom(server.url().parse().unwrap()));
        Client::new(config).unwrap().with_token("a-token")
    }

    fn vocabulary() -> Vocabulary {
        Vocabulary {
            name: "knowledge_graph".to_string(),
            dataset: "a-dataset".to_string(),
            application: "rw".to_string(),
            tags: vec!["forest".to_string()],
        }
    }

    #[test]
    fn name_falls_back_to_id() {
        let mut resource = Resource::new("knowledge_graph", "vocabulary");
        let _ = resource
            .attributes
            .insert("tags".to_string(), json!(["forest", 42, "loss"]));
        let vocabulary = Vocabulary::from_resource(resource, "a-dataset");
        assert_eq!(vocabulary.name, "knowledge_graph");
        assert_eq!(vocabulary.tags, vec!["forest", "loss"]);
        assert_eq!(
            Vocabulary::from_resource(vocabulary.to_resource(), "a-dataset"),
            vocabulary
        );
    }

    #[tokio::test]
    async fn update() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("PATCH", "/v1/dataset/a-dataset/vocabulary/knowledge_graph")
            .match_body(Matcher::Json(json!({"tags": ["forest", "gain"], "application": "rw"})))
            .with_body(json!({"data": []}).to_string())
            .create_async()
            .await;
        let mut vocabulary = vocabulary();
        vocabulary
            .update(&client(&server), vec!["forest".to_string(), "gain".to_string()])
            .await
            .unwrap();
        assert_eq!(vocabulary.tags, vec!["forest", "gain"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_requires_token() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("DELETE", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let config = Config::new().with_server(Server::Custom(server.url().parse().unwrap()));
        let client = Client::new(config).unwrap();
        let error = vocabulary().delete(&client).await.unwrap_err();
        assert!(matches!(error, Error::MissingToken));
        mock.assert_async().await;
    }
}
