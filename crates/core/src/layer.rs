use crate::{
    Client, CloneOptions, Dataset, Error, Kind, Record, Resource, Result,
    attributes::{self, str_value},
    entity::{create_child, delete_child, update_child},
};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use url::Url;

/// A map layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    /// The layer id.
    pub id: String,

    /// The attribute bag.
    pub attributes: Map<String, Value>,
}

impl Layer {
    /// Creates a new, empty layer.
    pub fn new(id: impl ToString) -> Layer {
        Layer {
            id: id.to_string(),
            attributes: Map::new(),
        }
    }

    /// Creates a layer under a dataset.
    pub async fn create(
        client: &Client,
        dataset_id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<Layer> {
        let resource = create_child(client, dataset_id, "layer", attributes).await?;
        tracing::info!("created layer {} on dataset {dataset_id}", resource.id);
        Layer::from_resource(resource)
    }

    /// Returns this layer's name.
    pub fn name(&self) -> Option<&str> {
        str_value(&self.attributes, "name")
    }

    /// Returns the id of this layer's dataset.
    pub fn dataset_id(&self) -> Option<&str> {
        str_value(&self.attributes, "dataset")
    }

    /// Returns this layer's provider, e.g. `cartodb`, `gee`, or `leaflet`.
    pub fn provider(&self) -> Option<&str> {
        str_value(&self.attributes, "provider")
    }

    /// Returns this layer's `layerConfig`.
    pub fn layer_config(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("layerConfig").and_then(Value::as_object)
    }

    /// Returns this layer's `legendConfig`.
    pub fn legend_config(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("legendConfig").and_then(Value::as_object)
    }

    fn require_dataset_id(&self) -> Result<&str> {
        self.dataset_id().ok_or(Error::MissingField("dataset"))
    }

    /// Fetches this layer's dataset.
    pub async fn dataset(&self, client: &Client) -> Result<Dataset> {
        Dataset::get(client, self.require_dataset_id()?).await
    }

    /// Fetches this layer again.
    pub async fn refresh(&mut self, client: &Client) -> Result<()> {
        *self = Layer::get(client, &self.id).await?;
        Ok(())
    }

    /// Updates this layer's attributes on the server.
    pub async fn update(&mut self, client: &Client, attributes: &Map<String, Value>) -> Result<()> {
        let dataset_id = self.require_dataset_id()?.to_string();
        let resource = update_child(client, &dataset_id, "layer", &self.id, attributes).await?;
        *self = Layer::from_resource(resource)?;
        Ok(())
    }

    /// Deletes this layer.
    pub async fn delete(self, client: &Client) -> Result<()> {
        delete_child(client, self.require_dataset_id()?, "layer", &self.id).await
    }

    /// Creates a copy of this layer.
    ///
    /// The copy is created under `dataset_id`, or under this layer's own
    /// dataset if `dataset_id` is `None`.
    pub async fn clone_layer(
        &self,
        client: &Client,
        options: &CloneOptions,
        dataset_id: Option<&str>,
    ) -> Result<Layer> {
        let dataset_id = match dataset_id {
            Some(dataset_id) => dataset_id,
            None => self.require_dataset_id()?,
        };
        self.clone_into(client, dataset_id, options).await
    }

    pub(crate) async fn clone_into(
        &self,
        client: &Client,
        dataset_id: &str,
        options: &CloneOptions,
    ) -> Result<Layer> {
        let mut attributes = attributes::writable(&self.attributes, None);
        let _ = attributes.shift_remove("dataset");
        options.apply(&mut attributes);
        let clone = Layer::create(client, dataset_id, &attributes).await?;
        tracing::info!("cloned layer {} to {}", self.id, clone.id);
        Ok(clone)
    }

    /// Copies this layer's attributes onto another layer, returning the updated target.
    ///
    /// If `keys` is given, only those attributes are copied. The target keeps
    /// its own dataset.
    pub async fn merge_into(
        &self,
        client: &Client,
        target_id: &str,
        keys: Option<&[String]>,
    ) -> Result<Layer> {
        let mut target = Layer::get(client, target_id).await?;
        let mut attributes = attributes::writable(&self.attributes, keys);
        let _ = attributes.shift_remove("dataset");
        target.update(client, &attributes).await?;
        tracing::info!("merged layer {} into {}", self.id, target_id);
        Ok(target)
    }

    /// Returns a `{z}/{x}/{y}` tile url template for this layer.
    ///
    /// - `gee` layers are tiled by the api itself.
    /// - `cartodb` layers are instantiated as an anonymous carto map from
    ///   their `layerConfig`, which costs one request.
    /// - `leaflet` layers carry their url in `layerConfig.body.url` or `layerConfig.url`.
    pub async fn parse_map_url(&self, client: &Client) -> Result<String> {
        let provider = self.provider().unwrap_or_default().to_ascii_lowercase();
        match provider.as_str() {
            "gee" => Ok(format!(
                "{}v1/layer/{}/tile/gee/{{z}}/{{x}}/{{y}}",
                client.root(),
                self.id
            )),
            "cartodb" => self.carto_tile_url(client).await,
            "leaflet" => self
                .layer_config()
                .and_then(|config| {
                    config
                        .get("body")
                        .and_then(|body| body.get("url"))
                        .or_else(|| config.get("url"))
                })
                .and_then(Value::as_str)
                .map(|url| url.to_string())
                .ok_or(Error::MissingField("url")),
            _ => Err(Error::UnsupportedProvider(provider)),
        }
    }

    async fn carto_tile_url(&self, client: &Client) -> Result<String> {
        let config = self
            .layer_config()
            .ok_or(Error::MissingField("layerConfig"))?;
        let account = config
            .get("account")
            .and_then(Value::as_str)
            .ok_or(Error::MissingField("account"))?;
        let body = config
            .get("body")
            .cloned()
            .unwrap_or_else(|| Value::Object(config.clone()));
        let body = carto_map_config(body);
        let host = client.config().carto_url(account);
        let url = Url::parse(&format!("{host}/api/v1/map"))?;
        let response = client.post_external(url, &body).await?;
        let layergroupid = response
            .get("layergroupid")
            .and_then(Value::as_str)
            .ok_or(Error::MissingField("layergroupid"))?;
        Ok(format!(
            "{host}/api/v1/map/{layergroupid}/{{z}}/{{x}}/{{y}}.png"
        ))
    }
}

/// Turns a layer's `layerConfig.body` into a carto map config.
///
/// Layer bodies store carto layers as `{"layers": [...]}` with rw-specific
/// extras; carto wants `{"version", "layers"}` with `type: "mapnik"`.
fn carto_map_config(body: Value) -> Value {
    let layers = body
        .get("layers")
        .and_then(Value::as_array)
        .map(|layers| {
            layers
                .iter()
                .map(|layer| {
                    let options = layer.get("options").cloned().unwrap_or_else(|| json!({}));
                    json!({"type": "mapnik", "options": options})
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    json!({"version": "1.3.0", "layers": layers})
}

impl Record for Layer {
    const KIND: Kind = Kind::Layer;

    fn from_resource(resource: Resource) -> Result<Layer> {
        Ok(Layer {
            id: resource.id,
            attributes: resource.attributes,
        })
    }

    fn to_resource(&self) -> Resource {
        Resource {
            id: self.id.clone(),
            r#type: "layer".to_string(),
            attributes: self.attributes.clone(),
        }
    }

    fn path(id: &str) -> String {
        format!("v1/layer/{id}")
    }
}

impl Serialize for Layer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::Layer;
    use crate::{Client, CloneOptions, Config, Error, Record, Server};
    use mockito::{Matcher, Server as MockServer};
    use serde_json::{Value, json};

    fn client(server: &MockServer) -> Client {
        let config = Config::new()
            .with_server(Server::Custom(server.url().parse().unwrap()))
            .with_carto_host(server.url());
        Client::new(config).unwrap().with_token("a-token")
    }

    fn layer(value: Value) -> Layer {
        Layer::from_resource(serde_json::from_value(value).unwrap()).unwrap()
    }

    fn carto_layer() -> Layer {
        layer(json!({
            "id": "layer-a",
            "type": "layer",
            "attributes": {
                "name": "Loss layer",
                "dataset": "a-dataset",
                "provider": "cartodb",
                "layerConfig": {
                    "account": "wri-01",
                    "body": {
                        "layers": [{
                            "type": "cartodb",
                            "options": {"sql": "SELECT * FROM loss", "cartocss": "#layer {}"}
                        }]
                    }
                }
            }
        }))
    }

    #[tokio::test]
    async fn gee_tile_url() {
        let client = Client::new(Config::new()).unwrap();
        let layer = layer(json!({
            "id": "layer-b",
            "attributes": {"provider": "gee"}
        }));
        assert_eq!(
            layer.parse_map_url(&client).await.unwrap(),
            "https://api.resourcewatch.org/v1/layer/layer-b/tile/gee/{z}/{x}/{y}"
        );
    }

    #[tokio::test]
    async fn leaflet_tile_url() {
        let client = Client::new(Config::new()).unwrap();
        let layer = layer(json!({
            "id": "a-layer",
            "attributes": {
                "provider": "leaflet",
                "layerConfig": {"body": {"url": "https://tiles.example.com/{z}/{x}/{y}.png"}}
            }
        }));
        assert_eq!(
            layer.parse_map_url(&client).await.unwrap(),
            "https://tiles.example.com/{z}/{x}/{y}.png"
        );
    }

    #[tokio::test]
    async fn carto_tile_url() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/map")
            .match_body(Matcher::Json(json!({
                "version": "1.3.0",
                "layers": [{
                    "type": "mapnik",
                    "options": {"sql": "SELECT * FROM loss", "cartocss": "#layer {}"}
                }]
            })))
            .match_header("authorization", Matcher::Missing)
            .with_body(json!({"layergroupid": "abc123"}).to_string())
            .create_async()
            .await;
        let client = client(&server);
        let url = carto_layer().parse_map_url(&client).await.unwrap();
        assert_eq!(url, format!("{}/api/v1/map/abc123/{{z}}/{{x}}/{{y}}.png", server.url()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unsupported_provider() {
        let client = Client::new(Config::new()).unwrap();
        let layer = layer(json!({"id": "a-layer", "attributes": {"provider": "wms"}}));
        assert!(matches!(
            layer.parse_map_url(&client).await.unwrap_err(),
            Error::UnsupportedProvider(provider) if provider == "wms"
        ));
    }

    #[tokio::test]
    async fn lazy_dataset() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("GET", "/v1/dataset/a-dataset")
            .match_query(Matcher::Any)
            .with_body(json!({"data": {"id": "a-dataset", "type": "dataset", "attributes": {}}}).to_string())
            .create_async()
            .await;
        let dataset = carto_layer().dataset(&client(&server)).await.unwrap();
        assert_eq!(dataset.id, "a-dataset");
        mock.assert_async().await;
        assert!(matches!(
            Layer::new("orphan").dataset(&client(&server)).await.unwrap_err(),
            Error::MissingField("dataset")
        ));
    }

    #[tokio::test]
    async fn clone_into_own_dataset() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("POST", "/v1/dataset/a-dataset/layer")
            .match_body(Matcher::PartialJson(json!({"name": "Loss layer (clone)", "provider": "cartodb"})))
            .with_body(json!({"data": {"id": "layer-c", "type": "layer", "attributes": {"dataset": "a-dataset"}}}).to_string())
            .create_async()
            .await;
        let clone = carto_layer()
            .clone_layer(&client(&server), &CloneOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(clone.id, "layer-c");
        assert_eq!(clone.dataset_id(), Some("a-dataset"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn merge_into_keeps_target_dataset() {
        let layer_config = carto_layer().attributes["layerConfig"].clone();
        let mut server = MockServer::new_async().await;
        let _get = server
            .mock("GET", "/v1/layer/target")
            .with_body(json!({"data": {"id": "target", "type": "layer", "attributes": {"dataset": "other-dataset"}}}).to_string())
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/v1/dataset/other-dataset/layer/target")
            .match_body(Matcher::Json(json!({ "layerConfig": layer_config })))
            .with_body(json!({"data": {"id": "target", "type": "layer", "attributes": {"dataset": "other-dataset", "name": "Target"}}}).to_string())
            .create_async()
            .await;
        let target = carto_layer()
            .merge_into(&client(&server), "target", Some(&["layerConfig".to_string()]))
            .await
            .unwrap();
        assert_eq!(target.dataset_id(), Some("other-dataset"));
        assert_eq!(target.name(), Some("Target"));
        patch.assert_async().await;
    }
}
