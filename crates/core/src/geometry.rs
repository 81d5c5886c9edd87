use crate::{Client, Error, Resource, Result, document::unwrap_resource};
use geojson::GeoJson;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

/// A geometry registered with the geostore service.
///
/// Geometries are only carried and referenced by id; no spatial operations
/// happen locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// The geostore id, which is also the geometry's hash.
    pub id: String,

    /// The geometry, usually a feature collection.
    pub geojson: GeoJson,

    /// The bounding box, `[xmin, ymin, xmax, ymax]`.
    pub bbox: Option<Vec<f64>>,

    /// The area in hectares.
    pub area_ha: Option<f64>,

    /// The geostore hash.
    pub hash: Option<String>,

    /// Any other geostore attributes, e.g. `info` or `provider`.
    pub attributes: Map<String, Value>,
}

impl Geometry {
    /// Creates a local geometry that has not been sent to the geostore.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::Geometry;
    /// use serde_json::json;
    ///
    /// let geometry = Geometry::new("an-id", json!({"type": "Point", "coordinates": [0.0, 0.0]})).unwrap();
    /// assert!(geometry.bbox.is_none());
    /// ```
    pub fn new(id: impl ToString, geojson: Value) -> Result<Geometry> {
        Ok(Geometry {
            id: id.to_string(),
            geojson: GeoJson::from_json_value(geojson).map_err(Box::new)?,
            bbox: None,
            area_ha: None,
            hash: None,
            attributes: Map::new(),
        })
    }

    /// Registers a geometry with the geostore.
    ///
    /// Doesn't require a token.
    pub async fn create(client: &Client, geojson: &GeoJson) -> Result<Geometry> {
        let value = client
            .post_public("v1/geostore", &json!({"geojson": geojson}))
            .await?;
        let geometry = Geometry::from_resource(unwrap_resource(value)?)?;
        tracing::info!("created geostore {}", geometry.id);
        Ok(geometry)
    }

    /// Gets a geostore by id.
    pub async fn get(client: &Client, id: &str) -> Result<Geometry> {
        let value = client.get(&format!("v1/geostore/{id}")).await?;
        Geometry::from_resource(unwrap_resource(value)?)
    }

    /// Builds a geometry from a geostore resource.
    pub fn from_resource(mut resource: Resource) -> Result<Geometry> {
        let geojson = resource
            .attributes
            .shift_remove("geojson")
            .ok_or(Error::MissingField("geojson"))?;
        let geojson = GeoJson::from_json_value(geojson).map_err(Box::new)?;
        let bbox = resource
            .attributes
            .shift_remove("bbox")
            .and_then(|bbox| serde_json::from_value(bbox).ok());
        let area_ha = resource
            .attributes
            .shift_remove("areaHa")
            .and_then(|area| area.as_f64());
        let hash = match resource.attributes.shift_remove("hash") {
            Some(Value::String(hash)) => Some(hash),
            _ => None,
        };
        Ok(Geometry {
            id: resource.id,
            geojson,
            bbox,
            area_ha,
            hash,
            attributes: resource.attributes,
        })
    }

    /// Converts this geometry back to a geostore resource.
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(&self.id, "geoStore");
        let mut attributes = Map::new();
        let _ = attributes.insert(
            "geojson".to_string(),
            serde_json::to_value(&self.geojson).unwrap_or(Value::Null),
        );
        if let Some(bbox) = &self.bbox {
            let _ = attributes.insert("bbox".to_string(), bbox.clone().into());
        }
        if let Some(area_ha) = self.area_ha {
            let _ = attributes.insert("areaHa".to_string(), area_ha.into());
        }
        if let Some(hash) = &self.hash {
            let _ = attributes.insert("hash".to_string(), hash.clone().into());
        }
        attributes.extend(self.attributes.clone());
        resource.attributes = attributes;
        resource
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_resource().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::Geometry;
    use crate::{Client, Config, Server};
    use geojson::GeoJson;
    use mockito::{Matcher, Server as MockServer};
    use serde_json::{Value, json};

    fn geostore() -> Value {
        json!({
            "data": {
                "type": "geoStore",
                "id": "c7f9d8",
                "attributes": {
                    "geojson": {
                        "type": "FeatureCollection",
                        "features": [{
                            "type": "Feature",
                            "properties": null,
                            "geometry": {"type": "Point", "coordinates": [-60.0, -3.0]}
                        }]
                    },
                    "hash": "c7f9d8",
                    "provider": {},
                    "areaHa": 0.0,
                    "bbox": [-60.0, -3.0, -60.0, -3.0],
                    "lock": false
                }
            }
        })
    }

    fn client(server: &MockServer) -> Client {
        let config = Config::new().with_server(Server::Custom(server.url().parse().unwrap()));
        Client::new(config).unwrap()
    }

    #[tokio::test]
    async fn create_without_token() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("POST", "/v1/geostore")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::PartialJson(json!({
                "geojson": {"type": "Point", "coordinates": [-60.0, -3.0]}
            })))
            .with_body(geostore().to_string())
            .create_async()
            .await;
        let geojson: GeoJson = r#"{"type": "Point", "coordinates": [-60.0, -3.0]}"#.parse().unwrap();
        let geometry = Geometry::create(&client(&server), &geojson).await.unwrap();
        assert_eq!(geometry.id, "c7f9d8");
        assert_eq!(geometry.hash.as_deref(), Some("c7f9d8"));
        assert_eq!(geometry.bbox, Some(vec![-60.0, -3.0, -60.0, -3.0]));
        assert_eq!(geometry.area_ha, Some(0.0));
        assert!(geometry.attributes.contains_key("lock"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get() {
        let mut server = MockServer::new_async().await;
        let _mock = server
            .mock("GET", "/v1/geostore/c7f9d8")
            .with_body(geostore().to_string())
            .create_async()
            .await;
        let geometry = Geometry::get(&client(&server), "c7f9d8").await.unwrap();
        assert!(matches!(geometry.geojson, GeoJson::FeatureCollection(_)));
        let resource = geometry.to_resource();
        assert_eq!(resource.attributes["bbox"], json!([-60.0, -3.0, -60.0, -3.0]));
    }

    #[test]
    fn invalid_geojson() {
        let _ = Geometry::new("an-id", json!({"type": "Nope"})).unwrap_err();
    }
}
