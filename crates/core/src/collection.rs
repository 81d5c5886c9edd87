//! Searching across datasets, layers, and widgets.
//!
//! A search pages through every dataset visible to the client's
//! applications, flattens each one into itself plus its layers and widgets,
//! and then filters, orders, and truncates the result locally. The local
//! stages live on [SearchParams::apply] so they can be used without a server.

use crate::{
    Client, Dataset, Entity, Kind, ListDocument, Record, Result,
    attributes::contains_ignore_case, dataset::INCLUDES,
};
use async_stream::try_stream;
use futures::{Stream, TryStreamExt, pin_mut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::HashSet,
    path::{Path, PathBuf},
};

/// The attribute searches are ordered by when none is given.
pub const DEFAULT_ORDER: &str = "name";

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smallest first.
    #[default]
    Asc,

    /// Largest first.
    Desc,
}

/// Parameters for [Collection::search].
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Free-text terms, matched against `name`, `description`, and `slug`.
    ///
    /// An entity matches if any term matches.
    pub terms: Vec<String>,

    /// The kinds to keep. Empty keeps every kind.
    pub kinds: Vec<Kind>,

    /// Overrides the client's application filter.
    pub application: Option<Vec<String>>,

    /// Overrides the client's environment.
    pub environment: Option<String>,

    /// Attributes that must equal the given values.
    pub filters: Vec<(String, Value)>,

    /// The attribute to order by, [DEFAULT_ORDER] if not set.
    pub order: Option<String>,

    /// The order direction.
    pub direction: Direction,

    /// The maximum number of entities to return.
    pub limit: Option<usize>,

    /// Overrides the client's page size.
    pub page_size: Option<usize>,
}

impl SearchParams {
    /// Creates empty search parameters, which match everything.
    pub fn new() -> SearchParams {
        SearchParams::default()
    }

    /// Adds a search term.
    pub fn term(mut self, term: impl ToString) -> SearchParams {
        self.terms.push(term.to_string());
        self
    }

    /// Adds a kind to keep.
    pub fn kind(mut self, kind: Kind) -> SearchParams {
        self.kinds.push(kind);
        self
    }

    /// Adds an attribute filter.
    pub fn filter(mut self, key: impl ToString, value: impl Into<Value>) -> SearchParams {
        self.filters.push((key.to_string(), value.into()));
        self
    }

    /// Sets the order attribute and direction.
    pub fn order(mut self, order: impl ToString, direction: Direction) -> SearchParams {
        self.order = Some(order.to_string());
        self.direction = direction;
        self
    }

    /// Sets the limit.
    pub fn limit(mut self, limit: usize) -> SearchParams {
        self.limit = Some(limit);
        self
    }

    /// Returns true if an entity passes the kind, term, and attribute filters.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::{Entity, Kind, Layer, SearchParams};
    ///
    /// let mut layer = Layer::new("a-layer");
    /// let _ = layer.attributes.insert("name".into(), "Tree Cover Loss".into());
    /// let entity = Entity::from(layer);
    /// assert!(SearchParams::new().term("cover").matches(&entity));
    /// assert!(!SearchParams::new().kind(Kind::Widget).matches(&entity));
    /// ```
    pub fn matches(&self, entity: &Entity) -> bool {
        self.matches_kind(entity) && self.matches_terms(entity) && self.matches_filters(entity)
    }

    fn matches_kind(&self, entity: &Entity) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|kind| kind.accepts(entity.kind()))
    }

    fn matches_terms(&self, entity: &Entity) -> bool {
        let text = |key: &str| entity.attribute(key).and_then(Value::as_str);
        self.terms.is_empty()
            || self.terms.iter().any(|term| {
                contains_ignore_case(text("name"), term)
                    || contains_ignore_case(text("description"), term)
                    || contains_ignore_case(text("slug"), term)
            })
    }

    fn matches_filters(&self, entity: &Entity) -> bool {
        self.filters
            .iter()
            .all(|(key, value)| entity.attribute(key) == Some(value))
    }

    /// Filters, deduplicates, orders, and truncates entities.
    ///
    /// Duplicates share a kind and id; the first one wins. Ordering is
    /// stable, and entities without the order attribute always sort last.
    pub fn apply(&self, entities: Vec<Entity>) -> Vec<Entity> {
        let mut seen = HashSet::new();
        let mut entities: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| self.matches(entity))
            .filter(|entity| seen.insert((entity.kind(), entity.id().to_string())))
            .collect();
        let order = self.order.as_deref().unwrap_or(DEFAULT_ORDER);
        entities.sort_by(|a, b| {
            compare_attribute(a.attribute(order), b.attribute(order), self.direction)
        });
        if let Some(limit) = self.limit {
            entities.truncate(limit);
        }
        entities
    }
}

fn compare_attribute(l: Option<&Value>, r: Option<&Value>, direction: Direction) -> Ordering {
    match (l, r) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), Some(_)) => Ordering::Greater,
        (Some(_), None | Some(Value::Null)) => Ordering::Less,
        (Some(l), Some(r)) => {
            let ord = compare_json_values(l, r);
            match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        }
    }
}

fn compare_json_values(l: &Value, r: &Value) -> Ordering {
    match (l, r) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Value::String(a), Value::String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Array(a), Value::Array(b)) => {
            for (a, b) in a.iter().zip(b) {
                let ord = compare_json_values(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(_), Value::Object(_)) => Ordering::Equal,
        (Value::Bool(_), _) => Ordering::Less,
        (_, Value::Bool(_)) => Ordering::Greater,
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        (Value::String(_), _) => Ordering::Less,
        (_, Value::String(_)) => Ordering::Greater,
        (Value::Array(_), _) => Ordering::Less,
        (_, Value::Array(_)) => Ordering::Greater,
    }
}

/// Streams every dataset visible with these parameters, one page at a time.
///
/// Pages are requested with `includes`, so embedded children come along.
/// Paging stops at the last page or at the first empty one.
///
/// # Examples
///
/// ```no_run
/// use futures::TryStreamExt;
/// use rwapi::{Client, SearchParams, collection::datasets};
///
/// # tokio_test::block_on(async {
/// let client = Client::from_env().unwrap();
/// let params = SearchParams::new();
/// let datasets: Vec<_> = datasets(&client, &params).try_collect().await.unwrap();
/// # })
/// ```
pub fn datasets<'a>(
    client: &'a Client,
    params: &'a SearchParams,
) -> impl Stream<Item = Result<Dataset>> + 'a {
    let config = client.config();
    let application = params
        .application
        .as_ref()
        .map(|application| application.join(","))
        .unwrap_or_else(|| config.application_param());
    let environment = params
        .environment
        .clone()
        .unwrap_or_else(|| config.environment.clone());
    let page_size = params.page_size.unwrap_or(config.page_size).max(1);
    try_stream! {
        let mut page_number = 1;
        loop {
            let query = [
                ("includes", INCLUDES.to_string()),
                ("application", application.clone()),
                ("env", environment.clone()),
                ("page[size]", page_size.to_string()),
                ("page[number]", page_number.to_string()),
            ];
            let value = client.get_with_query("v1/dataset", &query).await?;
            let page: ListDocument = serde_json::from_value(value)?;
            tracing::debug!("got {} dataset(s) on page {page_number}", page.data.len());
            let has_next = !page.data.is_empty() && page.has_next(page_number);
            for resource in page.data {
                yield Dataset::from_resource(resource)?;
            }
            if !has_next {
                break;
            }
            page_number += 1;
        }
    }
}

/// The result of a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Collection {
    entities: Vec<Entity>,
}

impl Collection {
    /// Searches the server.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rwapi::{Client, Collection, Kind, SearchParams};
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::from_env().unwrap();
    /// let params = SearchParams::new().term("forest").kind(Kind::Layer).limit(10);
    /// let collection = Collection::search(&client, &params).await.unwrap();
    /// for entity in &collection {
    ///     println!("{} {}", entity.kind(), entity.id());
    /// }
    /// # })
    /// ```
    pub async fn search(client: &Client, params: &SearchParams) -> Result<Collection> {
        let stream = datasets(client, params);
        pin_mut!(stream);
        let mut datasets = Vec::new();
        while let Some(dataset) = stream.try_next().await? {
            datasets.push(dataset);
        }
        tracing::info!("searching {} dataset(s)", datasets.len());
        Ok(Collection::from_datasets(datasets, params))
    }

    /// Builds a collection from datasets that are already in hand.
    ///
    /// Each dataset contributes itself, then its layers, then its widgets.
    /// Datasets keep their embedded children.
    pub fn from_datasets(
        datasets: impl IntoIterator<Item = Dataset>,
        params: &SearchParams,
    ) -> Collection {
        let mut entities = Vec::new();
        for dataset in datasets {
            let layers = dataset.layers.clone();
            let widgets = dataset.widgets.clone();
            entities.push(Entity::from_dataset(dataset));
            entities.extend(layers.into_iter().map(Entity::Layer));
            entities.extend(widgets.into_iter().map(Entity::Widget));
        }
        Collection {
            entities: params.apply(entities),
        }
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the search found nothing.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns an iterator over the entities.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    /// Returns the entity at an index.
    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    /// Returns the kind and id of every entity.
    pub fn ids(&self) -> Vec<(Kind, &str)> {
        self.entities
            .iter()
            .map(|entity| (entity.kind(), entity.id()))
            .collect()
    }

    /// Writes one backup file per entity into a directory, named `{kind}-{id}.json`.
    ///
    /// Returns the paths that were written.
    pub fn save(&self, directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;
        let mut paths = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            let path = directory.join(format!("{}-{}.json", entity.kind(), entity.id()));
            entity.save(&path)?;
            paths.push(path);
        }
        tracing::info!("saved {} backup(s) to {}", paths.len(), directory.display());
        Ok(paths)
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

impl From<Vec<Entity>> for Collection {
    fn from(entities: Vec<Entity>) -> Collection {
        Collection { entities }
    }
}

#[cfg(test)]
mod tests {
    use super::{Collection, Direction, SearchParams};
    use crate::{Backup, Client, Config, Dataset, Entity, Kind, Layer, Record, Server, Widget};
    use mockito::{Matcher, Server as MockServer};
    use rstest::rstest;
    use serde_json::{Value, json};

    fn dataset(id: &str, attributes: Value) -> Value {
        json!({"id": id, "type": "dataset", "attributes": attributes})
    }

    fn datasets() -> Vec<Dataset> {
        [
            dataset(
                "loss",
                json!({
                    "name": "Tree cover loss",
                    "provider": "cartodb",
                    "published": true,
                    "layer": [
                        {"id": "loss-layer", "type": "layer", "attributes": {"name": "Loss layer", "dataset": "loss"}},
                        {"id": "extent-layer", "type": "layer", "attributes": {"name": "Extent", "dataset": "loss", "description": "Forest extent"}}
                    ],
                    "widget": [
                        {"id": "loss-widget", "type": "widget", "attributes": {"name": "Loss chart", "dataset": "loss"}}
                    ]
                }),
            ),
            dataset(
                "fires",
                json!({"name": "Active fires", "provider": "gee", "published": false, "slug": "viirs-forest-fires"}),
            ),
            dataset("untitled", json!({"provider": "gee", "published": true})),
        ]
        .into_iter()
        .map(|value| Dataset::from_resource(serde_json::from_value(value).unwrap()).unwrap())
        .collect()
    }

    #[test]
    fn flatten_everything() {
        let collection = Collection::from_datasets(datasets(), &SearchParams::new());
        assert_eq!(collection.len(), 6);
        let ids: Vec<_> = collection.ids().into_iter().map(|(_, id)| id).collect();
        // Ordered by name, unnamed last.
        assert_eq!(
            ids,
            vec![
                "fires",
                "extent-layer",
                "loss-widget",
                "loss-layer",
                "loss",
                "untitled"
            ]
        );
        assert_eq!(collection.get(4).unwrap().kind(), Kind::Table);
        assert_eq!(collection.get(5).unwrap().kind(), Kind::Dataset);
    }

    #[rstest]
    #[case(vec![Kind::Layer], 2)]
    #[case(vec![Kind::Widget], 1)]
    #[case(vec![Kind::Table], 1)]
    #[case(vec![Kind::Dataset], 3)]
    #[case(vec![Kind::Layer, Kind::Widget], 3)]
    #[case(vec![], 6)]
    fn kind_filter(#[case] kinds: Vec<Kind>, #[case] count: usize) {
        let params = SearchParams {
            kinds,
            ..Default::default()
        };
        assert_eq!(Collection::from_datasets(datasets(), &params).len(), count);
    }

    #[rstest]
    #[case("LOSS", vec!["loss-widget", "loss-layer", "loss"])]
    #[case("forest", vec!["fires", "extent-layer"])]
    #[case("nothing", vec![])]
    fn term_filter(#[case] term: &str, #[case] ids: Vec<&str>) {
        let params = SearchParams::new().term(term);
        let collection = Collection::from_datasets(datasets(), &params);
        let found: Vec<_> = collection.iter().map(Entity::id).collect();
        assert_eq!(found, ids);
    }

    #[test]
    fn attribute_filter() {
        let params = SearchParams::new()
            .kind(Kind::Dataset)
            .filter("published", true);
        let collection = Collection::from_datasets(datasets(), &params);
        let found: Vec<_> = collection.iter().map(Entity::id).collect();
        assert_eq!(found, vec!["loss", "untitled"]);
    }

    #[test]
    fn order_descending_keeps_missing_last() {
        let params = SearchParams::new()
            .kind(Kind::Dataset)
            .order("name", Direction::Desc);
        let collection = Collection::from_datasets(datasets(), &params);
        let found: Vec<_> = collection.iter().map(Entity::id).collect();
        assert_eq!(found, vec!["loss", "fires", "untitled"]);
    }

    #[test]
    fn dedup_and_limit() {
        let mut layer = Layer::new("a-layer");
        let _ = layer.attributes.insert("name".into(), "B".into());
        let mut widget = Widget::new("a-layer");
        let _ = widget.attributes.insert("name".into(), "A".into());
        let mut duplicate = layer.clone();
        let _ = duplicate.attributes.insert("name".into(), "C".into());
        let entities = vec![
            Entity::from(layer),
            Entity::from(widget),
            Entity::from(duplicate),
        ];
        let applied = SearchParams::new().apply(entities.clone());
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].name(), Some("A"));
        assert_eq!(applied[1].name(), Some("B"));
        let applied = SearchParams::new().limit(1).apply(entities);
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn stable_order() {
        let entities: Vec<Entity> = ["first", "second", "third"]
            .into_iter()
            .map(|id| {
                let mut layer = Layer::new(id);
                let _ = layer.attributes.insert("name".into(), "Same".into());
                Entity::from(layer)
            })
            .collect();
        let applied = SearchParams::new().apply(entities);
        let ids: Vec<_> = applied.iter().map(Entity::id).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn search_pages() {
        let mut server = MockServer::new_async().await;
        let page_one = server
            .mock("GET", "/v1/dataset")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("includes".into(), "layer,widget,vocabulary,metadata".into()),
                Matcher::UrlEncoded("application".into(), "rw".into()),
                Matcher::UrlEncoded("env".into(), "production".into()),
                Matcher::UrlEncoded("page[size]".into(), "2".into()),
                Matcher::UrlEncoded("page[number]".into(), "1".into()),
            ]))
            .with_body(
                json!({
                    "data": [
                        dataset("b", json!({"name": "Beta"})),
                        dataset("a", json!({"name": "Alpha"}))
                    ],
                    "meta": {"total-pages": 2}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let page_two = server
            .mock("GET", "/v1/dataset")
            .match_query(Matcher::UrlEncoded("page[number]".into(), "2".into()))
            .with_body(
                json!({
                    "data": [dataset("c", json!({"name": "Gamma"}))],
                    "meta": {"total-pages": 2}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let config = Config::new()
            .with_server(Server::Custom(server.url().parse().unwrap()))
            .with_page_size(2);
        let client = Client::new(config).unwrap();
        let collection = Collection::search(&client, &SearchParams::new()).await.unwrap();
        let ids: Vec<_> = collection.iter().map(Entity::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        page_one.assert_async().await;
        page_two.assert_async().await;
    }

    #[tokio::test]
    async fn search_overrides_application() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("GET", "/v1/dataset")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("application".into(), "gfw,rw".into()),
                Matcher::UrlEncoded("env".into(), "staging".into()),
            ]))
            .with_body(json!({"data": [], "links": {}}).to_string())
            .create_async()
            .await;
        let client = Client::new(
            Config::new().with_server(Server::Custom(server.url().parse().unwrap())),
        )
        .unwrap();
        let params = SearchParams {
            application: Some(vec!["gfw".to_string(), "rw".to_string()]),
            environment: Some("staging".to_string()),
            ..Default::default()
        };
        let collection = Collection::search(&client, &params).await.unwrap();
        assert!(collection.is_empty());
        mock.assert_async().await;
    }

    #[test]
    fn save() {
        let tempdir = tempfile::tempdir().unwrap();
        let params = SearchParams::new().kind(Kind::Layer);
        let collection = Collection::from_datasets(datasets(), &params);
        let directory = tempdir.path().join("backups").join("layers");
        let paths = collection.save(&directory).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(directory.join("layer-loss-layer.json").exists());
        let backup = Backup::from_path(&paths[0]).unwrap();
        assert_eq!(backup.kind, Kind::Layer);
    }

    #[test]
    fn saved_datasets_keep_children() {
        let tempdir = tempfile::tempdir().unwrap();
        let params = SearchParams::new().kind(Kind::Dataset);
        let collection = Collection::from_datasets(datasets(), &params);
        let Some(Entity::Table(table)) = collection.iter().find(|entity| entity.id() == "loss") else {
            panic!("expected the loss table");
        };
        assert_eq!(table.layers.len(), 2);

        let _ = collection.save(tempdir.path()).unwrap();
        let backup = Backup::from_path(tempdir.path().join("table-loss.json")).unwrap();
        assert_eq!(backup.data.attributes["layer"].as_array().unwrap().len(), 2);
        let Entity::Table(table) = backup.into_entity().unwrap() else {
            panic!("expected a table");
        };
        assert_eq!(table.layers.len(), 2);
        assert_eq!(table.widgets.len(), 1);
    }
}
