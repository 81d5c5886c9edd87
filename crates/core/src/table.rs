use crate::{Client, Dataset, Error, Geometry, Record, Result, document::unwrap_data};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::ops::Deref;

/// A dataset that can be queried with sql.
///
/// Queries address the table as `FROM data`; the api resolves it to the
/// dataset's real table.
///
/// # Examples
///
/// ```
/// use rwapi::{Dataset, Table};
///
/// let dataset = Dataset::new("a-dataset");
/// let mut dataset = Table::new(dataset).unwrap_err();
/// let _ = dataset.attributes.insert("type".into(), "tabular".into());
/// let table = Table::new(dataset).unwrap();
/// assert_eq!(table.id, "a-dataset");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Table(Dataset);

impl Table {
    /// Wraps a dataset, handing it back if it isn't tabular.
    pub fn new(dataset: Dataset) -> std::result::Result<Table, Dataset> {
        if dataset.is_tabular() {
            Ok(Table(dataset))
        } else {
            Err(dataset)
        }
    }

    /// Returns the inner dataset.
    pub fn into_inner(self) -> Dataset {
        self.0
    }

    /// Runs a sql query, returning the rows.
    pub async fn query(&self, client: &Client, sql: &str) -> Result<Vec<Map<String, Value>>> {
        self.query_with(client, &[("sql", sql)]).await
    }

    /// Returns the first `n` rows.
    pub async fn head(&self, client: &Client, n: usize) -> Result<Vec<Map<String, Value>>> {
        self.query(client, &format!("SELECT * FROM data LIMIT {n}"))
            .await
    }

    /// Returns the rows that intersect a geostore.
    pub async fn intersect(
        &self,
        client: &Client,
        geometry: &Geometry,
    ) -> Result<Vec<Map<String, Value>>> {
        self.query_with(
            client,
            &[("sql", "SELECT * FROM data"), ("geostore", geometry.id.as_str())],
        )
        .await
    }

    async fn query_with(
        &self,
        client: &Client,
        query: &[(&str, &str)],
    ) -> Result<Vec<Map<String, Value>>> {
        let value = client
            .get_with_query(&format!("v1/query/{}", self.id), query)
            .await?;
        rows(unwrap_data(value)?)
    }

    /// Returns this table's field names and types.
    pub async fn fields(&self, client: &Client) -> Result<IndexMap<String, String>> {
        let value = client.get(&format!("v1/fields/{}", self.id)).await?;
        let fields = value
            .get("fields")
            .and_then(Value::as_object)
            .ok_or(Error::MissingField("fields"))?;
        Ok(fields
            .iter()
            .map(|(name, field)| {
                let r#type = field
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                (name.clone(), r#type)
            })
            .collect())
    }
}

fn rows(data: Value) -> Result<Vec<Map<String, Value>>> {
    match data {
        Value::Array(values) => values
            .into_iter()
            .map(|value| match value {
                Value::Object(row) => Ok(row),
                value => Err(Error::NotAnObject(value)),
            })
            .collect(),
        data => Err(Error::NotAnObject(data)),
    }
}

impl Deref for Table {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.0
    }
}

impl From<Table> for Dataset {
    fn from(table: Table) -> Dataset {
        table.0
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.to_resource().serialize(serializer)
    }
}
