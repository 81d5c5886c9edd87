//! Recent satellite imagery.
//!
//! The `recent-tiles` service lists Sentinel and Landsat scenes over a
//! point. Listing is cheap; tile and thumbnail urls are computed by separate
//! batch requests.

use crate::{Client, Result, document::unwrap_data};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Parameters for searching recent imagery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSearch {
    /// Latitude of the point of interest.
    pub lat: f64,

    /// Longitude of the point of interest.
    pub lon: f64,

    /// The first day to search.
    pub start: NaiveDate,

    /// The last day to search.
    pub end: NaiveDate,

    /// The maximum number of images to keep.
    #[serde(skip)]
    pub limit: Option<usize>,

    /// Images cloudier than this are dropped.
    #[serde(skip)]
    pub max_cloud_score: Option<f64>,
}

/// A single satellite scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// The Earth Engine asset id of the scene.
    pub source: String,

    /// The instrument, e.g. `sentinel` or `landsat`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,

    /// When the scene was captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,

    /// The percentage of the scene covered by cloud.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_score: Option<f64>,

    /// The scene footprint as GeoJSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Value>,

    /// A `{z}/{x}/{y}` tile url template, filled by [ImageCollection::tiles].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_url: Option<String>,

    /// A thumbnail url, filled by [ImageCollection::thumbs].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
}

/// The images found by an [ImageSearch], newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageCollection {
    /// The images.
    pub images: Vec<Image>,
}

impl ImageSearch {
    /// Creates a new search over a point and a date range.
    pub fn new(lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> ImageSearch {
        ImageSearch {
            lat,
            lon,
            start,
            end,
            limit: None,
            max_cloud_score: None,
        }
    }

    /// Sets the maximum number of images.
    pub fn limit(mut self, limit: usize) -> ImageSearch {
        self.limit = Some(limit);
        self
    }

    /// Sets the maximum cloud score.
    pub fn max_cloud_score(mut self, max_cloud_score: f64) -> ImageSearch {
        self.max_cloud_score = Some(max_cloud_score);
        self
    }
}

impl Image {
    fn from_value(value: &Value) -> Option<Image> {
        let attributes = value.get("attributes").unwrap_or(value);
        let source = attributes.get("source")?.as_str()?.to_string();
        let date = attributes
            .get("date_time")
            .and_then(Value::as_str)
            .and_then(|date| match parse_date(date) {
                Ok(date) => Some(date),
                Err(err) => {
                    tracing::warn!("invalid date for image {source}: {err}");
                    None
                }
            });
        Some(Image {
            instrument: attributes
                .get("instrument")
                .and_then(Value::as_str)
                .map(String::from),
            date,
            cloud_score: attributes.get("cloud_score").and_then(Value::as_f64),
            bbox: attributes.get("bbox").cloned(),
            tile_url: None,
            thumb_url: None,
            source,
        })
    }
}

/// Parses the service's `date_time`, which is either rfc3339 or
/// `YYYY-MM-DD HH:MM:SS` in utc.
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Ok(datetime.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), "%Y-%m-%d %H:%M:%S")?;
    Ok(naive.and_utc())
}

impl ImageCollection {
    /// Searches for recent images.
    ///
    /// Images over the cloud score limit are dropped, the rest are sorted
    /// newest first and truncated to the limit.
    pub async fn search(client: &Client, search: &ImageSearch) -> Result<ImageCollection> {
        let value = client.get_with_query("v1/recent-tiles", search).await?;
        let data = unwrap_data(value)?;
        let mut images: Vec<Image> = data
            .get("tiles")
            .and_then(Value::as_array)
            .map(|tiles| tiles.iter().filter_map(Image::from_value).collect())
            .unwrap_or_default();
        tracing::debug!("found {} image(s)", images.len());
        if let Some(max_cloud_score) = search.max_cloud_score {
            images.retain(|image| {
                image
                    .cloud_score
                    .is_none_or(|cloud_score| cloud_score <= max_cloud_score)
            });
        }
        images.sort_by(|a, b| b.date.cmp(&a.date));
        if let Some(limit) = search.limit {
            images.truncate(limit);
        }
        Ok(ImageCollection { images })
    }

    /// Returns the number of images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns true if there are no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Returns an iterator over the images.
    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    /// Fills in tile urls for every image.
    pub async fn tiles(&mut self, client: &Client) -> Result<()> {
        let urls = self.batch(client, "v1/recent-tiles/tiles", "tile_url").await?;
        for image in &mut self.images {
            if let Some(url) = find_url(&urls, &image.source) {
                image.tile_url = Some(url);
            }
        }
        Ok(())
    }

    /// Fills in thumbnail urls for every image.
    pub async fn thumbs(&mut self, client: &Client) -> Result<()> {
        let urls = self
            .batch(client, "v1/recent-tiles/thumbs", "thumbnail_url")
            .await?;
        for image in &mut self.images {
            if let Some(url) = find_url(&urls, &image.source) {
                image.thumb_url = Some(url);
            }
        }
        Ok(())
    }

    async fn batch(&self, client: &Client, path: &str, key: &str) -> Result<Vec<(String, String)>> {
        if self.images.is_empty() {
            return Ok(Vec::new());
        }
        let source_data: Vec<Value> = self
            .images
            .iter()
            .map(|image| json!({"source": image.source}))
            .collect();
        let value = client
            .post_public(path, &json!({"source_data": source_data}))
            .await?;
        let data = unwrap_data(value)?;
        let entries = data
            .get("attributes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let source = entry
                    .get("source_id")
                    .or_else(|| entry.get("source"))
                    .and_then(Value::as_str)?;
                let url = entry.get(key).and_then(Value::as_str)?;
                Some((source.to_string(), url.to_string()))
            })
            .collect())
    }
}

fn find_url(urls: &[(String, String)], source: &str) -> Option<String> {
    urls.iter()
        .find(|(s, _)| s == source)
        .map(|(_, url)| url.clone())
}

impl IntoIterator for ImageCollection {
    type Item = Image;
    type IntoIter = std::vec::IntoIter<Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}
