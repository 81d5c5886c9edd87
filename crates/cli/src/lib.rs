//! Command line interface for the Resource Watch, Global Forest Watch, and Skydipper apis.

// The verbosity stuff is cribbed from https://github.com/clap-rs/clap-verbosity-flag/blob/c621a6a8a7c0b6df8f1464a985a5d076b4915693/src/lib.rs and updated for tracing

#![deny(unused_crate_dependencies)]

use anyhow::{Error, Result, anyhow};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use futures_util::{TryStreamExt, pin_mut};
use rwapi::{
    Backup, Client, CloneOptions, Collection, Config, Dataset, DeleteOptions, Direction, Entity,
    Kind, Layer, MergeOptions, Record, Server, User, Widget,
    collection::{SearchParams, datasets},
    image::{ImageCollection, ImageSearch},
};
use serde_json::Value;
use std::{io::Write, path::PathBuf, str::FromStr};
use tokio::task::JoinSet;
use tracing::metadata::Level;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{
    fmt::writer::MakeWriterExt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// The environment variable `login` reads the password from.
pub const PASSWORD_ENV_VAR: &str = "RW_API_PASSWORD";

/// rwapi: A command-line interface for the Resource Watch api
#[derive(Debug, Parser)]
pub struct Rwapi {
    #[command(subcommand)]
    command: Command,

    /// The api server.
    ///
    /// Possible values (default: rw):
    ///
    /// - rw (https://api.resourcewatch.org)
    /// - gfw (https://production-api.globalforestwatch.org)
    /// - skydipper (https://api.skydipper.com)
    /// - any other url
    #[arg(long, global = true, verbatim_doc_comment)]
    server: Option<Server>,

    /// The api token, required for anything that writes.
    ///
    /// Overrides `RW_API_TOKEN`.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Applications to filter listings by, e.g. `--app rw --app gfw`.
    #[arg(long = "app", global = true)]
    application: Vec<String>,

    /// The environment to filter listings by.
    #[arg(long = "env", global = true)]
    environment: Option<String>,

    /// Whether to print compact JSON.
    #[arg(long = "compact-json", global = true)]
    compact_json: bool,

    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = ErrorLevel::verbose_help(),
        long_help = ErrorLevel::verbose_long_help(),
    )]
    verbose: u8,

    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        help = ErrorLevel::quiet_help(),
        long_help = ErrorLevel::quiet_long_help(),
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

/// A rwapi subcommand.
#[derive(Debug, Clone, Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Command {
    /// Searches datasets, layers, and widgets.
    ///
    /// Prints a JSON array of resources.
    Search {
        /// Free-text terms, matched against name, description, and slug.
        terms: Vec<String>,

        /// The kinds to return, e.g. `--kind layer --kind widget`.
        #[arg(long)]
        kind: Vec<Kind>,

        /// The maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        /// The attribute to order by.
        #[arg(long)]
        order: Option<String>,

        /// Orders largest first.
        #[arg(long)]
        desc: bool,

        /// Attributes that must match, e.g. `--filter provider=gee`.
        ///
        /// Values are parsed as JSON when possible, so `--filter published=true`
        /// matches the boolean.
        #[arg(long, verbatim_doc_comment)]
        filter: Vec<KeyValue>,

        /// Also writes every result to this directory.
        #[arg(long = "save-dir")]
        save_dir: Option<PathBuf>,
    },

    /// Lists every dataset, one JSON document per line.
    List {
        /// The number of datasets requested per page.
        #[arg(long = "page-size")]
        page_size: Option<usize>,
    },

    /// Gets one or more records by id.
    Get {
        /// The kind of record.
        kind: Kind,

        /// The record ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Runs a SQL query against a tabular dataset.
    Query {
        /// The dataset id.
        dataset_id: String,

        /// The query, e.g. `SELECT * FROM data LIMIT 5`.
        sql: String,
    },

    /// Prints the first rows of a tabular dataset.
    Head {
        /// The dataset id.
        dataset_id: String,

        /// The number of rows.
        #[arg(short = 'n', default_value_t = 5)]
        n: usize,
    },

    /// Prints the field names and types of a tabular dataset.
    Fields {
        /// The dataset id.
        dataset_id: String,
    },

    /// Saves a record to a local backup file.
    Save {
        /// The kind of record.
        kind: Kind,

        /// The record id.
        id: String,

        /// The backup file.
        outfile: PathBuf,
    },

    /// Recreates a record from a backup file.
    Restore {
        /// The backup file.
        infile: PathBuf,
    },

    /// Clones a dataset.
    Clone {
        /// The dataset id.
        dataset_id: String,

        /// The name of the clone, `<name> (clone)` by default.
        #[arg(long)]
        name: Option<String>,

        /// Also clones the dataset's layers, widgets, metadata, and vocabularies.
        #[arg(long)]
        children: bool,
    },

    /// Merges one record's attributes into another.
    Merge {
        /// The kind of record.
        kind: Kind,

        /// The record to merge from.
        source_id: String,

        /// The record to merge into.
        target_id: String,

        /// Only merges these attributes.
        #[arg(long = "key")]
        keys: Vec<String>,

        /// Also merges the children of datasets, matched by name.
        #[arg(long)]
        children: bool,
    },

    /// Deletes a record.
    Delete {
        /// The kind of record.
        kind: Kind,

        /// The record id.
        id: String,

        /// Deletes a dataset's layers, widgets, metadata, and vocabularies first.
        #[arg(long)]
        cascade: bool,
    },

    /// Logs in and prints the user, including its token.
    ///
    /// The password is read from `RW_API_PASSWORD`.
    Login {
        /// The account email.
        email: String,
    },

    /// Prints the tile url template of a layer.
    Tiles {
        /// The layer id.
        layer_id: String,
    },

    /// Searches recent satellite imagery around a point.
    Images {
        /// The latitude.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// The longitude.
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// The first day to search, e.g. 2024-01-01.
        #[arg(long)]
        start: NaiveDate,

        /// The last day to search.
        #[arg(long)]
        end: NaiveDate,

        /// The maximum number of images.
        #[arg(long)]
        limit: Option<usize>,

        /// Drops images cloudier than this.
        #[arg(long = "max-cloud-score")]
        max_cloud_score: Option<f64>,

        /// Fetches a tile url template for every image.
        #[arg(long)]
        tiles: bool,

        /// Fetches a thumbnail for every image.
        #[arg(long)]
        thumbs: bool,
    },

    /// Generates shell completions.
    GenerateCompletions {
        /// The shell.
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone)]
pub struct KeyValue(String, Value);

#[derive(Copy, Clone, Debug, Default)]
struct ErrorLevel;

impl Rwapi {
    /// Runs this command.
    ///
    /// If `init_tracing_subscriber` is `false`, it is expected that the caller
    /// is setting up the appropriate logging.
    pub async fn run(self, init_tracing_subscriber: bool) -> Result<()> {
        if init_tracing_subscriber {
            let indicatif_layer = IndicatifLayer::new();
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer().with_writer(
                        indicatif_layer
                            .get_stderr_writer()
                            .with_max_level(self.log_level().unwrap_or(Level::WARN)),
                    ),
                )
                .with(indicatif_layer)
                .init();
        }
        let client = self.client()?;
        match self.command {
            Command::Search {
                ref terms,
                ref kind,
                limit,
                ref order,
                desc,
                ref filter,
                ref save_dir,
            } => {
                let params = search_params(terms, kind, limit, order.as_deref(), desc, filter);
                let collection = Collection::search(&client, &params).await?;
                tracing::info!("found {} record(s)", collection.len());
                if let Some(save_dir) = save_dir {
                    let _ = collection.save(save_dir)?;
                }
                self.print(serde_json::to_value(&collection)?)
            }
            Command::List { page_size } => {
                let params = SearchParams {
                    page_size,
                    ..Default::default()
                };
                let stream = datasets(&client, &params);
                pin_mut!(stream);
                let mut stdout = std::io::stdout();
                while let Some(dataset) = stream.try_next().await? {
                    let mut bytes = serde_json::to_vec(&dataset)?;
                    bytes.push(b'\n');
                    stdout.write_all(&bytes)?;
                }
                Ok(())
            }
            Command::Get { kind, ref ids } => {
                let mut join_set = JoinSet::new();
                for (index, id) in ids.iter().enumerate() {
                    let client = client.clone();
                    let id = id.clone();
                    let _ = join_set.spawn(async move {
                        Entity::get(&client, kind, &id)
                            .await
                            .map(|entity| (index, entity))
                    });
                }
                let mut entities = Vec::with_capacity(ids.len());
                while let Some(result) = join_set.join_next().await {
                    entities.push(result??);
                }
                entities.sort_by_key(|(index, _)| *index);
                let mut values = entities
                    .into_iter()
                    .map(|(_, entity)| serde_json::to_value(&entity))
                    .collect::<serde_json::Result<Vec<_>>>()?;
                if values.len() == 1 {
                    self.print(values.remove(0))
                } else {
                    self.print(Value::Array(values))
                }
            }
            Command::Query {
                ref dataset_id,
                ref sql,
            } => {
                let rows = table(&client, dataset_id).await?.query(&client, sql).await?;
                self.print(serde_json::to_value(rows)?)
            }
            Command::Head { ref dataset_id, n } => {
                let rows = table(&client, dataset_id).await?.head(&client, n).await?;
                self.print(serde_json::to_value(rows)?)
            }
            Command::Fields { ref dataset_id } => {
                let fields = table(&client, dataset_id).await?.fields(&client).await?;
                self.print(serde_json::to_value(fields)?)
            }
            Command::Save {
                kind,
                ref id,
                ref outfile,
            } => {
                let entity = Entity::get(&client, kind, id).await?;
                entity.save(outfile)?;
                eprintln!("Saved {} {} to {}", entity.kind(), entity.id(), outfile.display());
                Ok(())
            }
            Command::Restore { ref infile } => {
                require_token(&client)?;
                let backup = Backup::from_path(infile)?;
                let entity = backup.restore(&client).await?;
                self.print(serde_json::to_value(&entity)?)
            }
            Command::Clone {
                ref dataset_id,
                ref name,
                children,
            } => {
                require_token(&client)?;
                let mut options = CloneOptions::default().children(children);
                if let Some(name) = name {
                    options = options.name(name);
                }
                let dataset = Dataset::get(&client, dataset_id).await?;
                let clone = dataset.clone_dataset(&client, &options).await?;
                self.print(serde_json::to_value(&clone)?)
            }
            Command::Merge {
                kind,
                ref source_id,
                ref target_id,
                ref keys,
                children,
            } => {
                require_token(&client)?;
                let keys = if keys.is_empty() {
                    None
                } else {
                    Some(keys.clone())
                };
                let merged: Entity = match kind {
                    Kind::Dataset | Kind::Table => {
                        let options = MergeOptions { keys, children };
                        Dataset::get(&client, source_id)
                            .await?
                            .merge_into(&client, target_id, &options)
                            .await?
                            .into()
                    }
                    Kind::Layer => Layer::get(&client, source_id)
                        .await?
                        .merge_into(&client, target_id, keys.as_deref())
                        .await?
                        .into(),
                    Kind::Widget => Widget::get(&client, source_id)
                        .await?
                        .merge_into(&client, target_id, keys.as_deref())
                        .await?
                        .into(),
                    Kind::Metadata | Kind::Vocabulary => {
                        return Err(anyhow!("cannot merge a {kind} by id"));
                    }
                };
                self.print(serde_json::to_value(&merged)?)
            }
            Command::Delete {
                kind,
                ref id,
                cascade,
            } => {
                require_token(&client)?;
                match kind {
                    Kind::Dataset | Kind::Table => {
                        Dataset::get(&client, id)
                            .await?
                            .delete(&client, DeleteOptions { cascade })
                            .await?
                    }
                    Kind::Layer => Layer::get(&client, id).await?.delete(&client).await?,
                    Kind::Widget => Widget::get(&client, id).await?.delete(&client).await?,
                    Kind::Metadata | Kind::Vocabulary => {
                        return Err(anyhow!("cannot delete a {kind} by id"));
                    }
                }
                eprintln!("Deleted {kind} {id}");
                Ok(())
            }
            Command::Login { ref email } => {
                let password = std::env::var(PASSWORD_ENV_VAR)
                    .map_err(|_| anyhow!("{PASSWORD_ENV_VAR} is not set"))?;
                let user = User::login(&client, email, &password).await?;
                self.print(serde_json::to_value(&user)?)
            }
            Command::Tiles { ref layer_id } => {
                let layer = Layer::get(&client, layer_id).await?;
                let url = layer.parse_map_url(&client).await?;
                self.print(Value::String(url))
            }
            Command::Images {
                lat,
                lon,
                start,
                end,
                limit,
                max_cloud_score,
                tiles,
                thumbs,
            } => {
                let mut search = ImageSearch::new(lat, lon, start, end);
                if let Some(limit) = limit {
                    search = search.limit(limit);
                }
                if let Some(max_cloud_score) = max_cloud_score {
                    search = search.max_cloud_score(max_cloud_score);
                }
                let mut images = ImageCollection::search(&client, &search).await?;
                if tiles {
                    images.tiles(&client).await?;
                }
                if thumbs {
                    images.thumbs(&client).await?;
                }
                self.print(serde_json::to_value(&images)?)
            }
            Command::GenerateCompletions { shell } => {
                let mut stdout = std::io::stdout();
                clap_complete::generate(shell, &mut Rwapi::command(), "rwapi", &mut stdout);
                Ok(())
            }
        }
    }

    /// Returns this command's subcommand.
    pub fn subcommand(&self) -> &Command {
        &self.command
    }

    /// Returns the configuration from the environment, overridden by flags.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;
        if let Some(server) = &self.server {
            config = config.with_server(server.clone());
        }
        if let Some(token) = &self.token {
            config = config.with_token(token);
        }
        if !self.application.is_empty() {
            config = config.with_application(self.application.clone());
        }
        if let Some(environment) = &self.environment {
            config = config.with_environment(environment);
        }
        Ok(config)
    }

    /// Returns a client built from [Rwapi::config].
    pub fn client(&self) -> Result<Client> {
        Client::new(self.config()?).map_err(Error::from)
    }

    pub fn log_level(&self) -> Option<Level> {
        level_enum(self.verbosity())
    }

    fn verbosity(&self) -> i8 {
        level_value(ErrorLevel::default()) - (self.quiet as i8) + (self.verbose as i8)
    }

    fn print(&self, value: Value) -> Result<()> {
        let mut bytes = if self.compact_json {
            serde_json::to_vec(&value)?
        } else {
            serde_json::to_vec_pretty(&value)?
        };
        bytes.push(b'\n');
        std::io::stdout().write_all(&bytes)?;
        Ok(())
    }
}

impl ErrorLevel {
    fn default() -> Option<Level> {
        Some(Level::ERROR)
    }

    fn verbose_help() -> Option<&'static str> {
        Some("Increase verbosity")
    }

    fn verbose_long_help() -> Option<&'static str> {
        None
    }

    fn quiet_help() -> Option<&'static str> {
        Some("Decrease verbosity")
    }

    fn quiet_long_help() -> Option<&'static str> {
        None
    }
}

impl KeyValue {
    /// Returns the key.
    pub fn key(&self) -> &str {
        &self.0
    }

    /// Returns the value.
    pub fn value(&self) -> &Value {
        &self.1
    }
}

impl FromStr for KeyValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((key, value)) = s.split_once('=') {
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
            Ok(KeyValue(key.to_string(), value))
        } else {
            Err(anyhow!("invalid key=value: {s}"))
        }
    }
}

/// Builds search parameters from the `search` subcommand's arguments.
pub fn search_params(
    terms: &[String],
    kinds: &[Kind],
    limit: Option<usize>,
    order: Option<&str>,
    desc: bool,
    filters: &[KeyValue],
) -> SearchParams {
    let direction = if desc { Direction::Desc } else { Direction::Asc };
    SearchParams {
        terms: terms.to_vec(),
        kinds: kinds.to_vec(),
        filters: filters
            .iter()
            .map(|kv| (kv.0.clone(), kv.1.clone()))
            .collect(),
        order: order.map(String::from),
        direction,
        limit,
        ..Default::default()
    }
}

async fn table(client: &Client, dataset_id: &str) -> Result<rwapi::Table> {
    let dataset = Dataset::get(client, dataset_id).await?;
    rwapi::Table::new(dataset)
        .map_err(|dataset| Error::from(rwapi::Error::NotTabular(dataset.id)))
}

fn require_token(client: &Client) -> Result<()> {
    if client.token().is_none() {
        Err(rwapi::Error::MissingToken.into())
    } else {
        Ok(())
    }
}

fn level_enum(verbosity: i8) -> Option<Level> {
    match verbosity {
        i8::MIN..=-1 => None,
        0 => Some(Level::ERROR),
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        4..=i8::MAX => Some(Level::TRACE),
    }
}

fn level_value(level: Option<Level>) -> i8 {
    match level {
        None => -1,
        Some(Level::ERROR) => 0,
        Some(Level::WARN) => 1,
        Some(Level::INFO) => 2,
        Some(Level::DEBUG) => 3,
        Some(Level::TRACE) => 4,
    }
}

#[cfg(test)]
use {assert_cmd as _, rstest as _, tempfile as _};
