//! Client configuration.
//!
//! A [Config] is built from compiled defaults, then environment variables,
//! then builder setters, in that order of precedence:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RW_API_URL` | `rw` | A server name (`rw`, `gfw`, `skydipper`) or an absolute url |
//! | `RW_API_TOKEN` | none | Bearer token used for mutating calls |
//! | `RW_API_APPLICATION` | `rw` | Comma-delimited application filter |
//! | `RW_API_ENV` | `production` | Environment filter |

use crate::{Error, Result};
use std::{fmt::Display, str::FromStr};
use url::Url;

/// The environment variable holding the server.
pub const URL_ENV_VAR: &str = "RW_API_URL";

/// The environment variable holding the api token.
pub const TOKEN_ENV_VAR: &str = "RW_API_TOKEN";

/// The environment variable holding the application filter.
pub const APPLICATION_ENV_VAR: &str = "RW_API_APPLICATION";

/// The environment variable holding the environment filter.
pub const ENVIRONMENT_ENV_VAR: &str = "RW_API_ENV";

/// The number of records requested per page when listing.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// The carto maps api host, with an `{account}` placeholder.
pub const DEFAULT_CARTO_HOST: &str = "https://{account}.carto.com";

const RESOURCE_WATCH_URL: &str = "https://api.resourcewatch.org";
const GLOBAL_FOREST_WATCH_URL: &str = "https://production-api.globalforestwatch.org";
const SKYDIPPER_URL: &str = "https://api.skydipper.com";

/// A known API host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Server {
    /// <https://api.resourcewatch.org>
    #[default]
    ResourceWatch,

    /// <https://production-api.globalforestwatch.org>
    GlobalForestWatch,

    /// <https://api.skydipper.com>
    Skydipper,

    /// Any other deployment of the api.
    Custom(Url),
}

/// Configuration shared by every request made through a [Client](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The api host.
    pub server: Server,

    /// The api token, required for anything that writes.
    pub token: Option<String>,

    /// Applications to filter listings by, e.g. `rw` or `gfw`.
    pub application: Vec<String>,

    /// The environment to filter listings by.
    pub environment: String,

    /// The number of records requested per page when listing.
    pub page_size: usize,

    /// The carto host used to instantiate carto layers, with an `{account}` placeholder.
    pub carto_host: String,
}

impl Server {
    /// Returns the base url of this server.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::Server;
    ///
    /// assert_eq!(Server::ResourceWatch.url().unwrap().as_str(), "https://api.resourcewatch.org/");
    /// ```
    pub fn url(&self) -> Result<Url> {
        let url = match self {
            Server::ResourceWatch => RESOURCE_WATCH_URL,
            Server::GlobalForestWatch => GLOBAL_FOREST_WATCH_URL,
            Server::Skydipper => SKYDIPPER_URL,
            Server::Custom(url) => return Ok(url.clone()),
        };
        Url::parse(url).map_err(Error::from)
    }
}

impl FromStr for Server {
    type Err = Error;

    fn from_str(s: &str) -> Result<Server> {
        match s.to_ascii_lowercase().as_str() {
            "rw" | "resourcewatch" | "resource-watch" => Ok(Server::ResourceWatch),
            "gfw" | "globalforestwatch" | "global-forest-watch" => {
                Ok(Server::GlobalForestWatch)
            }
            "skydipper" | "sky" => Ok(Server::Skydipper),
            _ => {
                let url = Url::parse(s).map_err(|_| Error::InvalidServer(s.to_string()))?;
                if url.cannot_be_a_base() {
                    Err(Error::InvalidServer(s.to_string()))
                } else {
                    Ok(Server::Custom(url))
                }
            }
        }
    }
}

impl Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Server::ResourceWatch => f.write_str("rw"),
            Server::GlobalForestWatch => f.write_str("gfw"),
            Server::Skydipper => f.write_str("skydipper"),
            Server::Custom(url) => write!(f, "{url}"),
        }
    }
}

impl Config {
    /// Creates a configuration with the compiled defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::{Config, Server};
    ///
    /// let config = Config::new();
    /// assert_eq!(config.server, Server::ResourceWatch);
    /// assert_eq!(config.application, vec!["rw".to_string()]);
    /// ```
    pub fn new() -> Config {
        Config::default()
    }

    /// Creates a configuration from the defaults overlaid with environment variables.
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration from an arbitrary variable lookup.
    ///
    /// Used by [Config::from_env], and handy when the variables come from
    /// somewhere other than the process environment.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::{Config, Server};
    ///
    /// let config = Config::from_lookup(|key| match key {
    ///     "RW_API_URL" => Some("gfw".to_string()),
    ///     _ => None,
    /// }).unwrap();
    /// assert_eq!(config.server, Server::GlobalForestWatch);
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let mut config = Config::default();
        if let Some(server) = non_empty(lookup(URL_ENV_VAR)) {
            config.server = server.parse()?;
        }
        config.token = non_empty(lookup(TOKEN_ENV_VAR));
        if let Some(application) = non_empty(lookup(APPLICATION_ENV_VAR)) {
            config.application = split_list(&application);
        }
        if let Some(environment) = non_empty(lookup(ENVIRONMENT_ENV_VAR)) {
            config.environment = environment;
        }
        Ok(config)
    }

    /// Sets the server.
    pub fn with_server(mut self, server: Server) -> Config {
        self.server = server;
        self
    }

    /// Sets the api token.
    pub fn with_token(mut self, token: impl ToString) -> Config {
        self.token = Some(token.to_string());
        self
    }

    /// Sets the application filter.
    pub fn with_application(mut self, application: Vec<String>) -> Config {
        self.application = application;
        self
    }

    /// Sets the environment filter.
    pub fn with_environment(mut self, environment: impl ToString) -> Config {
        self.environment = environment.to_string();
        self
    }

    /// Sets the listing page size.
    ///
    /// A zero page size is bumped to one.
    pub fn with_page_size(mut self, page_size: usize) -> Config {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the carto host template.
    pub fn with_carto_host(mut self, carto_host: impl ToString) -> Config {
        self.carto_host = carto_host.to_string();
        self
    }

    /// Returns the carto host for an account.
    pub fn carto_url(&self, account: &str) -> String {
        self.carto_host.replace("{account}", account)
    }

    /// Returns the application filter as the api expects it, comma-delimited.
    pub fn application_param(&self) -> String {
        self.application.join(",")
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            server: Server::default(),
            token: None,
            application: vec!["rw".to_string()],
            environment: "production".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            carto_host: DEFAULT_CARTO_HOST.to_string(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Config, Server};
    use rstest::rstest;

    #[rstest]
    #[case("rw", Server::ResourceWatch)]
    #[case("RW", Server::ResourceWatch)]
    #[case("gfw", Server::GlobalForestWatch)]
    #[case("skydipper", Server::Skydipper)]
    fn parse_known_server(#[case] s: &str, #[case] expected: Server) {
        assert_eq!(s.parse::<Server>().unwrap(), expected);
    }

    #[rstest]
    #[case(Server::ResourceWatch, "https://api.resourcewatch.org/")]
    #[case(Server::GlobalForestWatch, "https://production-api.globalforestwatch.org/")]
    #[case(Server::Skydipper, "https://api.skydipper.com/")]
    fn known_server_url(#[case] server: Server, #[case] expected: &str) {
        assert_eq!(server.url().unwrap().as_str(), expected);
    }

    #[test]
    fn parse_custom_server() {
        let server: Server = "http://localhost:9000".parse().unwrap();
        assert_eq!(server.url().unwrap().as_str(), "http://localhost:9000/");
    }

    #[test]
    fn parse_invalid_server() {
        let _ = "not a server".parse::<Server>().unwrap_err();
        let _ = "mailto:someone@example.com".parse::<Server>().unwrap_err();
    }

    #[test]
    fn from_lookup() {
        let config = Config::from_lookup(|key| match key {
            "RW_API_URL" => Some("skydipper".to_string()),
            "RW_API_TOKEN" => Some("a-token".to_string()),
            "RW_API_APPLICATION" => Some("rw, gfw,".to_string()),
            "RW_API_ENV" => Some("staging".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.server, Server::Skydipper);
        assert_eq!(config.token.as_deref(), Some("a-token"));
        assert_eq!(config.application, vec!["rw", "gfw"]);
        assert_eq!(config.environment, "staging");
        assert_eq!(config.application_param(), "rw,gfw");
    }

    #[test]
    fn from_lookup_ignores_empty_values() {
        let config = Config::from_lookup(|_| Some(" ".to_string())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn page_size_is_at_least_one() {
        assert_eq!(Config::new().with_page_size(0).page_size, 1);
    }
}
