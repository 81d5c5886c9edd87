use crate::{Config, Error, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// An http client for one api server.
///
/// Every request made through a client carries its [Config]: the server
/// root, the bearer token (if any), and the listing filters.
///
/// # Examples
///
/// ```
/// use rwapi::{Client, Config};
///
/// let client = Client::new(Config::new().with_token("a-token")).unwrap();
/// assert!(client.token().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Config,
    root: Url,
}

impl Client {
    /// Creates a new client from a configuration.
    pub fn new(config: Config) -> Result<Client> {
        let http = reqwest::Client::builder()
            .user_agent(crate::user_agent())
            .build()?;
        let mut root = config.server.url()?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Ok(Client { http, config, root })
    }

    /// Creates a new client configured from the environment.
    ///
    /// See [Config::from_env].
    pub fn from_env() -> Result<Client> {
        Client::new(Config::from_env()?)
    }

    /// Returns a copy of this client that authenticates with the given token.
    pub fn with_token(&self, token: impl ToString) -> Client {
        let mut client = self.clone();
        client.config.token = Some(token.to_string());
        client
    }

    /// Returns this client's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns this client's token, if it has one.
    pub fn token(&self) -> Option<&str> {
        self.config.token.as_deref()
    }

    /// Returns the server root url.
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Resolves a path against the server root.
    ///
    /// # Examples
    ///
    /// ```
    /// use rwapi::{Client, Config};
    ///
    /// let client = Client::new(Config::new()).unwrap();
    /// let url = client.url("/v1/dataset/an-id").unwrap();
    /// assert_eq!(url.as_str(), "https://api.resourcewatch.org/v1/dataset/an-id");
    /// ```
    pub fn url(&self, path: &str) -> Result<Url> {
        self.root
            .join(path.trim_start_matches('/'))
            .map_err(Error::from)
    }

    /// Resolves a path and appends url-encoded query parameters.
    pub fn url_with_query<Q>(&self, path: &str, query: &Q) -> Result<Url>
    where
        Q: Serialize + ?Sized,
    {
        let mut url = self.url(path)?;
        let query = serde_urlencoded::to_string(query)?;
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        Ok(url)
    }

    /// Gets JSON from a path.
    pub async fn get(&self, path: &str) -> Result<Value> {
        let url = self.url(path)?;
        self.send(Method::GET, url, None::<&Value>).await
    }

    /// Gets JSON from a path with query parameters.
    pub async fn get_with_query<Q>(&self, path: &str, query: &Q) -> Result<Value>
    where
        Q: Serialize + ?Sized,
    {
        let url = self.url_with_query(path, query)?;
        self.send(Method::GET, url, None::<&Value>).await
    }

    /// Posts JSON to a path.
    ///
    /// Requires a token.
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let _ = self.require_token()?;
        let url = self.url(path)?;
        self.send(Method::POST, url, Some(body)).await
    }

    /// Posts JSON to a public endpoint, e.g. login or geostore creation.
    ///
    /// The token is sent if there is one, but it isn't required.
    pub async fn post_public<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        self.send(Method::POST, url, Some(body)).await
    }

    /// Posts JSON to an absolute url on another host.
    ///
    /// The token is never sent to other hosts.
    pub async fn post_external<B>(&self, url: Url, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!("POST {url}");
        let response = self.http.post(url.clone()).json(body).send().await?;
        handle(url, response).await
    }

    /// Patches a path with JSON.
    ///
    /// Requires a token.
    pub async fn patch<B>(&self, path: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        let _ = self.require_token()?;
        let url = self.url(path)?;
        self.send(Method::PATCH, url, Some(body)).await
    }

    /// Deletes a path.
    ///
    /// Requires a token.
    pub async fn delete(&self, path: &str) -> Result<Value> {
        let _ = self.require_token()?;
        let url = self.url(path)?;
        self.send(Method::DELETE, url, None::<&Value>).await
    }

    /// Deletes a path with query parameters.
    ///
    /// Requires a token.
    pub async fn delete_with_query<Q>(&self, path: &str, query: &Q) -> Result<Value>
    where
        Q: Serialize + ?Sized,
    {
        let _ = self.require_token()?;
        let url = self.url_with_query(path, query)?;
        self.send(Method::DELETE, url, None::<&Value>).await
    }

    fn require_token(&self) -> Result<&str> {
        self.token().ok_or(Error::MissingToken)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if let Some(token) = self.token() {
            builder.bearer_auth(token)
        } else {
            builder
        }
    }

    async fn send<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        tracing::debug!("{method} {url}");
        let mut builder = self.request(method, url.clone());
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        handle(url, response).await
    }
}

async fn handle(url: Url, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if status.is_success() {
        if bytes.is_empty() || status == StatusCode::NO_CONTENT {
            Ok(Value::Null)
        } else {
            serde_json::from_slice(&bytes).map_err(Error::from)
        }
    } else {
        let message = error_message(status, &bytes);
        tracing::debug!("{url} returned {status}: {message}");
        Err(Error::Api {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        })
    }
}

/// Pulls a human-readable message from an error body.
///
/// The api reports errors as `{"errors": [{"status": 404, "detail": "..."}]}`.
fn error_message(status: StatusCode, bytes: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        let details: Vec<&str> = value
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|error| error.get("detail").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        if !details.is_empty() {
            return details.join("; ");
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        text.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::{Config, Error, Server};
    use mockito::{Matcher, Server as MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> Client {
        let config = Config::new().with_server(Server::Custom(server.url().parse().unwrap()));
        Client::new(config).unwrap()
    }

    #[test]
    fn url_keeps_custom_prefix() {
        let config = Config::new().with_server("http://localhost:3000/api".parse().unwrap());
        let client = Client::new(config).unwrap();
        assert_eq!(
            client.url("/v1/dataset").unwrap().as_str(),
            "http://localhost:3000/api/v1/dataset"
        );
    }

    #[test]
    fn url_with_query_encodes_brackets() {
        let client = Client::new(Config::new()).unwrap();
        let url = client
            .url_with_query("v1/dataset", &[("page[size]", "10")])
            .unwrap();
        assert_eq!(url.query(), Some("page%5Bsize%5D=10"));
    }

    #[tokio::test]
    async fn get_sends_token() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("GET", "/v1/dataset/an-id")
            .match_header("authorization", "Bearer a-token")
            .with_header("content-type", "application/json")
            .with_body(json!({"data": {"id": "an-id"}}).to_string())
            .create_async()
            .await;
        let client = client(&server).with_token("a-token");
        let value = client.get("v1/dataset/an-id").await.unwrap();
        assert_eq!(value["data"]["id"], "an-id");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_detail() {
        let mut server = MockServer::new_async().await;
        let _mock = server
            .mock("GET", "/v1/dataset/missing")
            .with_status(404)
            .with_body(json!({"errors": [{"status": 404, "detail": "Dataset not found"}]}).to_string())
            .create_async()
            .await;
        let error = client(&server).get("v1/dataset/missing").await.unwrap_err();
        match error {
            Error::Api {
                status, message, ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Dataset not found");
            }
            _ => panic!("unexpected error: {error:?}"),
        }
    }

    #[tokio::test]
    async fn mutating_requires_token() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("DELETE", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let error = client(&server).delete("v1/dataset/an-id").await.unwrap_err();
        assert!(matches!(error, Error::MissingToken));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let mut server = MockServer::new_async().await;
        let _mock = server
            .mock("DELETE", "/v1/dataset/an-id")
            .with_status(204)
            .create_async()
            .await;
        let value = client(&server)
            .with_token("a-token")
            .delete("v1/dataset/an-id")
            .await
            .unwrap();
        assert!(value.is_null());
    }
}
