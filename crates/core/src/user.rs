use crate::{Client, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// An api user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user id, read from `_id` when the payload has no `id`.
    pub id: String,

    /// The user's email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// The user's display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The user's role, e.g. `USER` or `ADMIN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// The bearer token, only present after [User::login].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Everything else the api says about the user.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl User {
    /// Logs in with an email and password.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rwapi::{Client, User};
    ///
    /// # tokio_test::block_on(async {
    /// let client = Client::from_env().unwrap();
    /// let user = User::login(&client, "someone@example.com", "a-password").await.unwrap();
    /// let client = client.with_token(user.token.unwrap());
    /// # })
    /// ```
    pub async fn login(client: &Client, email: &str, password: &str) -> Result<User> {
        let value = client
            .post_public("auth/login", &json!({"email": email, "password": password}))
            .await?;
        let user = User::from_value(value)?;
        if user.token.is_none() {
            return Err(Error::MissingField("token"));
        }
        tracing::info!("logged in as {}", user.id);
        Ok(user)
    }

    /// Gets the user that owns the client's token.
    pub async fn me(client: &Client) -> Result<User> {
        if client.token().is_none() {
            return Err(Error::MissingToken);
        }
        let value = client.get("auth/user/me").await?;
        User::from_value(value)
    }

    fn from_value(value: Value) -> Result<User> {
        // Login wraps the user in `data`, `me` doesn't.
        let mut value = match value {
            Value::Object(mut object) => object.remove("data").unwrap_or(Value::Object(object)),
            value => value,
        };
        if let Value::Object(object) = &mut value {
            if !object.contains_key("id") {
                if let Some(id) = object.remove("_id") {
                    let _ = object.insert("id".to_string(), id);
                }
            }
        }
        serde_json::from_value(value).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::User;
    use crate::{Client, Config, Error, Server};
    use mockito::{Matcher, Server as MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> Client {
        let config = Config::new().with_server(Server::Custom(server.url().parse().unwrap()));
        Client::new(config).unwrap()
    }

    #[tokio::test]
    async fn login() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("POST", "/auth/login")
            .match_body(Matcher::Json(json!({"email": "someone@example.com", "password": "secret"})))
            .with_body(
                json!({"data": {
                    "_id": "a-user",
                    "email": "someone@example.com",
                    "role": "USER",
                    "extraUserData": {"apps": ["rw"]},
                    "token": "a-token"
                }})
                .to_string(),
            )
            .create_async()
            .await;
        let user = User::login(&client(&server), "someone@example.com", "secret")
            .await
            .unwrap();
        assert_eq!(user.id, "a-user");
        assert_eq!(user.token.as_deref(), Some("a-token"));
        assert!(user.additional_fields.contains_key("extraUserData"));
        mock.assert_async().await;
    }

    #[test]
    fn both_ids() {
        let user = User::from_value(json!({"data": {
            "_id": "a-user",
            "id": "a-user",
            "email": "someone@example.com",
            "token": "a-token"
        }}))
        .unwrap();
        assert_eq!(user.id, "a-user");
        assert_eq!(user.token.as_deref(), Some("a-token"));

        let user = User::from_value(json!({"_id": "a-user", "name": "Someone"})).unwrap();
        assert_eq!(user.id, "a-user");
        assert!(!user.additional_fields.contains_key("_id"));
    }

    #[tokio::test]
    async fn bad_credentials() {
        let mut server = MockServer::new_async().await;
        let _mock = server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body(json!({"errors": [{"status": 401, "detail": "Invalid email or password"}]}).to_string())
            .create_async()
            .await;
        let error = User::login(&client(&server), "someone@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Api { status: 401, message, .. } if message == "Invalid email or password"
        ));
    }

    #[tokio::test]
    async fn me() {
        let mut server = MockServer::new_async().await;
        let mock = server
            .mock("GET", "/auth/user/me")
            .match_header("authorization", "Bearer a-token")
            .with_body(json!({"id": "a-user", "email": "someone@example.com", "name": "Someone"}).to_string())
            .create_async()
            .await;
        let user = User::me(&client(&server).with_token("a-token")).await.unwrap();
        assert_eq!(user.name.as_deref(), Some("Someone"));
        assert!(user.token.is_none());
        mock.assert_async().await;

        assert!(matches!(
            User::me(&client(&server)).await.unwrap_err(),
            Error::MissingToken
        ));
    }
}
