use std::fmt;

use async_trait::async_trait;

use super::BackendRequest;
use crate::client::{LoadType, MorkClient};
use crate::envelope::Envelope;
use crate::error::{PlaygroundError, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Neo4jConnectRequest {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Neo4jConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jConnectRequest")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl BackendRequest for Neo4jConnectRequest {
    const NAME: &'static str = "neo4j-connect";

    fn validate(&self) -> Result<()> {
        if [&self.uri, &self.user, &self.password]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(PlaygroundError::validation(
                "URI, username, and password are required",
            ));
        }
        Ok(())
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client
            .neo4j_connect(self.uri.trim(), self.user.trim(), &self.password)
            .await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neo4jLoadRequest {
    pub load_type: LoadType,
}

#[async_trait]
impl BackendRequest for Neo4jLoadRequest {
    const NAME: &'static str = "neo4j-load";

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, client: &MorkClient) -> Envelope {
        client.neo4j_load(self.load_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_requires_all_credentials_and_hides_password() {
        let request = Neo4jConnectRequest {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
        };
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "URI, username, and password are required"
        );

        let request = Neo4jConnectRequest {
            password: "hunter2".to_string(),
            ..request
        };
        assert!(request.validate().is_ok());
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}
