//! [`RemoteDirectoryClient`] backed by Microsoft Graph

use async_trait::async_trait;
use tracing::{debug, instrument};

use se_core::{
    DirectoryError, DirectoryResult, GraphConfig, RemoteDirectoryClient, RemoteEvent, RemoteUser,
};

use crate::client::GraphClient;
use crate::models::{GraphEvent, GraphUser};

/// Hard ceiling on users fetched in one call
pub const MAX_USERS: usize = 500;

const USER_SELECT: &str = "id,displayName,mail,userPrincipalName,jobTitle,department";
const EVENT_SELECT: &str = "id,subject,start,end,location,isAllDay";

/// Graph-backed directory of school users and calendars
#[derive(Debug)]
pub struct GraphDirectory {
    client: GraphClient,
}

impl GraphDirectory {
    pub fn new(config: &GraphConfig) -> DirectoryResult<Self> {
        Ok(Self::with_client(GraphClient::new(config)?))
    }

    pub fn with_client(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteDirectoryClient for GraphDirectory {
    #[instrument(skip(self))]
    async fn fetch_users(&self, limit: usize) -> DirectoryResult<Vec<RemoteUser>> {
        let limit = limit.min(MAX_USERS);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut url = self.client.url(&["users"])?;
        url.query_pairs_mut()
            .append_pair("$select", USER_SELECT)
            .append_pair("$top", &limit.to_string());

        let users: Vec<GraphUser> = self.client.get_paged(url, &[], limit).await?;
        debug!("Fetched {} users from Graph", users.len());
        Ok(users.into_iter().map(GraphUser::into_remote).collect())
    }

    #[instrument(skip(self))]
    async fn fetch_user_events(
        &self,
        remote_user_id: &str,
        limit: usize,
    ) -> DirectoryResult<Vec<RemoteEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut url = self.client.url(&["users", remote_user_id, "events"])?;
        url.query_pairs_mut()
            .append_pair("$select", EVENT_SELECT)
            .append_pair("$top", &limit.to_string())
            .append_pair("$orderby", "start/dateTime desc");

        let events: Vec<GraphEvent> = self
            .client
            .get_paged(url, &[("prefer", "outlook.timezone=\"UTC\"")], limit)
            .await?;

        Ok(events
            .into_iter()
            .filter_map(|e| e.into_remote(remote_user_id))
            .collect())
    }

    #[instrument(skip(self))]
    async fn count_users(&self) -> DirectoryResult<u64> {
        let url = self.client.url(&["users", "$count"])?;
        let body = self
            .client
            .get_text(url, &[("consistencylevel", "eventual")])
            .await?;
        body.trim()
            .parse()
            .map_err(|_| DirectoryError::Decode(format!("Invalid user count: {body}")))
    }
}
