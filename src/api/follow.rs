use reqwest::Method;
use tracing::debug;

use super::{ApiClient, ApiError};
use crate::follow::FollowGateway;

impl FollowGateway for ApiClient {
    async fn follow(&self, follower_uid: &str, followed_uid: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "follow", follower_uid, "follow", followed_uid])?;
        self.send_empty(Method::POST, url).await?;
        debug!(follower_uid, followed_uid, "follow edge created");
        Ok(())
    }

    async fn unfollow(&self, follower_uid: &str, followed_uid: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "follow", follower_uid, "follow", followed_uid])?;
        self.send_empty(Method::DELETE, url).await?;
        debug!(follower_uid, followed_uid, "follow edge removed");
        Ok(())
    }
}
