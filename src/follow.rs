use std::{
    collections::HashSet,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::{info, warn};

use crate::api::ApiError;
use crate::models::UserProfile;

/// Where follow edges are created and removed.
pub trait FollowGateway {
    fn follow(
        &self,
        follower_uid: &str,
        followed_uid: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn unfollow(
        &self,
        follower_uid: &str,
        followed_uid: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowTarget {
    pub id: String,
    pub firebase_uid: String,
}

impl From<&UserProfile> for FollowTarget {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            firebase_uid: profile.firebase_uid.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("you cannot follow yourself")]
    SelfFollow,
    #[error("a follow request for this user is already in flight")]
    Pending,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
    Unchanged,
}

#[derive(Default)]
struct Edges {
    followed: HashSet<String>,
    pending: HashSet<String>,
}

/// The viewer's local mirror of who they follow. Membership changes only
/// after the backend acknowledges the request.
pub struct FollowState {
    viewer_uid: String,
    edges: Mutex<Edges>,
}

impl FollowState {
    pub fn new(viewer_uid: impl Into<String>, following: impl IntoIterator<Item = String>) -> Self {
        Self {
            viewer_uid: viewer_uid.into(),
            edges: Mutex::new(Edges {
                followed: following.into_iter().collect(),
                pending: HashSet::new(),
            }),
        }
    }

    pub fn from_profile(viewer: &UserProfile) -> Self {
        Self::new(viewer.firebase_uid.clone(), viewer.following.iter().cloned())
    }

    fn edges(&self) -> MutexGuard<'_, Edges> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_following(&self, firebase_uid: &str) -> bool {
        self.edges().followed.contains(firebase_uid)
    }

    /// False for the viewer themself and while a request for the target is pending.
    pub fn can_toggle(&self, target: &FollowTarget) -> bool {
        target.firebase_uid != self.viewer_uid
            && !self.edges().pending.contains(&target.firebase_uid)
    }

    pub fn following_count(&self) -> usize {
        self.edges().followed.len()
    }

    pub async fn toggle<G: FollowGateway>(
        &self,
        gateway: &G,
        target: &FollowTarget,
    ) -> Result<FollowOutcome, FollowError> {
        self.apply(gateway, target, None).await
    }

    /// No request is sent when the target is already followed.
    pub async fn follow<G: FollowGateway>(
        &self,
        gateway: &G,
        target: &FollowTarget,
    ) -> Result<FollowOutcome, FollowError> {
        self.apply(gateway, target, Some(true)).await
    }

    pub async fn unfollow<G: FollowGateway>(
        &self,
        gateway: &G,
        target: &FollowTarget,
    ) -> Result<FollowOutcome, FollowError> {
        self.apply(gateway, target, Some(false)).await
    }

    async fn apply<G: FollowGateway>(
        &self,
        gateway: &G,
        target: &FollowTarget,
        desired: Option<bool>,
    ) -> Result<FollowOutcome, FollowError> {
        let uid = target.firebase_uid.as_str();
        let follow = {
            let mut edges = self.edges();
            if uid == self.viewer_uid {
                return Err(FollowError::SelfFollow);
            }
            if edges.pending.contains(uid) {
                return Err(FollowError::Pending);
            }
            let current = edges.followed.contains(uid);
            let follow = desired.unwrap_or(!current);
            if follow == current {
                return Ok(FollowOutcome::Unchanged);
            }
            edges.pending.insert(uid.to_string());
            follow
        };

        let result = if follow {
            gateway.follow(&self.viewer_uid, uid).await
        } else {
            gateway.unfollow(&self.viewer_uid, uid).await
        };

        let mut edges = self.edges();
        edges.pending.remove(uid);
        match result {
            Ok(()) if follow => {
                edges.followed.insert(uid.to_string());
                info!(target_id = %target.id, "followed");
                Ok(FollowOutcome::Followed)
            }
            Ok(()) => {
                edges.followed.remove(uid);
                info!(target_id = %target.id, "unfollowed");
                Ok(FollowOutcome::Unfollowed)
            }
            Err(err) => {
                warn!(target_id = %target.id, error = %err, "follow toggle failed");
                Err(err.into())
            }
        }
    }
}
