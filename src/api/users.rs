use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use super::{base::parse_body, ApiClient, ApiError};
use crate::models::{NewUser, UserProfile, UserRole};
use crate::utils::contains_ignore_case;

/// Everyone a viewer can connect with, one bucket per account kind.
#[derive(Debug, Default, Clone)]
pub struct Directory {
    pub participants: Vec<UserProfile>,
    pub organizers: Vec<UserProfile>,
    pub organizations: Vec<UserProfile>,
}

impl Directory {
    pub fn iter(&self) -> impl Iterator<Item = &UserProfile> {
        self.participants
            .iter()
            .chain(self.organizers.iter())
            .chain(self.organizations.iter())
    }

    pub fn len(&self) -> usize {
        self.participants.len() + self.organizers.len() + self.organizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive match on name, username or email. The viewer is never listed.
    pub fn search(&self, term: &str, viewer_uid: Option<&str>) -> Vec<&UserProfile> {
        let term = term.trim();
        self.iter()
            .filter(|user| viewer_uid != Some(user.firebase_uid.as_str()))
            .filter(|user| {
                [&user.name, &user.username, &user.email]
                    .into_iter()
                    .flatten()
                    .any(|field| contains_ignore_case(field, term))
                    || term.is_empty()
            })
            .collect()
    }
}

/// Reads the availability flag out of whichever shape the backend answered with.
pub fn parse_availability(body: &str) -> Result<bool, ApiError> {
    let value: Value = parse_body(body)?;
    match &value {
        Value::Bool(available) => Ok(*available),
        Value::Object(map) => {
            if let Some(available) = map.get("available").and_then(Value::as_bool) {
                Ok(available)
            } else if let Some(exists) = map.get("exists").and_then(Value::as_bool) {
                Ok(!exists)
            } else {
                Err(ApiError::Parse(format!("no availability flag in {value}")))
            }
        }
        _ => Err(ApiError::Parse(format!("no availability flag in {value}"))),
    }
}

fn settle(
    role: UserRole,
    result: Result<Vec<UserProfile>, ApiError>,
    failures: &mut Vec<ApiError>,
) -> Vec<UserProfile> {
    match result {
        Ok(users) => users,
        Err(err) => {
            warn!(%role, error = %err, "directory listing failed");
            failures.push(err);
            Vec::new()
        }
    }
}

impl ApiClient {
    pub async fn fetch_profile(&self, firebase_uid: &str) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(&["api", "auth", "user", firebase_uid])?;
        self.get_json(url).await
    }

    pub async fn register_user(&self, user: &NewUser) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(&["api", "auth", "register"])?;
        let created: Option<UserProfile> = self.send_json(Method::POST, url, user).await?;
        info!(username = %user.username, role = %user.role, "account registered");
        created.ok_or_else(|| ApiError::Parse("register returned an empty body".to_string()))
    }

    pub async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, ApiError> {
        let url = self.endpoint(&["api", "auth", "user", &profile.firebase_uid])?;
        let updated: Option<UserProfile> = self.send_json(Method::PUT, url, profile).await?;
        Ok(updated.unwrap_or_else(|| profile.clone()))
    }

    pub async fn check_username(&self, username: &str) -> Result<bool, ApiError> {
        let url = self.endpoint(&["api", "auth", "check-username", username.trim()])?;
        let body = self.send_empty(Method::GET, url).await?;
        parse_availability(&body)
    }

    /// Lists one kind of account. Each profile is tagged with `role`.
    pub async fn list_users(&self, role: UserRole) -> Result<Vec<UserProfile>, ApiError> {
        let url = self.endpoint(&["api", role.path_segment()])?;
        let mut users = self.get_listing::<UserProfile>(url).await?.into_items();
        for user in &mut users {
            user.role.get_or_insert(role);
        }
        Ok(users)
    }

    /// Fetches participants, organizers and organizations concurrently. A
    /// failing bucket stays empty; the call fails only when every bucket does.
    pub async fn fetch_directory(&self) -> Result<Directory, ApiError> {
        let (participants, organizers, organizations) = tokio::join!(
            self.list_users(UserRole::Participant),
            self.list_users(UserRole::Organizer),
            self.list_users(UserRole::Organization),
        );

        let mut failures = Vec::new();
        let directory = Directory {
            participants: settle(UserRole::Participant, participants, &mut failures),
            organizers: settle(UserRole::Organizer, organizers, &mut failures),
            organizations: settle(UserRole::Organization, organizations, &mut failures),
        };

        if failures.len() == 3 {
            return Err(failures.remove(0));
        }
        Ok(directory)
    }

    pub async fn pending_verifications(
        &self,
        role: UserRole,
    ) -> Result<Vec<UserProfile>, ApiError> {
        let url = self.endpoint(&["api", role.path_segment(), "pending"])?;
        Ok(self.get_listing(url).await?.into_items())
    }

    pub async fn approve_user(&self, role: UserRole, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", role.path_segment(), id, "approve"])?;
        self.send_empty(Method::PUT, url).await?;
        info!(%role, id, "account approved");
        Ok(())
    }

    pub async fn reject_user(&self, role: UserRole, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", role.path_segment(), id, "reject"])?;
        self.send_empty(Method::DELETE, url).await?;
        info!(%role, id, "account rejected");
        Ok(())
    }

    pub async fn toggle_verification(&self, role: UserRole, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&[
            "api",
            "admin",
            "users",
            role.path_segment(),
            id,
            "toggle-verification",
        ])?;
        self.send_empty(Method::PUT, url).await?;
        info!(%role, id, "verification toggled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, name: &str, email: &str) -> UserProfile {
        UserProfile {
            id: uid.to_string(),
            firebase_uid: uid.to_string(),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn directory_search_matches_any_name_field() {
        let directory = Directory {
            participants: vec![user("p1", "Rahim Uddin", "rahim@example.com")],
            organizers: vec![user("o1", "Karim", "events@karim.dev")],
            organizations: vec![user("g1", "BUET CSE Club", "club@buet.ac.bd")],
        };

        let names: Vec<_> = directory
            .search("KARIM", None)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(names, vec!["o1"]);

        let names: Vec<_> = directory
            .search("buet", None)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(names, vec!["g1"]);

        assert_eq!(directory.search("", Some("p1")).len(), 2);
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn availability_accepts_several_shapes() {
        assert!(parse_availability("true").expect("bool"));
        assert!(!parse_availability(r#"{"available": false}"#).expect("available"));
        assert!(!parse_availability(r#"{"exists": true}"#).expect("exists"));
        assert!(parse_availability(r#"{"status": "ok"}"#).is_err());
    }
}
