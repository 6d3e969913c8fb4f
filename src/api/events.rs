use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{ApiClient, ApiError, Listing};
use crate::models::{id_from_value, Event, MailRequest, NewEvent, UserProfile};

/// Page size used when walking a paginated endpoint to the end.
pub const FETCH_PAGE_SIZE: u32 = 50;
const MAX_PAGES: u32 = 200;

/// Keys the backend may use for the active flag.
const ACTIVE_KEYS: [&str; 2] = ["isActive", "active"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Registered,
    Bookmarked,
}

impl Membership {
    fn key(self) -> &'static str {
        match self {
            Membership::Registered => "registeredBy",
            Membership::Bookmarked => "bookmarkedBy",
        }
    }
}

/// An event exactly as the backend sent it.
///
/// Writes patch this document instead of re-encoding [`Event`], so aliased
/// keys (`active`, `startTime`, `coverImage`), enum spellings and timestamps
/// the client cannot parse go back byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDocument {
    fields: Map<String, Value>,
}

impl EventDocument {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ApiError::Parse(format!("expected an event object, got {other}"))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn event(&self) -> Result<Event, ApiError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|err| ApiError::Parse(err.to_string()))
    }

    /// Adds or removes `user_id` in the chosen list. Returns whether the document changed.
    pub fn apply_membership(&mut self, membership: Membership, user_id: &str, join: bool) -> bool {
        let key = membership.key();
        let is_user = |item: &Value| id_from_value(item).as_deref() == Some(user_id);
        let present = self
            .fields
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().any(is_user))
            .unwrap_or(false);

        match (join, present) {
            (true, false) => {
                let slot = self
                    .fields
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Value::Array(items) = slot {
                    let member = member_value(items, user_id);
                    items.push(member);
                }
                true
            }
            (false, true) => {
                if let Some(Value::Array(items)) = self.fields.get_mut(key) {
                    items.retain(|item| !is_user(item));
                }
                true
            }
            _ => false,
        }
    }

    /// Writes the flag under every key the backend used, or `isActive` when
    /// it sent none. Returns whether the document changed.
    pub fn set_active(&mut self, active: bool) -> bool {
        let mut found = false;
        let mut changed = false;
        for key in ACTIVE_KEYS {
            if let Some(slot) = self.fields.get_mut(key) {
                found = true;
                if slot.as_bool() != Some(active) {
                    *slot = Value::Bool(active);
                    changed = true;
                }
            }
        }
        if !found {
            self.fields.insert(ACTIVE_KEYS[0].to_string(), Value::Bool(active));
            changed = true;
        }
        changed
    }
}

/// Numeric id lists stay numeric.
fn member_value(items: &[Value], user_id: &str) -> Value {
    match (items.first(), user_id.parse::<u64>()) {
        (Some(Value::Number(_)), Ok(id)) => Value::from(id),
        _ => Value::String(user_id.to_string()),
    }
}

impl ApiClient {
    /// `page` is the backend's zero-based page index.
    pub async fn list_events(&self, page: u32, size: u32) -> Result<Listing<Event>, ApiError> {
        let url = self.endpoint_with_query(
            &["api", "events"],
            &[("page", page.to_string()), ("size", size.to_string())],
        )?;
        self.get_listing(url).await
    }

    pub async fn fetch_all_events(&self) -> Result<Vec<Event>, ApiError> {
        let mut events = Vec::new();
        for page in 0..MAX_PAGES {
            let listing = self.list_events(page, FETCH_PAGE_SIZE).await?;
            let last = listing.is_last() || listing.items().is_empty();
            events.extend(listing.into_items());
            if last {
                break;
            }
        }
        debug!(count = events.len(), "fetched events");
        Ok(events)
    }

    pub async fn get_event(&self, id: &str) -> Result<Event, ApiError> {
        let url = self.endpoint(&["api", "events", id])?;
        self.get_json(url).await
    }

    pub async fn create_event(&self, draft: &NewEvent) -> Result<Event, ApiError> {
        let url = self.endpoint(&["api", "events"])?;
        let created: Option<Event> = self.send_json(Method::POST, url, draft).await?;
        let created = created
            .ok_or_else(|| ApiError::Parse("create event returned an empty body".to_string()))?;
        info!(event_id = %created.id, title = %created.title, "event created");
        Ok(created)
    }

    pub async fn get_event_document(&self, id: &str) -> Result<EventDocument, ApiError> {
        let url = self.endpoint(&["api", "events", id])?;
        EventDocument::from_value(self.get_json(url).await?)
    }

    /// PUTs the document. Falls back to the sent document when the backend
    /// answers with an empty or non-object body.
    pub async fn update_event(
        &self,
        id: &str,
        document: &EventDocument,
    ) -> Result<Event, ApiError> {
        let url = self.endpoint(&["api", "events", id])?;
        let updated: Option<Value> = self.send_json(Method::PUT, url, document.fields()).await?;
        match updated {
            Some(Value::Object(fields)) => EventDocument { fields }.event(),
            _ => document.event(),
        }
    }

    pub async fn delete_event(&self, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "events", id])?;
        self.send_empty(Method::DELETE, url).await?;
        info!(event_id = %id, "event deleted");
        Ok(())
    }

    /// Re-reads the event and PUTs it back with the active flag set.
    pub async fn set_event_active(&self, event_id: &str, active: bool) -> Result<Event, ApiError> {
        let mut document = self.get_event_document(event_id).await?;
        if !document.set_active(active) {
            debug!(event_id, active, "active flag unchanged");
            return document.event();
        }
        let updated = self.update_event(event_id, &document).await?;
        info!(event_id, active, "event active flag changed");
        Ok(updated)
    }

    /// Re-reads the event, flips the user's membership and PUTs it back.
    /// No request is sent when the membership already matches.
    pub async fn set_membership(
        &self,
        event_id: &str,
        membership: Membership,
        user_id: &str,
        join: bool,
    ) -> Result<Event, ApiError> {
        let mut document = self.get_event_document(event_id).await?;
        if !document.apply_membership(membership, user_id, join) {
            debug!(event_id, user_id, ?membership, join, "membership unchanged");
            return document.event();
        }
        self.update_event(event_id, &document).await
    }

    pub async fn register_for_event(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Event, ApiError> {
        self.set_membership(event_id, Membership::Registered, user_id, true)
            .await
    }

    pub async fn unregister_from_event(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Event, ApiError> {
        self.set_membership(event_id, Membership::Registered, user_id, false)
            .await
    }

    pub async fn registered_participants(
        &self,
        event_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Listing<UserProfile>, ApiError> {
        let url = self.endpoint_with_query(
            &["api", "events", event_id, "registered-participants"],
            &[("page", page.to_string()), ("size", size.to_string())],
        )?;
        self.get_listing(url).await
    }

    pub async fn all_registered_participants(
        &self,
        event_id: &str,
    ) -> Result<Vec<UserProfile>, ApiError> {
        let mut participants = Vec::new();
        for page in 0..MAX_PAGES {
            let listing = self
                .registered_participants(event_id, page, FETCH_PAGE_SIZE)
                .await?;
            let last = listing.is_last() || listing.items().is_empty();
            participants.extend(listing.into_items());
            if last {
                break;
            }
        }
        Ok(participants)
    }

    pub async fn send_event_mail(
        &self,
        event_id: &str,
        mail: &MailRequest,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "events", event_id, "send-mail"])?;
        let _: Option<serde_json::Value> = self.send_json(Method::POST, url, mail).await?;
        info!(event_id, subject = %mail.subject, "mail sent to registrants");
        Ok(())
    }

    /// Runs the backend's expiry job now instead of waiting for its schedule.
    pub async fn deactivate_expired_events(&self) -> Result<String, ApiError> {
        let url = self.endpoint(&["api", "scheduled-tasks", "deactivate-expired-events"])?;
        let body = self.send_empty(Method::POST, url).await?;
        info!("expired events deactivated");
        Ok(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn document(value: Value) -> EventDocument {
        EventDocument::from_value(value).expect("event object")
    }

    #[test]
    fn membership_changes_only_when_needed() {
        let mut doc = document(json!({ "id": "e1", "registeredBy": ["u1"] }));

        assert!(!doc.apply_membership(Membership::Registered, "u1", true));
        assert!(doc.apply_membership(Membership::Registered, "u2", true));
        assert_eq!(doc.fields()["registeredBy"], json!(["u1", "u2"]));

        assert!(doc.apply_membership(Membership::Bookmarked, "u1", true));
        assert_eq!(doc.fields()["bookmarkedBy"], json!(["u1"]));

        assert!(doc.apply_membership(Membership::Registered, "u1", false));
        assert!(!doc.apply_membership(Membership::Registered, "u1", false));
        assert_eq!(doc.event().expect("event").registered_by, vec!["u2"]);
    }

    #[test]
    fn membership_keeps_the_list_shape() {
        let mut doc = document(json!({
            "id": 3,
            "registeredBy": [4, 5],
            "bookmarkedBy": [{ "id": 7, "name": "Nadia" }, { "id": 8 }],
        }));

        assert!(doc.apply_membership(Membership::Registered, "9", true));
        assert_eq!(doc.fields()["registeredBy"], json!([4, 5, 9]));

        assert!(doc.apply_membership(Membership::Bookmarked, "8", false));
        assert_eq!(doc.fields()["bookmarkedBy"], json!([{ "id": 7, "name": "Nadia" }]));

        let mut empty = document(json!({ "id": 4, "bookmarkedBy": null }));
        assert!(!empty.apply_membership(Membership::Bookmarked, "u1", false));
        assert!(empty.apply_membership(Membership::Bookmarked, "u1", true));
        assert_eq!(empty.fields()["bookmarkedBy"], json!(["u1"]));
    }

    #[test]
    fn writes_leave_aliased_fields_as_received() {
        let received = json!({
            "id": "e1",
            "title": "Dev Conf",
            "active": true,
            "eventType": "ONSITE",
            "coverImage": "https://img.example.com/x.png",
            "createdAt": "01/06/2024 10:30",
            "registeredBy": [],
            "timeslots": [{
                "title": "Day one",
                "startTime": "2024-07-01T09:00:00Z",
                "endTime": "2024-07-01T17:00:00Z"
            }]
        });
        let mut doc = document(received.clone());

        assert!(doc.apply_membership(Membership::Registered, "u9", true));
        assert!(doc.set_active(false));
        assert!(!doc.set_active(false));

        let mut expected = received;
        expected["registeredBy"] = json!(["u9"]);
        expected["active"] = json!(false);
        assert_eq!(Value::Object(doc.fields().clone()), expected);

        let event = doc.event().expect("event");
        assert!(!event.is_active);
        assert!(event.timeslots[0].start.is_some());
    }

    #[test]
    fn active_flag_defaults_to_is_active() {
        let mut doc = document(json!({ "id": "e2" }));
        assert!(doc.set_active(true));
        assert_eq!(doc.fields()["isActive"], json!(true));
        assert!(!doc.fields().contains_key("active"));
    }
}
