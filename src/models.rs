use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    #[serde(alias = "ONSITE", alias = "ON_SITE", alias = "onsite", alias = "on_site")]
    OnSite,
    #[serde(alias = "ONLINE")]
    Online,
    #[serde(alias = "HYBRID")]
    Hybrid,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    #[serde(alias = "PUBLIC")]
    Public,
    #[serde(alias = "PRIVATE")]
    Private,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timeslot {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "startTime", deserialize_with = "de_opt_datetime")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, alias = "endTime", deserialize_with = "de_opt_datetime")]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub event_scope: Option<EventScope>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub owner_id: Option<String>,
    #[serde(default, deserialize_with = "de_id_list")]
    pub co_hosts: Vec<String>,
    #[serde(default, deserialize_with = "de_string_list")]
    pub sponsors: Vec<String>,
    #[serde(default, deserialize_with = "de_string_list")]
    pub required_skills: Vec<String>,
    #[serde(default, deserialize_with = "de_id_list")]
    pub registered_by: Vec<String>,
    #[serde(default, deserialize_with = "de_id_list")]
    pub bookmarked_by: Vec<String>,
    #[serde(default, alias = "coverImage")]
    pub cover_image_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "active")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "de_null_default")]
    pub timeslots: Vec<Timeslot>,
    /// Fields the client does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn display_title(&self) -> String {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            "Untitled Event".to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn going_count(&self) -> usize {
        self.registered_by.len()
    }

    pub fn bookmark_count(&self) -> usize {
        self.bookmarked_by.len()
    }

    /// Owner or co-host.
    pub fn is_hosted_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id) || self.co_hosts.iter().any(|id| id == user_id)
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        self.registered_by.iter().any(|id| id == user_id)
    }

    pub fn is_bookmarked(&self, user_id: &str) -> bool {
        self.bookmarked_by.iter().any(|id| id == user_id)
    }

    pub fn first_start(&self) -> Option<DateTime<Utc>> {
        self.timeslots.iter().filter_map(|slot| slot.start).min()
    }

    /// Latest timeslot end. `None` when there are no timeslots or any slot has no end.
    pub fn last_end(&self) -> Option<DateTime<Utc>> {
        let ends = self
            .timeslots
            .iter()
            .map(|slot| slot.end)
            .collect::<Option<Vec<_>>>()?;
        ends.into_iter().max()
    }
}

/// Payload for `POST /api/events`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub event_type: EventType,
    #[serde(default = "default_scope")]
    pub event_scope: EventScope,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub co_hosts: Vec<String>,
    #[serde(default)]
    pub sponsors: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub timeslots: Vec<Timeslot>,
}

impl Default for EventType {
    fn default() -> Self {
        EventType::OnSite
    }
}

fn default_scope() -> EventScope {
    EventScope::Public
}

impl Default for EventScope {
    fn default() -> Self {
        default_scope()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "active")]
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[serde(alias = "ADMIN")]
    Admin,
    #[serde(alias = "ORGANIZATION")]
    Organization,
    #[serde(alias = "ORGANIZER")]
    Organizer,
    #[serde(alias = "PARTICIPANT")]
    Participant,
}

impl UserRole {
    /// Path segment the backend uses for this kind of account.
    pub fn path_segment(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Organization => "organization",
            UserRole::Organizer => "organizer",
            UserRole::Participant => "participant",
        }
    }

    pub fn can_host_events(&self) -> bool {
        matches!(self, UserRole::Organization | UserRole::Organizer)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "organization" | "org" => Ok(UserRole::Organization),
            "organizer" => Ok(UserRole::Organizer),
            "participant" => Ok(UserRole::Participant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub firebase_uid: String,
    #[serde(default, alias = "organizationName", alias = "fullName")]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "profilePicture")]
    pub profile_picture_url: Option<String>,
    #[serde(default, deserialize_with = "de_id_list")]
    pub followers: Vec<String>,
    #[serde(default, deserialize_with = "de_id_list")]
    pub following: Vec<String>,
    #[serde(default, alias = "verified")]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_super_admin: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        [&self.name, &self.username, &self.email]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "Unnamed user".to_string())
    }
}

/// Payload for account sign-up.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub firebase_uid: String,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MailRequest {
    pub subject: String,
    pub body: String,
}

/// Parses the timestamp shapes the backend emits: RFC 3339, zone-less ISO
/// local date-times (taken as UTC) and bare dates.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("firebaseUid"))
            .and_then(id_from_value),
        _ => None,
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        other => id_from_value(&other)
            .ok_or_else(|| de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => id_from_value(&other)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn de_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.iter().filter_map(id_from_value).collect()),
        other => Err(de::Error::custom(format!("expected id list, got {other}"))),
    }
}

fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(de::Error::custom(format!("expected string list, got {other}"))),
    }
}

fn de_opt_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => parse_timestamp(&s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn decodes_backend_event_shape() {
        let payload = json!({
            "id": 42,
            "title": "Dev Conf 2024",
            "eventType": "ONSITE",
            "eventScope": "public",
            "ownerId": 7,
            "coHosts": [8, "9"],
            "requiredSkills": [{"name": "Rust"}, "SQL"],
            "registeredBy": ["u1", "u2"],
            "bookmarkedBy": null,
            "createdAt": "2024-06-01T10:30:00",
            "active": true,
            "timeslots": [{"title": "Day 1", "start": "2024-07-01T09:00:00Z", "end": "2024-07-01T17:00:00Z"}],
            "meetingLink": "https://meet.example.com/x"
        });

        let event: Event = serde_json::from_value(payload).expect("decode event");
        assert_eq!(event.id, "42");
        assert_eq!(event.owner_id.as_deref(), Some("7"));
        assert_eq!(event.co_hosts, vec!["8", "9"]);
        assert_eq!(event.required_skills, vec!["Rust", "SQL"]);
        assert_eq!(event.going_count(), 2);
        assert_eq!(event.bookmark_count(), 0);
        assert_eq!(event.event_type, Some(EventType::OnSite));
        assert!(event.is_active);
        assert_eq!(
            event.created_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap())
        );
        assert_eq!(
            event.extra.get("meetingLink"),
            Some(&json!("https://meet.example.com/x"))
        );
        assert!(event.is_hosted_by("9"));
        assert!(!event.is_hosted_by("10"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let event: Event =
            serde_json::from_value(json!({"id": "e1", "title": "x", "capacity": 120}))
                .expect("decode");
        let encoded = serde_json::to_value(&event).expect("encode");
        assert_eq!(encoded["capacity"], json!(120));
        assert_eq!(encoded["title"], json!("x"));
    }

    #[test]
    fn unknown_event_type_does_not_reject_the_event() {
        let event: Event =
            serde_json::from_value(json!({"id": "e1", "eventType": "metaverse"})).expect("decode");
        assert_eq!(event.event_type, Some(EventType::Unknown));
    }

    #[test]
    fn timestamps_accept_common_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T06:00:00+06:00"), Some(expected));
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn user_display_name_falls_back() {
        let mut user = UserProfile {
            email: Some("a@example.com".into()),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "a@example.com");
        user.username = Some("alice".into());
        assert_eq!(user.display_name(), "alice");
        user.name = Some("  ".into());
        assert_eq!(user.display_name(), "alice");
    }

    #[test]
    fn role_parses_from_cli_text() {
        assert_eq!("Organizer".parse::<UserRole>(), Ok(UserRole::Organizer));
        assert_eq!("org".parse::<UserRole>(), Ok(UserRole::Organization));
        assert!("guest".parse::<UserRole>().is_err());
    }
}
