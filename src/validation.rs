use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{EventType, MailRequest, NewEvent};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.]{3,30}$").expect("valid username regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username must be 3-30 letters, digits, '_' or '.'")]
    Username,
    #[error("email address is not valid")]
    Email,
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("timeslot {0} ends before it starts")]
    TimeslotOrder(usize),
    #[error("timeslot {0} needs a start and an end")]
    TimeslotIncomplete(usize),
    #[error("co-host {0} is listed more than once")]
    DuplicateCoHost(String),
    #[error("the owner cannot also be a co-host")]
    OwnerAsCoHost,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(username.trim()) {
        Ok(())
    } else {
        Err(ValidationError::Username)
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(ValidationError::Email)
    }
}

/// Collects every problem with a draft so the form can show them together.
pub fn validate_event(draft: &NewEvent) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    if draft.title.trim().is_empty() {
        issues.push(ValidationError::Missing("title"));
    }
    if draft.description.trim().is_empty() {
        issues.push(ValidationError::Missing("description"));
    }
    let has_location = draft
        .location
        .as_deref()
        .map(|location| !location.trim().is_empty())
        .unwrap_or(false);
    if draft.event_type != EventType::Online && !has_location {
        issues.push(ValidationError::Missing("location"));
    }

    if draft.timeslots.is_empty() {
        issues.push(ValidationError::Missing("timeslot"));
    }
    for (index, slot) in draft.timeslots.iter().enumerate() {
        let number = index + 1;
        match (slot.start, slot.end) {
            (Some(start), Some(end)) if end <= start => {
                issues.push(ValidationError::TimeslotOrder(number))
            }
            (Some(_), Some(_)) => {}
            _ => issues.push(ValidationError::TimeslotIncomplete(number)),
        }
    }

    let mut seen = HashSet::new();
    for co_host in &draft.co_hosts {
        if !seen.insert(co_host.as_str()) {
            issues.push(ValidationError::DuplicateCoHost(co_host.clone()));
        }
    }
    if let Some(owner) = &draft.owner_id {
        if draft.co_hosts.contains(owner) {
            issues.push(ValidationError::OwnerAsCoHost);
        }
    }

    issues
}

pub fn validate_mail(mail: &MailRequest) -> Vec<ValidationError> {
    let mut issues = Vec::new();
    if mail.subject.trim().is_empty() {
        issues.push(ValidationError::Missing("subject"));
    }
    if mail.body.trim().is_empty() {
        issues.push(ValidationError::Missing("body"));
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_timestamp, Timeslot};

    fn slot(start: &str, end: &str) -> Timeslot {
        Timeslot {
            title: "Main".into(),
            start: parse_timestamp(start),
            end: parse_timestamp(end),
        }
    }

    fn draft() -> NewEvent {
        NewEvent {
            title: "Dev Conf".into(),
            description: "A day of talks".into(),
            location: Some("Dhaka".into()),
            event_type: EventType::OnSite,
            owner_id: Some("org-1".into()),
            timeslots: vec![slot("2024-07-01T09:00:00Z", "2024-07-01T17:00:00Z")],
            ..Default::default()
        }
    }

    #[test]
    fn usernames() {
        assert!(validate_username("rahim_99").is_ok());
        assert!(validate_username("a.b").is_ok());
        assert_eq!(validate_username("ab"), Err(ValidationError::Username));
        assert_eq!(validate_username("has space"), Err(ValidationError::Username));
    }

    #[test]
    fn emails() {
        assert!(validate_email("someone@example.com").is_ok());
        assert!(validate_email("nobody@localhost").is_err());
        assert!(validate_email("two@@example.com").is_err());
    }

    #[test]
    fn valid_draft_has_no_issues() {
        assert!(validate_event(&draft()).is_empty());
    }

    #[test]
    fn online_events_need_no_location() {
        let mut online = draft();
        online.event_type = EventType::Online;
        online.location = None;
        assert!(validate_event(&online).is_empty());

        online.event_type = EventType::Hybrid;
        assert_eq!(
            validate_event(&online),
            vec![ValidationError::Missing("location")]
        );
    }

    #[test]
    fn all_issues_are_reported() {
        let mut bad = draft();
        bad.title = " ".into();
        bad.timeslots = vec![
            slot("2024-07-01T17:00:00Z", "2024-07-01T09:00:00Z"),
            Timeslot::default(),
        ];
        bad.co_hosts = vec!["u1".into(), "u1".into(), "org-1".into()];

        assert_eq!(
            validate_event(&bad),
            vec![
                ValidationError::Missing("title"),
                ValidationError::TimeslotOrder(1),
                ValidationError::TimeslotIncomplete(2),
                ValidationError::DuplicateCoHost("u1".into()),
                ValidationError::OwnerAsCoHost,
            ]
        );
    }

    #[test]
    fn mail_needs_subject_and_body() {
        let mail = MailRequest {
            subject: "".into(),
            body: "See you there".into(),
        };
        assert_eq!(validate_mail(&mail), vec![ValidationError::Missing("subject")]);
    }
}
