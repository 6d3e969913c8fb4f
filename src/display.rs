use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::discovery::{trending_score, BucketItem, DashboardStats, DiscoveryView};
use crate::models::{Event, EventScope, EventType, Skill, UserProfile};

fn local_time(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz)
        .format("%a %b %e, %Y @ %l:%M %p")
        .to_string()
}

fn event_type_label(event: &Event) -> &'static str {
    match event.event_type {
        Some(EventType::OnSite) => "On-site",
        Some(EventType::Online) => "Online",
        Some(EventType::Hybrid) => "Hybrid",
        Some(EventType::Unknown) | None => "Event",
    }
}

/// One-line summary used in lists.
pub fn render_event_line(event: &Event, tz: Tz) -> String {
    let when = event
        .first_start()
        .map(|start| local_time(start, tz))
        .unwrap_or_else(|| "Date TBA".to_string());
    let status = if event.is_active { "" } else { " [inactive]" };
    format!(
        "[{id}] {title}{status} | {kind} | {when} | going {going} · saved {saved} · score {score}",
        id = event.id,
        title = event.display_title(),
        kind = event_type_label(event),
        going = event.going_count(),
        saved = event.bookmark_count(),
        score = trending_score(event),
    )
}

pub fn render_event_detail(event: &Event, tz: Tz) -> String {
    let mut lines = vec![
        event.display_title(),
        format!(
            "{} · {}",
            event_type_label(event),
            match event.event_scope {
                Some(EventScope::Private) => "Private",
                _ => "Public",
            }
        ),
        format!(
            "Where: {}",
            event
                .location
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "Online".to_string())
        ),
    ];

    if !event.description.trim().is_empty() {
        lines.push(String::new());
        lines.push(event.description.trim().to_string());
        lines.push(String::new());
    }

    for slot in &event.timeslots {
        let start = slot.start.map(|dt| local_time(dt, tz));
        let end = slot.end.map(|dt| local_time(dt, tz));
        lines.push(format!(
            "🗓 {}: {} → {}",
            if slot.title.trim().is_empty() { "Session" } else { slot.title.trim() },
            start.unwrap_or_else(|| "TBA".to_string()),
            end.unwrap_or_else(|| "TBA".to_string()),
        ));
    }

    if !event.required_skills.is_empty() {
        lines.push(format!("Skills: {}", event.required_skills.join(", ")));
    }
    if !event.sponsors.is_empty() {
        lines.push(format!("Sponsors: {}", event.sponsors.join(", ")));
    }
    if let Some(cover) = &event.cover_image_url {
        lines.push(format!("Cover: {cover}"));
    }
    lines.push(format!(
        "Going: {} · Bookmarked: {} · {}",
        event.going_count(),
        event.bookmark_count(),
        if event.is_active { "Active" } else { "Inactive" }
    ));

    lines.join("\n")
}

pub fn render_view(view: &DiscoveryView<'_>, tz: Tz) -> String {
    if view.events.is_empty() {
        return "No events match.".to_string();
    }
    let mut lines: Vec<String> = view
        .events
        .iter()
        .map(|event| render_event_line(event, tz))
        .collect();
    lines.push(format!(
        "Showing {} of {} (page {}){}",
        view.events.len(),
        view.matched,
        view.page,
        if view.has_more { " · more available with --page" } else { "" }
    ));
    lines.join("\n")
}

pub fn render_bucket(name: &str, items: &[BucketItem<'_>], tz: Tz) -> String {
    let mut lines = vec![format!("== {name} ({})", items.len())];
    lines.extend(items.iter().map(|item| {
        format!(
            "  in {}d · {} · {}",
            item.days_until,
            local_time(item.starts_at, tz),
            item.event.display_title()
        )
    }));
    lines.join("\n")
}

pub fn render_user_line(user: &UserProfile) -> String {
    let role = user
        .role
        .map(|role| role.to_string())
        .unwrap_or_else(|| "user".to_string());
    format!(
        "[{id}] {name}{verified} ({role}) · {followers} followers · uid {uid}",
        id = user.id,
        name = user.display_name(),
        verified = if user.is_verified { " ✔" } else { "" },
        followers = user.followers.len(),
        uid = user.firebase_uid,
    )
}

pub fn render_skill_line(skill: &Skill) -> String {
    match skill.description.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(description) => format!("[{}] {}: {}", skill.id, skill.name, description.trim()),
        None => format!("[{}] {}", skill.id, skill.name),
    }
}

pub fn render_stats(stats: &DashboardStats) -> String {
    format!(
        "Hosted events: {}\nActive: {}\nRegistrations: {}\nBookmarks: {}",
        stats.hosted, stats.active, stats.registrations, stats.bookmarks
    )
}
