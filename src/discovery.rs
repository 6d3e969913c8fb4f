//! Event discovery: filter, sort and paginate an in-memory event list.
//!
//! Data only flows one way: full list, then the filtered subset, then the
//! sorted copy, then the visible prefix. The source list is never reordered.

use std::{cmp::Reverse, collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Event;
use crate::utils::contains_ignore_case;

pub const PAGE_SIZE: usize = 6;
pub const GOING_WEIGHT: usize = 3;
pub const BOOKMARK_WEIGHT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    #[default]
    Name,
    Skill,
    Orgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Latest,
    Trending,
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SearchType::Name),
            "skill" | "skills" => Ok(SearchType::Skill),
            "orgs" | "org" | "organizations" => Ok(SearchType::Orgs),
            other => Err(format!("unknown search type: {other}")),
        }
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" => Ok(SortMode::Latest),
            "trending" => Ok(SortMode::Trending),
            other => Err(format!("unknown sort mode: {other}")),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortMode::Latest => "latest",
            SortMode::Trending => "trending",
        })
    }
}

/// `3 × going + 1 × bookmarked`. Every trending ordering goes through here.
pub fn trending_score(event: &Event) -> usize {
    GOING_WEIGHT * event.going_count() + BOOKMARK_WEIGHT * event.bookmark_count()
}

pub fn filter_by_name<'a>(events: &'a [Event], term: &str) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|event| contains_ignore_case(&event.title, term))
        .collect()
}

/// Keeps events requiring any selected skill. No selection keeps everything.
pub fn filter_by_skills<'a>(events: &'a [Event], skills: &[String]) -> Vec<&'a Event> {
    if skills.is_empty() {
        return events.iter().collect();
    }
    let selected: Vec<String> = skills.iter().map(|skill| skill.to_lowercase()).collect();
    events
        .iter()
        .filter(|event| {
            event
                .required_skills
                .iter()
                .any(|required| selected.contains(&required.to_lowercase()))
        })
        .collect()
}

/// Keeps events owned or co-hosted by any selected account. No selection keeps everything.
pub fn filter_by_hosts<'a>(events: &'a [Event], host_ids: &[String]) -> Vec<&'a Event> {
    if host_ids.is_empty() {
        return events.iter().collect();
    }
    events
        .iter()
        .filter(|event| host_ids.iter().any(|id| event.is_hosted_by(id)))
        .collect()
}

/// Most recent first. Equal or missing timestamps keep their input order.
pub fn sort_latest(events: &mut [&Event]) {
    events.sort_by_key(|event| Reverse(event.created_at));
}

/// Highest score first; equal scores keep their input order.
pub fn sort_trending(events: &mut [&Event]) {
    events.sort_by_key(|event| Reverse(trending_score(event)));
}

pub fn sort_events(events: &mut [&Event], mode: SortMode) {
    match mode {
        SortMode::Latest => sort_latest(events),
        SortMode::Trending => sort_trending(events),
    }
}

#[derive(Debug, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub has_more: bool,
    pub total: usize,
}

/// The first `page × page_size` items. Pages are 1-based; 0 is read as 1.
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> Page<'_, T> {
    let wanted = page.max(1).saturating_mul(page_size);
    let visible = wanted.min(items.len());
    Page {
        items: &items[..visible],
        has_more: wanted < items.len(),
        total: items.len(),
    }
}

/// Everything the list view lets a person change. Each setter sends the
/// view back to page one, except `load_more`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    term: String,
    search_type: SearchType,
    skills: Vec<String>,
    hosts: Vec<String>,
    sort: SortMode,
    page: usize,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            term: String::new(),
            search_type: SearchType::default(),
            skills: Vec::new(),
            hosts: Vec::new(),
            sort: SortMode::default(),
            page: 1,
        }
    }
}

impl SearchState {
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn selected_skills(&self) -> &[String] {
        &self.skills
    }

    pub fn selected_hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn set_term(&mut self, term: impl Into<String>) {
        self.term = term.into();
        self.page = 1;
    }

    pub fn set_search_type(&mut self, search_type: SearchType) {
        self.search_type = search_type;
        self.page = 1;
    }

    /// Adds the skill, or removes it if already selected (case-insensitive).
    pub fn toggle_skill(&mut self, name: &str) {
        let before = self.skills.len();
        self.skills.retain(|skill| !skill.eq_ignore_ascii_case(name));
        if self.skills.len() == before {
            self.skills.push(name.to_string());
        }
        self.page = 1;
    }

    pub fn toggle_host(&mut self, id: &str) {
        let before = self.hosts.len();
        self.hosts.retain(|host| host != id);
        if self.hosts.len() == before {
            self.hosts.push(id.to_string());
        }
        self.page = 1;
    }

    pub fn clear_selection(&mut self) {
        self.skills.clear();
        self.hosts.clear();
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortMode) {
        self.sort = sort;
        self.page = 1;
    }

    pub fn load_more(&mut self) {
        self.page += 1;
    }

    /// Only the discriminator chosen by `search_type` is consulted.
    pub fn filter<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        match self.search_type {
            SearchType::Name => filter_by_name(events, &self.term),
            SearchType::Skill => filter_by_skills(events, &self.skills),
            SearchType::Orgs => filter_by_hosts(events, &self.hosts),
        }
    }

    pub fn apply<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        let mut matched = self.filter(events);
        sort_events(&mut matched, self.sort);
        matched
    }
}

/// Owns one fetched batch of events plus the search state over it.
#[derive(Debug, Default)]
pub struct Discovery {
    events: Vec<Event>,
    pub state: SearchState,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryView<'a> {
    pub events: Vec<&'a Event>,
    pub has_more: bool,
    pub matched: usize,
    pub page: usize,
}

impl Discovery {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            state: SearchState::default(),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Replaces the batch, e.g. after a re-fetch. Resets to page one.
    pub fn replace_events(&mut self, events: Vec<Event>) {
        self.events = events;
        self.state.page = 1;
    }

    pub fn remove_event(&mut self, id: &str) -> bool {
        let before = self.events.len();
        self.events.retain(|event| event.id != id);
        self.events.len() != before
    }

    pub fn view(&self) -> DiscoveryView<'_> {
        let sorted = self.state.apply(&self.events);
        let page = paginate(&sorted, self.state.page, PAGE_SIZE);
        DiscoveryView {
            events: page.items.to_vec(),
            has_more: page.has_more,
            matched: page.total,
            page: self.state.page,
        }
    }
}

/// Home page "trending" strip.
pub fn top_trending(events: &[Event], limit: usize) -> Vec<&Event> {
    let mut sorted: Vec<&Event> = events.iter().filter(|event| event.is_active).collect();
    sort_trending(&mut sorted);
    sorted.truncate(limit);
    sorted
}

/// Home page "latest" strip.
pub fn latest(events: &[Event], limit: usize) -> Vec<&Event> {
    let mut sorted: Vec<&Event> = events.iter().filter(|event| event.is_active).collect();
    sort_latest(&mut sorted);
    sorted.truncate(limit);
    sorted
}

/// True once every timeslot has ended. Events without timeslots, or with a
/// slot that has no end, never expire here.
pub fn is_expired(event: &Event, now: DateTime<Utc>) -> bool {
    event.last_end().map(|end| end < now).unwrap_or(false)
}

pub const BUCKET_KEYS: [&str; 5] = ["TODAY", "THIS_WEEK", "NEXT_WEEK", "THIS_MONTH", "LATER"];

pub fn bucket_for(days_until: i64) -> &'static str {
    match days_until {
        d if d <= 0 => "TODAY",
        d if d < 7 => "THIS_WEEK",
        d if d < 14 => "NEXT_WEEK",
        d if d < 30 => "THIS_MONTH",
        _ => "LATER",
    }
}

#[derive(Debug, Serialize)]
pub struct BucketItem<'a> {
    pub days_until: i64,
    pub starts_at: DateTime<Utc>,
    pub event: &'a Event,
}

/// Groups active events by how far away their next timeslot is.
pub fn upcoming_buckets(
    events: &[Event],
    now: DateTime<Utc>,
) -> HashMap<&'static str, Vec<BucketItem<'_>>> {
    let mut buckets: HashMap<&'static str, Vec<BucketItem<'_>>> =
        BUCKET_KEYS.iter().map(|key| (*key, Vec::new())).collect();

    for event in events.iter().filter(|event| event.is_active) {
        let next_start = event
            .timeslots
            .iter()
            .filter_map(|slot| slot.start)
            .filter(|start| *start >= now)
            .min();
        let starts_at = match next_start {
            Some(start) => start,
            None => continue,
        };
        let days_until = starts_at.signed_duration_since(now).num_seconds() / 86_400;
        if let Some(bucket) = buckets.get_mut(bucket_for(days_until)) {
            bucket.push(BucketItem {
                days_until,
                starts_at,
                event,
            });
        }
    }

    for bucket in buckets.values_mut() {
        bucket.sort_by_key(|item| item.starts_at);
    }
    buckets
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub hosted: usize,
    pub active: usize,
    pub registrations: usize,
    pub bookmarks: usize,
}

/// Totals for the events a user owns or co-hosts.
pub fn dashboard_stats(events: &[Event], host_id: &str) -> DashboardStats {
    events
        .iter()
        .filter(|event| event.is_hosted_by(host_id))
        .fold(DashboardStats::default(), |mut stats, event| {
            stats.hosted += 1;
            stats.active += usize::from(event.is_active);
            stats.registrations += event.going_count();
            stats.bookmarks += event.bookmark_count();
            stats
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_timestamp, Timeslot};
    use chrono::Duration;

    fn event(id: &str, title: &str) -> Event {
        Event {
            id: id.to_string(),
            title: title.to_string(),
            is_active: true,
            ..Default::default()
        }
    }

    fn scored(id: &str, created: &str, going: usize, bookmarked: usize) -> Event {
        Event {
            created_at: parse_timestamp(created),
            registered_by: (0..going).map(|i| format!("g{i}")).collect(),
            bookmarked_by: (0..bookmarked).map(|i| format!("b{i}")).collect(),
            ..event(id, id)
        }
    }

    fn ids(events: &[&Event]) -> Vec<String> {
        events.iter().map(|event| event.id.clone()).collect()
    }

    #[test]
    fn name_filter_is_case_insensitive_substring() {
        let events = vec![
            event("1", "Tech Conference"),
            event("2", "Hackathon"),
            event("3", "Dev Conf 2024"),
        ];
        assert_eq!(ids(&filter_by_name(&events, "conf")), vec!["1", "3"]);
        assert_eq!(ids(&filter_by_name(&events, "")), vec!["1", "2", "3"]);
    }

    #[test]
    fn skill_filter_matches_any_selected_skill() {
        let mut python = event("1", "Data day");
        python.required_skills = vec!["Python".into(), "SQL".into()];
        let mut java = event("2", "JVM night");
        java.required_skills = vec!["Java".into()];
        let events = vec![python, java];

        assert_eq!(ids(&filter_by_skills(&events, &["Python".into()])), vec!["1"]);
        assert_eq!(ids(&filter_by_skills(&events, &["python".into()])), vec!["1"]);
        assert_eq!(
            ids(&filter_by_skills(&events, &["sql".into(), "JAVA".into()])),
            vec!["1", "2"]
        );
        assert_eq!(filter_by_skills(&events, &[]).len(), 2);
    }

    #[test]
    fn host_filter_matches_owner_or_co_host() {
        let mut owned = event("1", "Owned");
        owned.owner_id = Some("org-a".into());
        let mut co_hosted = event("2", "Co-hosted");
        co_hosted.owner_id = Some("org-b".into());
        co_hosted.co_hosts = vec!["org-a".into()];
        let mut other = event("3", "Other");
        other.owner_id = Some("org-c".into());
        let events = vec![owned, co_hosted, other];

        assert_eq!(ids(&filter_by_hosts(&events, &["org-a".into()])), vec!["1", "2"]);
        assert_eq!(filter_by_hosts(&events, &[]).len(), 3);
    }

    #[test]
    fn latest_and_trending_orderings() {
        let a = scored("A", "2024-01-01", 2, 1);
        let b = scored("B", "2024-06-01", 0, 5);
        let events = vec![a, b];

        let mut latest: Vec<&Event> = events.iter().collect();
        sort_latest(&mut latest);
        assert_eq!(ids(&latest), vec!["B", "A"]);

        let mut trending: Vec<&Event> = events.iter().collect();
        sort_trending(&mut trending);
        assert_eq!(ids(&trending), vec!["A", "B"]);
        assert_eq!(trending_score(&events[0]), 7);
        assert_eq!(trending_score(&events[1]), 5);

        assert_eq!(ids(&events.iter().collect::<Vec<_>>()), vec!["A", "B"]);
    }

    #[test]
    fn trending_is_stable_for_equal_scores() {
        let events = vec![
            scored("x", "2024-01-01", 1, 0),
            scored("y", "2024-01-02", 0, 3),
            scored("z", "2024-01-03", 2, 0),
            scored("w", "2024-01-04", 1, 0),
        ];
        let mut sorted: Vec<&Event> = events.iter().collect();
        sort_trending(&mut sorted);
        assert_eq!(ids(&sorted), vec!["z", "x", "y", "w"]);
        assert!(sorted
            .windows(2)
            .all(|pair| trending_score(pair[0]) >= trending_score(pair[1])));
    }

    #[test]
    fn latest_puts_undated_events_last() {
        let mut undated = event("u", "Undated");
        undated.created_at = None;
        let events = vec![undated, scored("d", "2023-05-05", 0, 0)];
        let mut sorted: Vec<&Event> = events.iter().collect();
        sort_latest(&mut sorted);
        assert_eq!(ids(&sorted), vec!["d", "u"]);
    }

    #[test]
    fn pagination_grows_by_page_size() {
        let items: Vec<usize> = (0..14).collect();

        let first = paginate(&items, 1, 6);
        assert_eq!((first.items.len(), first.has_more), (6, true));
        let second = paginate(&items, 2, 6);
        assert_eq!((second.items.len(), second.has_more), (12, true));
        let third = paginate(&items, 3, 6);
        assert_eq!((third.items.len(), third.has_more), (14, false));
        assert_eq!(third.total, 14);

        let empty: Vec<usize> = Vec::new();
        let page = paginate(&empty, 1, 6);
        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert_eq!(paginate(&items, 0, 6).items.len(), 6);
    }

    #[test]
    fn every_filter_change_resets_the_page() {
        let mut state = SearchState::default();
        let changes: [fn(&mut SearchState); 6] = [
            |s: &mut SearchState| s.set_term("conf"),
            |s: &mut SearchState| s.set_search_type(SearchType::Skill),
            |s: &mut SearchState| s.toggle_skill("Rust"),
            |s: &mut SearchState| s.toggle_host("org-1"),
            |s: &mut SearchState| s.set_sort(SortMode::Trending),
            |s: &mut SearchState| s.clear_selection(),
        ];
        for change in changes {
            state.load_more();
            state.load_more();
            assert_eq!(state.page(), 3);
            change(&mut state);
            assert_eq!(state.page(), 1);
        }
    }

    #[test]
    fn toggling_a_skill_twice_deselects_it() {
        let mut state = SearchState::default();
        state.toggle_skill("Rust");
        state.toggle_skill("rust");
        assert!(state.selected_skills().is_empty());
    }

    #[test]
    fn search_type_picks_a_single_discriminator() {
        let mut rust = event("1", "Rust meetup");
        rust.required_skills = vec!["Rust".into()];
        let go = event("2", "Go meetup");
        let events = vec![rust, go];

        let mut state = SearchState::default();
        state.set_term("go");
        state.toggle_skill("Rust");
        assert_eq!(ids(&state.filter(&events)), vec!["2"]);

        state.set_search_type(SearchType::Skill);
        assert_eq!(ids(&state.filter(&events)), vec!["1"]);

        state.set_search_type(SearchType::Orgs);
        assert_eq!(state.filter(&events).len(), 2);
    }

    #[test]
    fn discovery_view_pages_through_sorted_results() {
        let events: Vec<Event> = (0..14)
            .map(|i| scored(&format!("e{i:02}"), &format!("2024-01-{:02}", i + 1), i % 3, 0))
            .collect();
        let mut discovery = Discovery::new(events);
        discovery.state.set_sort(SortMode::Latest);

        let view = discovery.view();
        assert_eq!(view.events.len(), 6);
        assert!(view.has_more);
        assert_eq!(view.matched, 14);
        assert_eq!(view.events[0].id, "e13");

        discovery.state.load_more();
        discovery.state.load_more();
        let view = discovery.view();
        assert_eq!(view.events.len(), 14);
        assert!(!view.has_more);

        discovery.state.set_term("e0");
        let view = discovery.view();
        assert_eq!(view.page, 1);
        assert_eq!(view.matched, 10);
        assert_eq!(view.events.len(), 6);

        assert!(discovery.remove_event("e00"));
        assert_eq!(discovery.view().matched, 9);
        assert_eq!(discovery.events()[0].id, "e01");
    }

    #[test]
    fn home_strips_skip_inactive_events() {
        let mut hidden = scored("hidden", "2024-09-01", 10, 10);
        hidden.is_active = false;
        let events = vec![
            hidden,
            scored("a", "2024-01-01", 2, 1),
            scored("b", "2024-06-01", 0, 5),
            scored("c", "2024-03-01", 1, 0),
        ];
        assert_eq!(ids(&top_trending(&events, 2)), vec!["a", "b"]);
        assert_eq!(ids(&latest(&events, 2)), vec!["b", "c"]);
    }

    #[test]
    fn expiry_and_upcoming_buckets() {
        let now = parse_timestamp("2024-05-01T12:00:00Z").expect("now");
        let slot = |start: DateTime<Utc>, hours: i64| Timeslot {
            title: "slot".into(),
            start: Some(start),
            end: Some(start + Duration::hours(hours)),
        };

        let mut past = event("past", "Past");
        past.timeslots = vec![slot(now - Duration::days(3), 2)];
        let mut soon = event("soon", "Soon");
        soon.timeslots = vec![slot(now + Duration::hours(3), 2)];
        let mut week = event("week", "Week");
        week.timeslots = vec![slot(now + Duration::days(9), 2)];
        let mut far = event("far", "Far");
        far.timeslots = vec![slot(now + Duration::days(90), 2)];
        let undated = event("undated", "Undated");

        assert!(is_expired(&past, now));
        assert!(!is_expired(&soon, now));
        assert!(!is_expired(&undated, now));

        let mut open_ended = event("open", "Open ended");
        open_ended.timeslots = vec![Timeslot {
            title: "doors".into(),
            start: Some(now - Duration::days(120)),
            end: None,
        }];
        assert!(!is_expired(&open_ended, now));

        let mut half_scheduled = event("half", "Half scheduled");
        half_scheduled.timeslots = vec![slot(now - Duration::days(3), 2), Timeslot::default()];
        assert!(!is_expired(&half_scheduled, now));

        let events = vec![past, soon, week, far, undated];
        let buckets = upcoming_buckets(&events, now);
        let bucket_ids = |key: &str| {
            buckets[key]
                .iter()
                .map(|item| item.event.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(bucket_ids("TODAY"), vec!["soon"]);
        assert_eq!(bucket_ids("NEXT_WEEK"), vec!["week"]);
        assert_eq!(bucket_ids("LATER"), vec!["far"]);
        assert!(bucket_ids("THIS_WEEK").is_empty());
    }

    #[test]
    fn dashboard_counts_owned_and_co_hosted_events() {
        let mut owned = scored("1", "2024-01-01", 2, 1);
        owned.owner_id = Some("me".into());
        let mut co_hosted = scored("2", "2024-01-02", 1, 4);
        co_hosted.co_hosts = vec!["me".into()];
        co_hosted.is_active = false;
        let stranger = scored("3", "2024-01-03", 9, 9);

        let stats = dashboard_stats(&[owned, co_hosted, stranger], "me");
        assert_eq!(
            stats,
            DashboardStats {
                hosted: 2,
                active: 1,
                registrations: 3,
                bookmarks: 5,
            }
        );
    }
}
