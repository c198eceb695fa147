use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Entity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    #[default]
    RecentlyUpdated,
    Newest,
    Name,
    RecentlyOpened,
}

impl SortOption {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOption::RecentlyUpdated => "recently_updated",
            SortOption::Newest => "newest",
            SortOption::Name => "name",
            SortOption::RecentlyOpened => "recently_opened",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOption::RecentlyUpdated => "Recently updated",
            SortOption::Newest => "Newest",
            SortOption::Name => "By name",
            SortOption::RecentlyOpened => "Recently opened",
        }
    }
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SortOption::RecentlyUpdated,
            SortOption::Newest,
            SortOption::Name,
            SortOption::RecentlyOpened,
        ]
        .into_iter()
        .find(|o| o.as_str() == s)
        .ok_or_else(|| format!("unknown sort option: {s}"))
    }
}

/// Options offered to the user; `recently_opened` leads only when there is
/// something in the recent list.
pub fn sort_options(has_recent_items: bool) -> Vec<SortOption> {
    let mut options = vec![
        SortOption::RecentlyUpdated,
        SortOption::Newest,
        SortOption::Name,
    ];
    if has_recent_items {
        options.insert(0, SortOption::RecentlyOpened);
    }
    options
}

/// Unparseable or missing timestamps sort as the oldest.
fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc())
        })
        .ok()
}

fn newest_first(a: Option<&str>, b: Option<&str>) -> Ordering {
    parse_time(b).cmp(&parse_time(a))
}

/// Filter by a case-insensitive name substring, then order by `option`.
///
/// `recent_ids` is the recent list for the entity kind, newest first. With
/// `RecentlyOpened` only entities present in it are returned, in its order.
pub fn sort_items<T: Entity>(
    items: &[T],
    query: &str,
    option: SortOption,
    recent_ids: &[&str],
) -> Vec<T> {
    let query = query.to_lowercase();
    let mut filtered: Vec<T> = items
        .iter()
        .filter(|item| {
            query.is_empty()
                || item
                    .name()
                    .is_some_and(|n| n.to_lowercase().contains(&query))
        })
        .cloned()
        .collect();

    match option {
        SortOption::RecentlyUpdated => {
            filtered.sort_by(|a, b| newest_first(a.updated_at(), b.updated_at()));
        }
        SortOption::Newest => {
            filtered.sort_by(|a, b| newest_first(a.created_at(), b.created_at()));
        }
        SortOption::Name => {
            filtered.sort_by_cached_key(|item| item.name().unwrap_or_default().to_lowercase());
        }
        SortOption::RecentlyOpened => {
            if recent_ids.is_empty() {
                return Vec::new();
            }
            filtered.retain(|item| recent_ids.contains(&item.id()));
            filtered.sort_by_key(|item| recent_ids.iter().position(|id| *id == item.id()));
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;
    use serde_json::json;

    fn rec(id: &str, name: &str, created: &str, updated: &str) -> Record {
        serde_json::from_value(json!({
            "id": id,
            "name": name,
            "created_at": created,
            "updated_at": updated,
        }))
        .unwrap()
    }

    fn ids(items: &[Record]) -> Vec<&str> {
        items.iter().map(|r| r.id.as_str()).collect()
    }

    fn sample() -> Vec<Record> {
        vec![
            rec("1", "beta", "2024-01-01T00:00:00Z", "2024-03-01T00:00:00Z"),
            rec("2", "Alpha", "2024-02-01T00:00:00Z", "2024-01-15T00:00:00"),
            rec("3", "gamma bot", "2023-12-01T00:00:00Z", "not a date"),
        ]
    }

    #[test]
    fn test_options_lead_with_recent_only_when_present() {
        assert_eq!(sort_options(false)[0], SortOption::RecentlyUpdated);
        assert_eq!(sort_options(true)[0], SortOption::RecentlyOpened);
        assert_eq!(sort_options(true).len(), 4);
    }

    #[test]
    fn test_recently_updated_puts_invalid_dates_last() {
        let sorted = sort_items(&sample(), "", SortOption::RecentlyUpdated, &[]);
        assert_eq!(ids(&sorted), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_newest() {
        let sorted = sort_items(&sample(), "", SortOption::Newest, &[]);
        assert_eq!(ids(&sorted), vec!["2", "1", "3"]);
    }

    #[test]
    fn test_name_is_case_insensitive() {
        let sorted = sort_items(&sample(), "", SortOption::Name, &[]);
        assert_eq!(ids(&sorted), vec!["2", "1", "3"]);
    }

    #[test]
    fn test_query_filters_by_name() {
        let sorted = sort_items(&sample(), "BOT", SortOption::Name, &[]);
        assert_eq!(ids(&sorted), vec!["3"]);
    }

    #[test]
    fn test_recently_opened_follows_recent_order() {
        let sorted = sort_items(&sample(), "", SortOption::RecentlyOpened, &["3", "1", "gone"]);
        assert_eq!(ids(&sorted), vec!["3", "1"]);
    }

    #[test]
    fn test_recently_opened_empty_without_recent_items() {
        assert!(sort_items(&sample(), "", SortOption::RecentlyOpened, &[]).is_empty());
    }

    #[test]
    fn test_option_wire_names() {
        assert_eq!(
            serde_json::to_string(&SortOption::RecentlyOpened).unwrap(),
            "\"recently_opened\""
        );
        assert_eq!(SortOption::Newest.as_str(), "newest");
        assert_eq!("name".parse::<SortOption>(), Ok(SortOption::Name));
        assert!("alphabetical".parse::<SortOption>().is_err());
    }
}
