//! Paper list queries: server-side filter parameters plus the client-side
//! date window and newest-first ordering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::api::{ApiError, PaperApi};
use crate::{Paper, PaperPage};

/// Filters for one page of the paper listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag_id: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Keep only papers published within this many days. Applied locally.
    pub within_days: Option<i64>,
}

impl PaperQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag_id: i64) -> Self {
        self.tag_id = Some(tag_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn within_days(mut self, days: i64) -> Self {
        self.within_days = Some(days);
        self
    }

    /// Query string parameters for `GET /papers`. Empty strings and zero
    /// limit/offset are left out, matching what the server treats as unset.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            pairs.push(("category", category.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(tag_id) = self.tag_id {
            pairs.push(("tag_id", tag_id.to_string()));
        }
        if let Some(limit) = self.limit.filter(|&l| l > 0) {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset.filter(|&o| o > 0) {
            pairs.push(("offset", offset.to_string()));
        }
        pairs
    }
}

/// Fetch a page of papers, then apply the date window and sort newest first.
pub async fn fetch_papers(
    api: &dyn PaperApi,
    query: &PaperQuery,
    now: DateTime<Utc>,
) -> Result<PaperPage, ApiError> {
    let mut page = api.fetch_papers(query).await?;
    if let Some(days) = query.within_days {
        page.papers
            .retain(|p| is_within_days(p.published.as_deref(), days, now));
    }
    sort_newest_first(&mut page.papers);
    Ok(page)
}

/// Category filter options from `/categories`.
pub async fn fetch_categories(api: &dyn PaperApi) -> Result<Vec<String>, ApiError> {
    api.fetch_categories().await
}

/// Parse the server's `published` field.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` (naive, taken as UTC), RFC 3339, and a bare
/// `YYYY-MM-DD`.
pub fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whether a paper's age, rounded up to whole days, is at most `days`.
/// Missing or unparsable dates are never within the window.
pub fn is_within_days(published: Option<&str>, days: i64, now: DateTime<Utc>) -> bool {
    let Some(date) = published.and_then(parse_published) else {
        return false;
    };
    let elapsed = now.signed_duration_since(date);
    let day_ms = TimeDelta::days(1).num_milliseconds();
    let elapsed_days = elapsed.num_milliseconds().div_euclid(day_ms)
        + i64::from(elapsed.num_milliseconds().rem_euclid(day_ms) != 0);
    elapsed_days <= days
}

/// Newest first; papers without a parsable date go last.
pub fn sort_newest_first(papers: &mut [Paper]) {
    papers.sort_by_cached_key(|p| {
        std::cmp::Reverse(p.published.as_deref().and_then(parse_published))
    });
}
