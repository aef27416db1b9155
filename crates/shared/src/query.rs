//! Table query state and its binding to the URL query string.
//!
//! The address bar is the canonical store for what a remote table shows.
//! [`QueryParams`] is an ordered view of a query string with the same
//! `set`/`delete` semantics as the browser's `URLSearchParams`, and
//! [`TableQuery`] is the typed state decoded from it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub const PAGE_PARAM: &str = "page";
pub const SEARCH_PARAM: &str = "search";
pub const SORT_BY_PARAM: &str = "sortBy";
pub const SORT_ORDER_PARAM: &str = "sortOrder";
pub const LIMIT_PARAM: &str = "limit";

/// Keys owned by the table itself. Everything else in the URL is a filter.
pub const CANONICAL_PARAMS: [&str; 5] = [
    PAGE_PARAM,
    SEARCH_PARAM,
    SORT_BY_PARAM,
    SORT_ORDER_PARAM,
    LIMIT_PARAM,
];

/// Ordered key/value pairs of a URL query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `?a=1&b=2` or `a=1&b=2`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Replace the first occurrence of `key` in place and drop any others,
    /// or append when absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.pairs[first].1 = value;
                let mut index = 0;
                self.pairs.retain(|(k, _)| {
                    let keep = index <= first || k != key;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    /// Append without touching existing values.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    pub fn delete(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    /// `set` for a non-empty value, `delete` for an empty one.
    pub fn set_or_delete(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.delete(key);
        } else {
            self.set(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Encode without a leading `?`.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    /// Pairs whose key is not one of [`CANONICAL_PARAMS`].
    pub fn extra_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| !CANONICAL_PARAMS.contains(k))
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order: {other}")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallbacks used when the URL does not name a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefaults {
    pub limit: u32,
    pub sort_by: String,
    pub sort_order: SortOrder,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            limit: 10,
            sort_by: "createdAt".to_string(),
            sort_order: SortOrder::Desc,
        }
    }
}

/// Typed table state decoded from the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    /// 1-indexed.
    pub page: u32,
    pub search: String,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub limit: u32,
}

impl TableQuery {
    /// Decode from URL params. Missing or unparseable values fall back to
    /// `defaults`; `page` and `limit` are never zero.
    pub fn from_params(params: &QueryParams, defaults: &QueryDefaults) -> Self {
        let page = params
            .get(PAGE_PARAM)
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let limit = params
            .get(LIMIT_PARAM)
            .and_then(|l| l.trim().parse::<u32>().ok())
            .filter(|l| *l >= 1)
            .unwrap_or(defaults.limit.max(1));
        let sort_by = params
            .get(SORT_BY_PARAM)
            .filter(|s| !s.is_empty())
            .map_or_else(|| defaults.sort_by.clone(), str::to_string);
        let sort_order = params
            .get(SORT_ORDER_PARAM)
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.sort_order);

        Self {
            page,
            search: params.get(SEARCH_PARAM).unwrap_or_default().to_string(),
            sort_by,
            sort_order,
            limit,
        }
    }

    /// Write this state into `params`, keeping unrelated keys where they are.
    pub fn write_to(&self, params: &mut QueryParams) {
        params.set_or_delete(SEARCH_PARAM, &self.search);
        params.set(SORT_BY_PARAM, self.sort_by.as_str());
        params.set(SORT_ORDER_PARAM, self.sort_order.as_str());
        params.set(PAGE_PARAM, self.page.to_string());
        params.set(LIMIT_PARAM, self.limit.to_string());
    }

    /// Parameters handed to the fetch function: the canonical keys followed
    /// by every ad hoc filter present in `url`.
    pub fn fetch_params(&self, url: &QueryParams) -> QueryParams {
        let mut params = QueryParams::new();
        params.set(PAGE_PARAM, self.page.to_string());
        params.set(LIMIT_PARAM, self.limit.to_string());
        if !self.search.is_empty() {
            params.set(SEARCH_PARAM, self.search.as_str());
        }
        params.set(SORT_BY_PARAM, self.sort_by.as_str());
        params.set(SORT_ORDER_PARAM, self.sort_order.as_str());
        for (key, value) in url.extra_filters() {
            params.append(key, value);
        }
        params
    }
}

/// Pagination block a listing endpoint may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_items: u64,
}

/// Response contract of a listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<PaginationInfo>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> FetchResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            pagination: None,
            message: None,
        }
    }

    pub fn with_pagination(mut self, total_pages: u32, total_items: u64) -> Self {
        self.pagination = Some(PaginationInfo {
            total_pages,
            total_items,
        });
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Pagination as rendered by a table footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub limit: u32,
    pub has_prev_page: bool,
    pub has_next_page: bool,
}

impl Pagination {
    pub fn new(current_page: u32, total_pages: u32, total_items: u64, limit: u32) -> Self {
        Self {
            current_page,
            total_pages,
            total_items,
            limit,
            has_prev_page: current_page > 1,
            has_next_page: current_page < total_pages,
        }
    }

    /// Before the first fetch lands.
    pub fn initial(limit: u32) -> Self {
        Self::new(1, 1, 0, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place_and_drops_duplicates() {
        let mut params = QueryParams::parse("?a=1&b=2&a=3&c=4");
        params.set("a", "9");
        assert_eq!(params.to_query_string(), "a=9&b=2&c=4");

        params.set("d", "5");
        assert_eq!(params.to_query_string(), "a=9&b=2&c=4&d=5");
    }

    #[test]
    fn set_or_delete_drops_empty_values() {
        let mut params = QueryParams::parse("search=foo&page=2");
        params.set_or_delete("search", "");
        assert_eq!(params.to_query_string(), "page=2");
    }

    #[test]
    fn encoding_round_trips_reserved_characters() {
        let mut params = QueryParams::new();
        params.set("search", "iso 27001 & more");
        let encoded = params.to_query_string();
        assert_eq!(encoded, "search=iso+27001+%26+more");
        assert_eq!(
            QueryParams::parse(&encoded).get("search"),
            Some("iso 27001 & more")
        );
    }

    #[test]
    fn decode_falls_back_to_defaults() {
        let defaults = QueryDefaults::default();
        let query = TableQuery::from_params(&QueryParams::new(), &defaults);
        assert_eq!(query.page, 1);
        assert_eq!(query.search, "");
        assert_eq!(query.sort_by, "createdAt");
        assert_eq!(query.sort_order, SortOrder::Desc);
        assert_eq!(query.limit, 10);
    }

    #[test]
    fn decode_rejects_nonsense_values() {
        let defaults = QueryDefaults::default();
        let params = QueryParams::parse("page=0&limit=abc&sortOrder=sideways&sortBy=");
        let query = TableQuery::from_params(&params, &defaults);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.sort_order, SortOrder::Desc);
        assert_eq!(query.sort_by, "createdAt");
    }

    #[test]
    fn encode_decode_round_trip() {
        let defaults = QueryDefaults::default();
        let query = TableQuery {
            page: 3,
            search: "foo".into(),
            sort_by: "name".into(),
            sort_order: SortOrder::Asc,
            limit: 25,
        };
        let mut params = QueryParams::parse("status=pending");
        query.write_to(&mut params);

        let reparsed = QueryParams::parse(&params.to_query_string());
        assert_eq!(TableQuery::from_params(&reparsed, &defaults), query);
        assert_eq!(reparsed.get("status"), Some("pending"));
    }

    #[test]
    fn fetch_params_carry_extra_filters() {
        let defaults = QueryDefaults::default();
        let url = QueryParams::parse("page=2&status=approved&category=iso");
        let query = TableQuery::from_params(&url, &defaults);
        let params = query.fetch_params(&url);
        assert_eq!(
            params.to_query_string(),
            "page=2&limit=10&sortBy=createdAt&sortOrder=desc&status=approved&category=iso"
        );
    }

    #[test]
    fn pagination_flags_follow_current_page() {
        let first = Pagination::new(1, 3, 30, 10);
        assert!(!first.has_prev_page);
        assert!(first.has_next_page);

        let last = Pagination::new(3, 3, 30, 10);
        assert!(last.has_prev_page);
        assert!(!last.has_next_page);

        let empty = Pagination::new(1, 0, 0, 10);
        assert!(!empty.has_prev_page && !empty.has_next_page);
    }

    #[test]
    fn sort_order_parses_case_insensitively() {
        assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert_eq!(SortOrder::Asc.toggled(), SortOrder::Desc);
        assert!("up".parse::<SortOrder>().is_err());
    }
}
