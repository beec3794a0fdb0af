use std::collections::BTreeMap;

use crate::UserId;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Hot,
    New,
    Top,
    Controversial,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Hot => "hot",
            SortBy::New => "new",
            SortBy::Top => "top",
            SortBy::Controversial => "controversial",
        }
    }

    pub fn parse(s: &str) -> Option<SortBy> {
        match s {
            "hot" => Some(SortBy::Hot),
            "new" => Some(SortBy::New),
            "top" => Some(SortBy::Top),
            "controversial" => Some(SortBy::Controversial),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<SortDir> {
        match s {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Day => "day",
            TimeFrame::Week => "week",
            TimeFrame::Month => "month",
            TimeFrame::Year => "year",
            TimeFrame::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<TimeFrame> {
        match s {
            "day" => Some(TimeFrame::Day),
            "week" => Some(TimeFrame::Week),
            "month" => Some(TimeFrame::Month),
            "year" => Some(TimeFrame::Year),
            "all" => Some(TimeFrame::All),
            _ => None,
        }
    }

    /// How far back this frame reaches, `None` meaning forever
    pub fn duration(&self) -> Option<chrono::Duration> {
        match self {
            TimeFrame::Day => Some(chrono::Duration::days(1)),
            TimeFrame::Week => Some(chrono::Duration::weeks(1)),
            TimeFrame::Month => Some(chrono::Duration::days(30)),
            TimeFrame::Year => Some(chrono::Duration::days(365)),
            TimeFrame::All => None,
        }
    }
}

/// Every sort and filter knob of a list
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilters {
    pub sort_by: SortBy,
    pub sort_dir: SortDir,
    pub sort_type: Option<String>,
    pub time_frame: TimeFrame,
    pub user_id: Option<UserId>,
    pub followed_only: bool,
    pub keywords_filters: Vec<String>,
    pub title_filters: Vec<String>,
    pub content_filters: Vec<String>,
    pub attachments_filters: Vec<String>,
    pub location_filters: Vec<String>,
    pub metadata_filters: BTreeMap<String, String>,
    pub source_id: Option<String>,
}

/// A partial update of `ListFilters`: only the `Some` fields are applied.
///
/// Fields that are themselves optional in `ListFilters` take a nested `Option`, so that
/// `Some(None)` clears them.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPatch {
    pub sort_by: Option<SortBy>,
    pub sort_dir: Option<SortDir>,
    pub sort_type: Option<Option<String>>,
    pub time_frame: Option<TimeFrame>,
    pub user_id: Option<Option<UserId>>,
    pub followed_only: Option<bool>,
    pub keywords_filters: Option<Vec<String>>,
    pub title_filters: Option<Vec<String>>,
    pub content_filters: Option<Vec<String>>,
    pub attachments_filters: Option<Vec<String>>,
    pub location_filters: Option<Vec<String>>,
    pub metadata_filters: Option<BTreeMap<String, String>>,
    pub source_id: Option<Option<String>>,
}

impl FilterPatch {
    pub fn is_empty(&self) -> bool {
        *self == FilterPatch::default()
    }

    pub fn sort_by(mut self, s: SortBy) -> Self {
        self.sort_by = Some(s);
        self
    }

    pub fn sort_dir(mut self, d: SortDir) -> Self {
        self.sort_dir = Some(d);
        self
    }

    pub fn time_frame(mut self, t: TimeFrame) -> Self {
        self.time_frame = Some(t);
        self
    }

    pub fn user_id(mut self, u: Option<UserId>) -> Self {
        self.user_id = Some(u);
        self
    }

    pub fn followed_only(mut self, f: bool) -> Self {
        self.followed_only = Some(f);
        self
    }

    pub fn keywords(mut self, k: Vec<String>) -> Self {
        self.keywords_filters = Some(k);
        self
    }

    pub fn titles(mut self, t: Vec<String>) -> Self {
        self.title_filters = Some(t);
        self
    }

    pub fn source_id(mut self, s: Option<String>) -> Self {
        self.source_id = Some(s);
        self
    }
}

impl ListFilters {
    pub fn sorted_by(sort_by: SortBy) -> ListFilters {
        ListFilters {
            sort_by,
            ..ListFilters::default()
        }
    }

    pub fn apply(&mut self, patch: &FilterPatch) {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = &patch.$field {
                    self.$field = v.clone();
                }
            };
        }
        set!(sort_by);
        set!(sort_dir);
        set!(sort_type);
        set!(time_frame);
        set!(user_id);
        set!(followed_only);
        set!(keywords_filters);
        set!(title_filters);
        set!(content_filters);
        set!(attachments_filters);
        set!(location_filters);
        set!(metadata_filters);
        set!(source_id);
    }
}

/// One page request over a filtered list
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListQuery {
    pub filters: ListFilters,
    pub page: u32,
    pub limit: u32,
}

const LIST_SEPARATOR: char = ',';

impl ListQuery {
    pub fn to_params(&self) -> Vec<(String, String)> {
        let f = &self.filters;
        let mut res = vec![
            (String::from("page"), self.page.to_string()),
            (String::from("limit"), self.limit.to_string()),
            (String::from("sortBy"), f.sort_by.as_str().to_string()),
            (String::from("sortDir"), f.sort_dir.as_str().to_string()),
            (String::from("timeFrame"), f.time_frame.as_str().to_string()),
        ];
        let mut push = |k: &str, v: String| res.push((k.to_string(), v));
        if let Some(t) = &f.sort_type {
            push("sortType", t.clone());
        }
        if let Some(u) = &f.user_id {
            push("userId", u.0.to_string());
        }
        if f.followed_only {
            push("followedOnly", String::from("true"));
        }
        for (k, v) in [
            ("keywordsFilters", &f.keywords_filters),
            ("titleFilters", &f.title_filters),
            ("contentFilters", &f.content_filters),
            ("attachmentsFilters", &f.attachments_filters),
            ("locationFilters", &f.location_filters),
        ] {
            if !v.is_empty() {
                push(k, v.join(&LIST_SEPARATOR.to_string()));
            }
        }
        for (k, v) in &f.metadata_filters {
            push(&format!("metadataFilters[{k}]"), v.clone());
        }
        if let Some(s) = &f.source_id {
            push("sourceId", s.clone());
        }
        res
    }

    /// Unknown keys are ignored, malformed known keys make the whole query invalid
    pub fn from_params(params: &[(String, String)]) -> Option<ListQuery> {
        let mut res = ListQuery {
            filters: ListFilters::default(),
            page: 1,
            limit: 10,
        };
        let split = |v: &str| -> Vec<String> {
            v.split(LIST_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };
        let f = &mut res.filters;
        for (k, v) in params {
            match k.as_str() {
                "page" => res.page = v.parse().ok()?,
                "limit" => res.limit = v.parse().ok()?,
                "sortBy" => f.sort_by = SortBy::parse(v)?,
                "sortDir" => f.sort_dir = SortDir::parse(v)?,
                "timeFrame" => f.time_frame = TimeFrame::parse(v)?,
                "sortType" => f.sort_type = Some(v.clone()),
                "userId" => f.user_id = Some(UserId(v.parse().ok()?)),
                "followedOnly" => f.followed_only = v.parse().ok()?,
                "keywordsFilters" => f.keywords_filters = split(v),
                "titleFilters" => f.title_filters = split(v),
                "contentFilters" => f.content_filters = split(v),
                "attachmentsFilters" => f.attachments_filters = split(v),
                "locationFilters" => f.location_filters = split(v),
                "sourceId" => f.source_id = Some(v.clone()),
                k => {
                    if let Some(key) = k
                        .strip_prefix("metadataFilters[")
                        .and_then(|k| k.strip_suffix(']'))
                    {
                        f.metadata_filters.insert(key.to_string(), v.clone());
                    }
                }
            }
        }
        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uuid;

    #[test]
    fn patch_only_overwrites_present_fields() {
        let mut f = ListFilters::sorted_by(SortBy::New);
        f.keywords_filters = vec![String::from("rust")];
        f.apply(&FilterPatch::default().time_frame(TimeFrame::Week));
        assert_eq!(f.sort_by, SortBy::New);
        assert_eq!(f.time_frame, TimeFrame::Week);
        assert_eq!(f.keywords_filters, vec![String::from("rust")]);

        f.apply(&FilterPatch::default().source_id(Some(String::from("rss"))));
        assert_eq!(f.source_id.as_deref(), Some("rss"));
        f.apply(&FilterPatch::default().source_id(None));
        assert_eq!(f.source_id, None);
    }

    #[test]
    fn empty_patch() {
        assert!(FilterPatch::default().is_empty());
        assert!(!FilterPatch::default().followed_only(false).is_empty());
    }

    #[test]
    fn list_query_params_parse_back() {
        let mut filters = ListFilters::sorted_by(SortBy::Top);
        filters.time_frame = TimeFrame::Month;
        filters.user_id = Some(UserId(Uuid::new_v4()));
        filters.followed_only = true;
        filters.keywords_filters = vec![String::from("a"), String::from("b")];
        filters.location_filters = vec![String::from("paris")];
        filters
            .metadata_filters
            .insert(String::from("lang"), String::from("fr"));
        let q = ListQuery {
            filters,
            page: 4,
            limit: 25,
        };
        assert_eq!(ListQuery::from_params(&q.to_params()), Some(q));
    }

    #[test]
    fn list_query_rejects_bad_sort() {
        let params = vec![(String::from("sortBy"), String::from("sideways"))];
        assert_eq!(ListQuery::from_params(&params), None);
    }
}
