use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::api::SortBy;

/// Tunables of the synchronization layer
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// Quiet period after the last filter change before a list is refetched
    pub debounce: Duration,

    /// Page size of every list and comment fetch
    pub default_limit: u32,

    pub default_sort: SortBy,

    /// Lists not fetched for this long are dropped by `cleanup_stale`
    pub list_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            debounce: Duration::from_millis(800),
            default_limit: 10,
            default_sort: SortBy::Hot,
            list_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by `MURMUR_DEBOUNCE_MS`, `MURMUR_PAGE_LIMIT`, `MURMUR_DEFAULT_SORT`
    /// and `MURMUR_LIST_TTL_SECS` when set
    pub fn from_env() -> anyhow::Result<ClientConfig> {
        ClientConfig::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut res = ClientConfig::default();
        if let Some(ms) = lookup("MURMUR_DEBOUNCE_MS") {
            let ms = ms
                .parse()
                .with_context(|| format!("parsing MURMUR_DEBOUNCE_MS {ms:?}"))?;
            res.debounce = Duration::from_millis(ms);
        }
        if let Some(limit) = lookup("MURMUR_PAGE_LIMIT") {
            res.default_limit = limit
                .parse()
                .with_context(|| format!("parsing MURMUR_PAGE_LIMIT {limit:?}"))?;
            if res.default_limit == 0 {
                return Err(anyhow!("MURMUR_PAGE_LIMIT must be positive"));
            }
        }
        if let Some(sort) = lookup("MURMUR_DEFAULT_SORT") {
            res.default_sort = SortBy::parse(&sort)
                .ok_or_else(|| anyhow!("unknown MURMUR_DEFAULT_SORT {sort:?}"))?;
        }
        if let Some(secs) = lookup("MURMUR_LIST_TTL_SECS") {
            let secs = secs
                .parse()
                .with_context(|| format!("parsing MURMUR_LIST_TTL_SECS {secs:?}"))?;
            res.list_ttl = Duration::from_secs(secs);
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |k| vars.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.debounce, Duration::from_millis(800));
        assert_eq!(cfg.default_limit, 10);
        assert_eq!(cfg.default_sort, SortBy::Hot);
    }

    #[test]
    fn overrides() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("MURMUR_DEBOUNCE_MS", "50"),
            ("MURMUR_PAGE_LIMIT", "25"),
            ("MURMUR_DEFAULT_SORT", "new"),
            ("MURMUR_LIST_TTL_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(cfg.debounce, Duration::from_millis(50));
        assert_eq!(cfg.default_limit, 25);
        assert_eq!(cfg.default_sort, SortBy::New);
        assert_eq!(cfg.list_ttl, Duration::from_secs(3));
    }

    #[test]
    fn invalid_values() {
        assert!(ClientConfig::from_lookup(lookup(&[("MURMUR_PAGE_LIMIT", "0")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("MURMUR_DEBOUNCE_MS", "soon")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[("MURMUR_DEFAULT_SORT", "best")])).is_err());
    }
}
