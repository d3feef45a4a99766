//! Address normalization and the immutable alias map.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::warn;

use crate::store::{MatchStrategy, TenantAlias};

/// Lowercase and trim an address-like string.
///
/// Also unwraps `Name <addr>` and a `mailto:` prefix.
pub fn normalize(address: &str) -> String {
    let mut s = address.trim();
    if let (Some(open), Some(close)) = (s.rfind('<'), s.rfind('>')) {
        if open < close {
            s = s[open + 1..close].trim();
        }
    }
    let lower = s.to_lowercase();
    lower
        .strip_prefix("mailto:")
        .map(str::to_string)
        .unwrap_or(lower)
}

/// A normalized address split into parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address<'a> {
    /// Local part without the `+tag`.
    pub local: &'a str,
    pub tag: Option<&'a str>,
    pub domain: &'a str,
}

/// Split `local[+tag]@domain`. `None` if it is not an address.
pub fn parse_address(normalized: &str) -> Option<Address<'_>> {
    let (local_full, domain) = normalized.rsplit_once('@')?;
    if local_full.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    let (local, tag) = match local_full.split_once('+') {
        Some((local, tag)) if !tag.is_empty() => (local, Some(tag)),
        _ => (local_full, None),
    };
    Some(Address { local, tag, domain })
}

/// Domain named by a custom-domain alias.
fn alias_domain(alias: &str) -> Option<&str> {
    let domain = match alias.rsplit_once('@') {
        Some((_, domain)) => domain,
        None => alias,
    };
    (!domain.is_empty() && domain.contains('.')).then_some(domain)
}

/// `(tag, domain)` key named by a subuser alias.
fn alias_subuser_key(alias: &str) -> Option<(String, String)> {
    let address = parse_address(alias)?;
    let tag = address.tag.unwrap_or(address.local);
    Some((tag.to_string(), address.domain.to_string()))
}

/// Subuser tags an incoming address can match: its `+tag`, and its bare
/// local part when there is no tag, so `acme@zorahai.com` finds itself.
fn subuser_candidates<'a>(address: &Address<'a>) -> impl Iterator<Item = &'a str> {
    address
        .tag
        .into_iter()
        .chain(address.tag.is_none().then_some(address.local))
}

/// One published generation of the alias map. Never mutated after build.
#[derive(Debug)]
pub struct AliasSnapshot {
    generation: u64,
    built_at: Instant,
    exact: HashMap<String, String>,
    subuser: HashMap<(String, String), String>,
    domains: HashMap<String, String>,
}

impl AliasSnapshot {
    /// Build from store rows. On conflicting aliases the first row wins.
    pub fn build(generation: u64, aliases: &[TenantAlias]) -> Self {
        let mut snapshot = Self {
            generation,
            built_at: Instant::now(),
            exact: HashMap::new(),
            subuser: HashMap::new(),
            domains: HashMap::new(),
        };

        for row in aliases {
            let alias = normalize(&row.alias);
            let tenant = row.tenant_id.trim();
            if tenant.is_empty() {
                warn!(alias = %alias, "Skipping alias with empty tenant id");
                continue;
            }

            let inserted = match row.strategy {
                MatchStrategy::ExactSupportEmail => parse_address(&alias)
                    .map(|_| insert_first(&mut snapshot.exact, alias.clone(), tenant)),
                MatchStrategy::SubuserAddress => alias_subuser_key(&alias)
                    .map(|key| insert_first(&mut snapshot.subuser, key, tenant)),
                MatchStrategy::CustomDomain => alias_domain(&alias)
                    .map(|d| insert_first(&mut snapshot.domains, d.to_string(), tenant)),
                MatchStrategy::None => None,
            };

            match inserted {
                None => warn!(
                    alias = %alias,
                    strategy = row.strategy.as_str(),
                    "Skipping malformed alias"
                ),
                Some(Err(existing)) if existing != tenant => warn!(
                    alias = %alias,
                    kept = %existing,
                    ignored = %tenant,
                    "Alias claimed by two tenants, keeping the first"
                ),
                Some(_) => {}
            }
        }

        snapshot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    /// Number of distinct aliases.
    pub fn len(&self) -> usize {
        self.exact.len() + self.subuser.len() + self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a normalized address. Exact beats subuser beats domain.
    pub fn lookup(&self, normalized: &str) -> Option<(&str, MatchStrategy)> {
        if let Some(tenant) = self.exact.get(normalized) {
            return Some((tenant.as_str(), MatchStrategy::ExactSupportEmail));
        }
        let address = parse_address(normalized)?;
        for tag in subuser_candidates(&address) {
            let key = (tag.to_string(), address.domain.to_string());
            if let Some(tenant) = self.subuser.get(&key) {
                return Some((tenant.as_str(), MatchStrategy::SubuserAddress));
            }
        }
        self.domains
            .get(address.domain)
            .map(|tenant| (tenant.as_str(), MatchStrategy::CustomDomain))
    }
}

/// Insert unless present. Returns the existing tenant on conflict.
fn insert_first<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, String>,
    key: K,
    tenant: &str,
) -> Result<(), String> {
    match map.get(&key) {
        Some(existing) => Err(existing.clone()),
        None => {
            map.insert(key, tenant.to_string());
            Ok(())
        }
    }
}

/// Match one row against an address without building a map.
pub(crate) fn row_matches(row: &TenantAlias, normalized: &str, address: Option<&Address<'_>>) -> bool {
    let alias = normalize(&row.alias);
    match row.strategy {
        MatchStrategy::ExactSupportEmail => alias == normalized,
        MatchStrategy::SubuserAddress => match (address, alias_subuser_key(&alias)) {
            (Some(address), Some((tag, domain))) => {
                address.domain == domain && subuser_candidates(address).any(|t| t == tag)
            }
            _ => false,
        },
        MatchStrategy::CustomDomain => match (address, alias_domain(&alias)) {
            (Some(address), Some(domain)) => address.domain == domain,
            _ => false,
        },
        MatchStrategy::None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows() -> Vec<TenantAlias> {
        vec![
            TenantAlias::new("Support@Acme-Travel.com", "acme", MatchStrategy::ExactSupportEmail),
            TenantAlias::new("acme@zorahai.com", "acme", MatchStrategy::SubuserAddress),
            TenantAlias::new("quotes+safari@zorahai.com", "safari-co", MatchStrategy::SubuserAddress),
            TenantAlias::new("acme-travel.com", "acme", MatchStrategy::CustomDomain),
            TenantAlias::new("@beachstays.co.tz", "beach", MatchStrategy::CustomDomain),
        ]
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Quotes+ACME@ZorahAI.com "), "quotes+acme@zorahai.com");
        assert_eq!(normalize("Jane Doe <Jane@Acme.com>"), "jane@acme.com");
        assert_eq!(normalize("mailto:help@acme.com"), "help@acme.com");
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("quotes+acme@zorahai.com"),
            Some(Address {
                local: "quotes",
                tag: Some("acme"),
                domain: "zorahai.com"
            })
        );
        assert_eq!(parse_address("no-at-sign"), None);
        assert_eq!(parse_address("@domain.com"), None);
    }

    #[test]
    fn test_lookup_by_strategy() {
        let snapshot = AliasSnapshot::build(1, &rows());
        assert_eq!(snapshot.len(), 5);

        assert_eq!(
            snapshot.lookup("support@acme-travel.com"),
            Some(("acme", MatchStrategy::ExactSupportEmail))
        );
        assert_eq!(
            snapshot.lookup("quotes+acme@zorahai.com"),
            Some(("acme", MatchStrategy::SubuserAddress))
        );
        assert_eq!(
            snapshot.lookup("bookings+safari@zorahai.com"),
            Some(("safari-co", MatchStrategy::SubuserAddress))
        );
        assert_eq!(
            snapshot.lookup("jane@acme-travel.com"),
            Some(("acme", MatchStrategy::CustomDomain))
        );
        assert_eq!(
            snapshot.lookup("x@beachstays.co.tz"),
            Some(("beach", MatchStrategy::CustomDomain))
        );
        assert_eq!(snapshot.lookup("quotes@zorahai.com"), None);
        assert_eq!(snapshot.lookup("quotes+nobody@zorahai.com"), None);
    }

    #[test]
    fn test_untagged_subuser_alias_finds_itself() {
        let snapshot = AliasSnapshot::build(1, &rows());
        assert_eq!(
            snapshot.lookup("acme@zorahai.com"),
            Some(("acme", MatchStrategy::SubuserAddress))
        );
        assert_eq!(
            snapshot.lookup("safari@zorahai.com"),
            Some(("safari-co", MatchStrategy::SubuserAddress))
        );

        let parsed = parse_address("acme@zorahai.com");
        let matching: Vec<_> = rows()
            .into_iter()
            .filter(|row| row_matches(row, "acme@zorahai.com", parsed.as_ref()))
            .map(|row| row.tenant_id)
            .collect();
        assert_eq!(matching, vec!["acme"]);
    }

    #[test]
    fn test_first_alias_wins_on_conflict() {
        let snapshot = AliasSnapshot::build(
            1,
            &[
                TenantAlias::new("shared.com", "first", MatchStrategy::CustomDomain),
                TenantAlias::new("SHARED.com", "second", MatchStrategy::CustomDomain),
                TenantAlias::new("not-an-address", "third", MatchStrategy::ExactSupportEmail),
            ],
        );
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.lookup("a@shared.com"),
            Some(("first", MatchStrategy::CustomDomain))
        );
    }

    #[test]
    fn test_row_matches_mirrors_lookup() {
        let address = "quotes+acme@zorahai.com";
        let parsed = parse_address(address);
        let matching: Vec<_> = rows()
            .into_iter()
            .filter(|row| row_matches(row, address, parsed.as_ref()))
            .map(|row| row.tenant_id)
            .collect();
        assert_eq!(matching, vec!["acme"]);
    }
}
