use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::clash::{ClashConfig, Providers, Proxy, ProxyGroup, Rule};
use crate::error::MergeError;

/// What a merge changed in the destination document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub providers: usize,
    pub proxies: usize,
    pub groups: usize,
    /// Names injected into pre-existing select groups.
    pub members: usize,
    pub rules: usize,
    pub skipped: usize,
}

/// Merges `source` into `destination`.
///
/// The destination wins every collision: its settings are never touched and
/// entries only get added where the destination has no entry of that name.
/// Bad entries are logged and skipped, the merge itself never fails.
pub fn merge_into(source: ClashConfig, destination: &mut ClashConfig) -> MergeStats {
    let mut stats = MergeStats::default();

    let ClashConfig {
        proxy_providers,
        rule_providers,
        proxies,
        proxy_groups,
        rules,
        ..
    } = source;

    merge_providers(
        "proxy provider",
        proxy_providers,
        &mut destination.proxy_providers,
        &mut stats,
    );
    merge_providers(
        "rule provider",
        rule_providers,
        &mut destination.rule_providers,
        &mut stats,
    );

    let proxy_new = merge_proxies(proxies.unwrap_or_default(), destination, &mut stats);
    merge_groups(
        proxy_groups.unwrap_or_default(),
        &proxy_new,
        destination,
        &mut stats,
    );
    merge_rules(rules.unwrap_or_default(), destination, &mut stats);

    info!(
        "Merged {} providers, {} proxies, {} groups, {} group members, {} rules ({} skipped)",
        stats.providers, stats.proxies, stats.groups, stats.members, stats.rules, stats.skipped
    );

    stats
}

fn skip(stats: &mut MergeStats, err: MergeError) {
    warn!("Skipping entry: {}", err);
    stats.skipped += 1;
}

fn merge_providers(
    kind: &str,
    source: Option<Providers>,
    destination: &mut Option<Providers>,
    stats: &mut MergeStats,
) {
    let Some(source) = source else {
        return;
    };

    if destination.is_none() {
        stats.providers += source.len();
        *destination = Some(source);
        return;
    }
    let existing = destination.get_or_insert_with(Providers::new);

    for (name, provider) in source {
        if name.trim().is_empty() {
            skip(stats, MergeError::UnnamedProvider);
            continue;
        }
        if existing.contains_key(&name) {
            debug!("Keeping existing {} {}", kind, name);
            continue;
        }
        existing.insert(name, provider);
        stats.providers += 1;
    }
}

/// Appends unknown proxies, returning the names that were added.
fn merge_proxies(
    source: Vec<Proxy>,
    destination: &mut ClashConfig,
    stats: &mut MergeStats,
) -> Vec<String> {
    if source.is_empty() {
        return Vec::new();
    }

    let list = destination.proxies.get_or_insert_with(Vec::new);
    let mut names: HashSet<String> = list.iter().map(|p| p.name.clone()).collect();
    let mut added = Vec::new();

    for proxy in source {
        if proxy.name.is_empty() {
            skip(stats, MergeError::UnnamedProxy);
            continue;
        }
        if !names.insert(proxy.name.clone()) {
            continue;
        }
        added.push(proxy.name.clone());
        list.push(proxy);
    }
    if list.is_empty() {
        destination.proxies = None;
    }

    stats.proxies += added.len();
    added
}

/// Prepends unknown groups, then makes every surviving select group offer
/// the newly merged proxies and groups.
fn merge_groups(
    source: Vec<ProxyGroup>,
    proxy_new: &[String],
    destination: &mut ClashConfig,
    stats: &mut MergeStats,
) {
    if source.is_empty() && (proxy_new.is_empty() || destination.proxy_groups.is_none()) {
        return;
    }

    let list = destination.proxy_groups.get_or_insert_with(Vec::new);
    let mut names: HashSet<String> = list.iter().map(|g| g.name.clone()).collect();
    // (name, members) of every added group, in source order
    let mut group_new: Vec<(String, Vec<String>)> = Vec::new();

    for group in source {
        if group.name.is_empty() {
            skip(stats, MergeError::UnnamedGroup);
            continue;
        }
        if !names.insert(group.name.clone()) {
            continue;
        }
        group_new.push((group.name.clone(), group.members().to_vec()));
        list.insert(0, group);
    }
    stats.groups += group_new.len();

    for group in list.iter_mut() {
        if !group.is_select() || group_new.iter().any(|(name, _)| *name == group.name) {
            continue;
        }

        let existing = group.proxies.take().unwrap_or_default();

        let mut members: Vec<String> = proxy_new
            .iter()
            .filter(|p| !existing.contains(p))
            .cloned()
            .collect();
        stats.members += members.len();
        members.extend(existing);

        for (name, their_members) in &group_new {
            // never list a group twice, never make two groups reference each other
            if members.contains(name) || their_members.contains(&group.name) {
                continue;
            }
            members.insert(0, name.clone());
            stats.members += 1;
        }

        group.proxies = (!members.is_empty()).then_some(members);
    }
    if list.is_empty() {
        destination.proxy_groups = None;
    }
}

/// Prepends source rules that are new and point at a group of the merged document.
///
/// Existing rules are always rewritten to the canonical `", "` form.
fn merge_rules(source: Vec<String>, destination: &mut ClashConfig, stats: &mut MergeStats) {
    let existing: Vec<String> = destination
        .rule_list()
        .iter()
        .map(|r| Rule::canonicalize(r))
        .collect();

    if source.is_empty() {
        destination.rules = (!existing.is_empty()).then_some(existing);
        return;
    }

    let groups: HashSet<String> = destination
        .group_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut insert: Vec<String> = Vec::new();

    for rule in source
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| Rule::canonicalize(r))
    {
        if existing.contains(&rule) || insert.contains(&rule) {
            continue;
        }

        let Some(group) = rule.split(',').nth(2).map(str::trim) else {
            debug!("{}", MergeError::RuleWithoutGroup(rule.clone()));
            stats.skipped += 1;
            continue;
        };

        if groups.contains(group) {
            insert.push(rule);
        } else {
            debug!("Dropping rule {} for unknown group {}", rule, group);
        }
    }

    stats.rules += insert.len();
    let mut rules: Vec<String> = insert.iter().map(|r| Rule::parse(r).to_string()).collect();
    rules.extend(existing);
    destination.rules = (!rules.is_empty()).then_some(rules);
}
