use regex::{Regex, RegexBuilder};
use std::{borrow::Cow, fmt};
use tracing::{debug, error, info};

use crate::config::PatternConfig;
use crate::config::clash::ClashConfig;
use crate::error::CleanupError;

/// A remove or replace pattern after unwrapping the sidecar syntax.
///
/// `/re/` and `/re/i` are regular expressions, everything else matches
/// literally. A trailing `/i` forces case-insensitive matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Literal {
        text: String,
        force_ignore_case: bool,
    },
    Regex {
        source: String,
        force_ignore_case: bool,
    },
}

fn split_ignore_case_flag(s: &str) -> (&str, bool) {
    match s.len().checked_sub(2) {
        Some(i) if s.is_char_boundary(i) && s[i..].eq_ignore_ascii_case("/i") => (&s[..i], true),
        _ => (s, false),
    }
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix('/') {
            let (body, force_ignore_case) = split_ignore_case_flag(rest);
            let inner = if force_ignore_case {
                Some(body)
            } else {
                body.strip_suffix('/')
            };
            if let Some(source) = inner {
                return Self::Regex {
                    source: source.to_string(),
                    force_ignore_case,
                };
            }
        }

        let (text, force_ignore_case) = split_ignore_case_flag(raw);
        Self::Literal {
            text: text.to_string(),
            force_ignore_case,
        }
    }

    /// Replacement text as `Regex::replace_all` expects it.
    ///
    /// Literal patterns have no capture groups, so any `$` is taken verbatim.
    /// Regex patterns expand `$1` / `${name}`; write `${1}x` when a group
    /// reference is followed by word characters.
    pub fn replacement<'a>(&self, to: &'a str) -> Cow<'a, str> {
        match self {
            Self::Literal { .. } if to.contains('$') => Cow::Owned(to.replace('$', "$$")),
            _ => Cow::Borrowed(to),
        }
    }

    /// Builds the matcher; `ignore_case` applies unless `/i` already forces it.
    pub fn compile(&self, ignore_case: bool) -> Result<Regex, CleanupError> {
        let (source, forced) = match self {
            Self::Literal {
                text,
                force_ignore_case,
            } => (regex::escape(text), *force_ignore_case),
            Self::Regex {
                source,
                force_ignore_case,
            } => (source.clone(), *force_ignore_case),
        };

        RegexBuilder::new(&source)
            .case_insensitive(forced || ignore_case)
            .build()
            .map_err(|e| CleanupError::InvalidPattern {
                pattern: self.to_string(),
                source: e,
            })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal {
                text,
                force_ignore_case,
            } => write!(f, "{}{}", text, if *force_ignore_case { "/i" } else { "" }),
            Self::Regex {
                source,
                force_ignore_case,
            } => write!(f, "/{}/{}", source, if *force_ignore_case { "i" } else { "" }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed_proxies: usize,
    pub removed_members: usize,
    pub renamed_proxies: usize,
    pub renamed_groups: usize,
    pub renamed_members: usize,
}

/// Compiled remove / replace patterns, applied to proxy names and group members.
#[derive(Clone, Debug)]
pub struct Cleaner {
    remove: Vec<Regex>,
    replace: Vec<(Regex, String)>,
}

impl Cleaner {
    pub fn new(
        remove: &[Pattern],
        replace: &[(Pattern, String)],
        ignore_case: bool,
    ) -> Result<Self, CleanupError> {
        Ok(Self {
            remove: remove
                .iter()
                .map(|p| p.compile(ignore_case))
                .collect::<Result<_, _>>()?,
            replace: replace
                .iter()
                .map(|(p, to)| {
                    p.compile(ignore_case)
                        .map(|re| (re, p.replacement(to).into_owned()))
                })
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn from_config(config: &PatternConfig, ignore_case: bool) -> Result<Self, CleanupError> {
        let remove: Vec<Pattern> = config.remove.iter().map(|r| Pattern::parse(r)).collect();
        let replace: Vec<(Pattern, String)> = config
            .replace
            .iter()
            .map(|(from, to)| (Pattern::parse(from), to.clone()))
            .collect();
        Self::new(&remove, &replace, ignore_case)
    }

    fn is_removed(&self, name: &str) -> bool {
        self.remove.iter().any(|re| re.is_match(name))
    }

    /// Runs every replace pair over `name`, in order. Returns whether it changed.
    fn rename(&self, name: &mut String) -> bool {
        let mut changed = false;
        for (re, to) in &self.replace {
            if re.is_match(name) {
                let renamed = re.replace_all(name, to.as_str()).into_owned();
                changed |= renamed != *name;
                *name = renamed;
            }
        }
        changed
    }

    pub fn clean_up(&self, config: &mut ClashConfig) -> CleanupStats {
        let mut stats = CleanupStats::default();

        if !self.remove.is_empty() {
            if let Some(proxies) = config.proxies.as_mut() {
                let before = proxies.len();
                proxies.retain(|p| !self.is_removed(&p.name));
                stats.removed_proxies = before - proxies.len();
                if proxies.is_empty() {
                    config.proxies = None;
                }
            }

            for group in config.proxy_groups.iter_mut().flatten() {
                if let Some(members) = group.proxies.as_mut() {
                    let before = members.len();
                    members.retain(|m| !self.is_removed(m));
                    stats.removed_members += before - members.len();
                    if members.is_empty() {
                        group.proxies = None;
                    }
                }
            }
        }

        if !self.replace.is_empty() {
            for proxy in config.proxies.iter_mut().flatten() {
                if self.rename(&mut proxy.name) {
                    debug!("Renamed proxy to {}", proxy.name);
                    stats.renamed_proxies += 1;
                }
            }

            for group in config.proxy_groups.iter_mut().flatten() {
                if self.rename(&mut group.name) {
                    debug!("Renamed group to {}", group.name);
                    stats.renamed_groups += 1;
                }
                for member in group.proxies.iter_mut().flatten() {
                    if self.rename(member) {
                        stats.renamed_members += 1;
                    }
                }
            }
        }

        info!(
            "Cleanup removed {} proxies and {} group members, renamed {} proxies, {} groups and {} group members",
            stats.removed_proxies,
            stats.removed_members,
            stats.renamed_proxies,
            stats.renamed_groups,
            stats.renamed_members
        );

        stats
    }
}

/// Applies the sidecar patterns to `config`.
///
/// All or nothing: if any pattern fails to compile, nothing is changed.
pub fn clean_up(config: &mut ClashConfig, patterns: &PatternConfig, ignore_case: bool) -> CleanupStats {
    match Cleaner::from_config(patterns, ignore_case) {
        Ok(cleaner) => cleaner.clean_up(config),
        Err(e) => {
            error!("Cleanup skipped, document left unchanged: {}", e);
            CleanupStats::default()
        }
    }
}
