// source: https://github.com/Dreamacro/clash/wiki/configuration

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::{collections::HashSet, fmt, str::FromStr};

pub use rule::Rule;

pub mod rule;

pub type Providers = IndexMap<String, Provider>;

/// One clash configuration document (template, source or merged target).
///
/// Only the collections the merge touches are modelled; every other top level
/// key (`port`, `mode`, `dns`, ...) is carried through `settings` untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClashConfig {
    #[serde(flatten)]
    pub settings: Mapping,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_providers: Option<Providers>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_providers: Option<Providers>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<Proxy>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_groups: Option<Vec<ProxyGroup>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub r#type: String,

    /// server, port, cipher, transport options...
    #[serde(flatten)]
    pub options: Mapping,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyGroup {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub r#type: String,

    /// Member names, each a proxy or another group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<String>>,

    /// Proxy provider names.
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub r#use: Option<Vec<String>>,

    #[serde(flatten)]
    pub options: Mapping,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(rename = "type", default)]
    pub r#type: String,

    #[serde(flatten)]
    pub options: Mapping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyGroupType {
    Relay,
    Select,
    UrlTest,
    Fallback,
    LoadBalance,
}

impl ProxyGroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyGroupType::Relay => "relay",
            ProxyGroupType::Select => "select",
            ProxyGroupType::UrlTest => "url-test",
            ProxyGroupType::Fallback => "fallback",
            ProxyGroupType::LoadBalance => "load-balance",
        }
    }
}

impl FromStr for ProxyGroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Relay,
            Self::Select,
            Self::UrlTest,
            Self::Fallback,
            Self::LoadBalance,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("Unknown proxy group type: {s}"))
    }
}

impl fmt::Display for ProxyGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProxyGroup {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, r#type: ProxyGroupType, proxies: &[&str]) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.to_string(),
            proxies: Some(proxies.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    /// `None` for group types this tool doesn't know about.
    pub fn kind(&self) -> Option<ProxyGroupType> {
        self.r#type.parse().ok()
    }

    pub fn is_select(&self) -> bool {
        self.kind() == Some(ProxyGroupType::Select)
    }

    pub fn members(&self) -> &[String] {
        self.proxies.as_deref().unwrap_or_default()
    }
}

impl Proxy {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, r#type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.into(),
            options: Mapping::new(),
        }
    }
}

impl ClashConfig {
    pub fn proxy_list(&self) -> &[Proxy] {
        self.proxies.as_deref().unwrap_or_default()
    }

    pub fn group_list(&self) -> &[ProxyGroup] {
        self.proxy_groups.as_deref().unwrap_or_default()
    }

    pub fn rule_list(&self) -> &[String] {
        self.rules.as_deref().unwrap_or_default()
    }

    pub fn proxy_names(&self) -> Vec<&str> {
        self.proxy_list().iter().map(|p| p.name.as_str()).collect()
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.group_list().iter().map(|g| g.name.as_str()).collect()
    }

    #[cfg(test)]
    pub fn find_group(&self, name: &str) -> Option<&ProxyGroup> {
        self.group_list().iter().find(|g| g.name == name)
    }

    pub fn parsed_rules(&self) -> Vec<Rule> {
        self.rule_list().iter().map(|r| Rule::parse(r)).collect()
    }

    /// Rules whose group is neither a proxy group nor a built-in action.
    pub fn unroutable_rules(&self) -> Vec<Rule> {
        let groups = self.group_names();
        self.parsed_rules()
            .into_iter()
            .filter(|r| {
                !r.is_empty() && !r.is_reserved_action() && !groups.contains(&r.group.as_str())
            })
            .collect()
    }

    /// Group members that name neither a proxy, a group nor a built-in action.
    ///
    /// Returned as `(group, member)` pairs in document order.
    pub fn dangling_members(&self) -> Vec<(&str, &str)> {
        let known: HashSet<&str> = self
            .proxy_names()
            .into_iter()
            .chain(self.group_names())
            .collect();

        self.group_list()
            .iter()
            .flat_map(|g| {
                g.members()
                    .iter()
                    .filter(|m| {
                        !known.contains(m.as_str())
                            && !rule::RESERVED_ACTIONS
                                .iter()
                                .any(|k| k.eq_ignore_ascii_case(m))
                    })
                    .map(move |m| (g.name.as_str(), m.as_str()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
port: 7890
mode: rule
dns:
  enable: true
  nameserver:
    - 223.5.5.5
proxy-providers:
  airport:
    type: http
    url: https://example.com/sub
    interval: 3600
proxies:
  - name: HK-01
    type: ss
    server: hk.example.com
    port: 443
    cipher: aes-128-gcm
  - { name: JP-01, type: vmess, server: jp.example.com, port: 443 }
proxy-groups:
  - name: Proxy
    type: select
    proxies: [HK-01, JP-01, DIRECT]
  - name: Sub
    type: URL-Test
    use: [airport]
    url: http://www.gstatic.com/generate_204
    interval: 300
rules:
  - DOMAIN-SUFFIX,google.com,Proxy
  - MATCH,DIRECT
"#;

    #[test]
    fn test_parse_document() {
        let config: ClashConfig = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.proxy_names(), vec!["HK-01", "JP-01"]);
        assert_eq!(config.group_names(), vec!["Proxy", "Sub"]);
        assert_eq!(config.rule_list().len(), 2);
        assert_eq!(config.settings.get("mode").and_then(|v| v.as_str()), Some("rule"));

        let providers = config.proxy_providers.as_ref().unwrap();
        assert_eq!(providers["airport"].r#type, "http");

        let sub = config.find_group("Sub").unwrap();
        assert_eq!(sub.kind(), Some(ProxyGroupType::UrlTest));
        assert_eq!(sub.r#use.as_deref(), Some(&["airport".to_string()][..]));
        assert!(sub.members().is_empty());

        let hk = &config.proxy_list()[0];
        assert_eq!(hk.r#type, "ss");
        assert_eq!(hk.options.get("cipher").and_then(|v| v.as_str()), Some("aes-128-gcm"));
    }

    #[test]
    fn test_save_keeps_opaque_fields_and_omits_unset() {
        let config: ClashConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let text = serde_yaml::to_string(&config).unwrap();

        assert!(text.starts_with("port: 7890"));
        assert!(text.contains("proxy-groups:"));
        assert!(text.contains("cipher: aes-128-gcm"));
        assert!(!text.contains("rule-providers"));

        let reloaded: ClashConfig = serde_yaml::from_str(&text).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_group_type_is_case_insensitive() {
        assert_eq!("SELECT".parse::<ProxyGroupType>(), Ok(ProxyGroupType::Select));
        assert_eq!(
            "Load-Balance".parse::<ProxyGroupType>(),
            Ok(ProxyGroupType::LoadBalance)
        );
        assert!("smart".parse::<ProxyGroupType>().is_err());
    }

    #[test]
    fn test_dangling_members() {
        let mut config: ClashConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.dangling_members().is_empty());

        config.proxy_groups.as_mut().unwrap()[0]
            .proxies
            .as_mut()
            .unwrap()
            .push("US-01".to_string());
        assert_eq!(config.dangling_members(), vec![("Proxy", "US-01")]);
    }

    #[test]
    fn test_parsed_rules() {
        let config: ClashConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let rules = config.parsed_rules();
        assert_eq!(rules[0].group, "Proxy");
        // two-field MATCH lines are not in the 3/4 field shape
        assert!(rules[1].is_empty());
    }

    #[test]
    fn test_unroutable_rules() {
        let mut config: ClashConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.unroutable_rules().is_empty());

        config.rules.as_mut().unwrap().extend([
            "DOMAIN,a.com,direct".to_string(),
            "DOMAIN,b.com,Streaming".to_string(),
        ]);
        let unroutable = config.unroutable_rules();
        assert_eq!(unroutable.len(), 1);
        assert_eq!(unroutable[0].to_string(), "DOMAIN, b.com, Streaming");
    }
}
