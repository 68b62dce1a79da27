use std::{convert::Infallible, fmt, str::FromStr};

/// Group values that name a built-in action instead of a proxy group.
pub const RESERVED_ACTIONS: [&str; 3] = ["DIRECT", "REJECT", "PROXY"];

/// A single routing rule line, e.g. `DOMAIN-SUFFIX, google.com, Proxy, no-resolve`.
///
/// Parsing is lenient: anything that isn't 3 or 4 fields becomes the empty
/// rule instead of an error, so unparseable lines pass through the pipeline.
#[derive(Clone, Debug, Default, Eq)]
pub struct Rule {
    pub r#type: String,
    pub address: String,
    pub group: String,
    pub option: String,
}

impl Rule {
    pub fn parse(text: &str) -> Self {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if !(3..=4).contains(&fields.len()) || fields.iter().any(|f| f.is_empty()) {
            return Self::default();
        }

        let mut group = fields[2].to_string();
        if RESERVED_ACTIONS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&group))
        {
            group.make_ascii_uppercase();
        }

        Self {
            r#type: fields[0].to_uppercase(),
            address: fields[1].to_string(),
            group,
            option: fields.get(3).map(|s| s.to_string()).unwrap_or_default(),
        }
    }

    /// Trims every field and re-joins with `", "`, leaving case alone.
    ///
    /// This is the form rules are compared by while merging.
    pub fn canonicalize(text: &str) -> String {
        text.split(',').map(str::trim).collect::<Vec<_>>().join(", ")
    }

    /// The malformed-input rule.
    pub fn is_empty(&self) -> bool {
        self.r#type.is_empty()
            && self.address.is_empty()
            && self.group.is_empty()
            && self.option.is_empty()
    }

    pub fn is_reserved_action(&self) -> bool {
        RESERVED_ACTIONS.contains(&self.group.as_str())
    }
}

impl FromStr for Rule {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r#type = self.r#type.to_uppercase();
        let fields: Vec<&str> = [
            r#type.as_str(),
            self.address.as_str(),
            self.group.as_str(),
            self.option.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        f.write_str(&fields.join(", "))
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: &str, b: &str) -> bool {
            a.to_lowercase() == b.to_lowercase()
        }

        same(&self.r#type, &other.r#type)
            && same(&self.address, &other.address)
            && same(&self.group, &other.group)
            && same(&self.option, &other.option)
    }
}
