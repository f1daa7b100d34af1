use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Activism categories, in scoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Governance,
    Financial,
    Protocol,
    Leadership,
    Emergency,
    Community,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Governance,
        Category::Financial,
        Category::Protocol,
        Category::Leadership,
        Category::Emergency,
        Category::Community,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Governance => "governance",
            Category::Financial => "financial",
            Category::Protocol => "protocol",
            Category::Leadership => "leadership",
            Category::Emergency => "emergency",
            Category::Community => "community",
        }
    }

    /// Source patterns, matched case-insensitively against title + body.
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            Category::Governance => &[
                r"change.*governance",
                r"modify.*voting",
                r"alter.*constitution",
                r"amend.*charter",
                r"restructure.*dao",
                r"reform.*protocol",
                r"governance.*upgrade",
                r"voting.*mechanism",
                r"consensus.*change",
            ],
            Category::Financial => &[
                r"treasury.*allocation",
                r"(fund.*realloc|realloc.*fund)",
                r"budget.*revision",
                r"spending.*proposal",
                r"investment.*strategy",
                r"diversify.*treasury",
                r"liquidate.*position",
                r"sell.*tokens",
                r"buy.*back",
            ],
            Category::Protocol => &[
                r"protocol.*change",
                r"parameter.*adjustment",
                r"fee.*modification",
                r"reward.*restructure",
                r"emission.*change",
                r"tokenomics.*update",
                r"upgrade.*contract",
                r"migrate.*protocol",
            ],
            Category::Leadership => &[
                r"remove.*team",
                r"(replace|remove).*lead",
                r"elect.*new",
                r"dismiss.*member",
                r"hire.*external",
                r"change.*management",
                r"new.*steward",
            ],
            Category::Emergency => &[
                r"emergency.*proposal",
                r"urgent.*action",
                r"immediate.*response",
                r"crisis.*management",
                r"halt.*protocol",
                r"pause.*contract",
            ],
            Category::Community => &[
                r"community.*(proposal|initiative)",
                r"grassroots.*initiative",
                r"member.*driven",
                r"collective.*action",
                r"decentralized.*decision",
                r"bottom.*up",
            ],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled patterns for one category, in table order.
#[derive(Debug, Clone)]
pub struct CategoryPatterns {
    pub category: Category,
    patterns: Vec<Regex>,
}

impl CategoryPatterns {
    pub fn compile(category: Category) -> Result<Self> {
        let patterns = category
            .patterns()
            .iter()
            .map(|source| {
                RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("invalid {category} pattern: {source}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { category, patterns })
    }

    /// Number of distinct patterns present in `text`.
    pub fn count_matches(&self, text: &str) -> usize {
        self.patterns.iter().filter(|p| p.is_match(text)).count()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Every category's compiled patterns, built once per classifier.
pub fn compile_all() -> Result<Vec<CategoryPatterns>> {
    Category::ALL.into_iter().map(CategoryPatterns::compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_hold_45_patterns() {
        let compiled = compile_all().unwrap();
        assert_eq!(compiled.len(), 6);
        assert_eq!(compiled.iter().map(CategoryPatterns::len).sum::<usize>(), 45);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let emergency = CategoryPatterns::compile(Category::Emergency).unwrap();
        assert_eq!(emergency.count_matches("EMERGENCY Proposal to PAUSE the Contract"), 2);
    }

    #[test]
    fn distinct_patterns_are_counted_once() {
        let financial = CategoryPatterns::compile(Category::Financial).unwrap();
        assert_eq!(financial.count_matches("buy back, then buy back again"), 1);
    }
}
