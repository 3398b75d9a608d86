//! Google-style docstring parsing for function tools.
//!
//! ```text
//! Returns the title of a book.
//!
//! Longer explanation, possibly over
//! several lines.
//!
//! Args:
//!     title (str): The title of the book.
//!     author: The author of the book. Continuation lines
//!         are appended to the description.
//!
//! Returns:
//!     Ignored.
//! ```

use crate::utils::dedent;
use once_cell::sync::Lazy;
use regex::Regex;

static SECTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(Args|Arguments|Parameters|Params|Returns|Return|Yields|Raises|Exceptions|Example|Examples|Note|Notes|Attributes):\s*$",
    )
    .expect("valid section regex")
});

static PARAM_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*{0,2}([A-Za-z_][A-Za-z0-9_]*)\s*(?:\(([^)]*)\))?\s*:\s*(.*)$")
        .expect("valid parameter regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Docstring {
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub params: Vec<DocParam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocParam {
    pub name: String,
    pub type_name: Option<String>,
    pub description: String,
}

impl Docstring {
    /// Short description, a blank line, then the long description when present.
    pub fn description(&self) -> Option<String> {
        let short = self.short_description.as_ref()?;
        Some(match &self.long_description {
            Some(long) => format!("{}\n\n{}", short, long),
            None => short.clone(),
        })
    }
}

pub fn parse(text: &str) -> Docstring {
    let text = dedent(text);
    let lines: Vec<&str> = text.trim().lines().collect();

    let desc_end = lines
        .iter()
        .position(|l| SECTION_HEADER.is_match(l.trim_end()))
        .unwrap_or(lines.len());

    let mut doc = Docstring::default();
    let desc = lines[..desc_end].join("\n");
    let desc = desc.trim();
    if !desc.is_empty() {
        let mut split = desc.splitn(2, '\n');
        doc.short_description = split.next().map(|s| s.trim().to_string());
        doc.long_description = split
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    let mut i = desc_end;
    while i < lines.len() {
        let header = lines[i].trim_end();
        let section = SECTION_HEADER
            .captures(header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        i += 1;
        let start = i;
        while i < lines.len() && !SECTION_HEADER.is_match(lines[i].trim_end()) {
            i += 1;
        }
        if matches!(
            section.as_str(),
            "Args" | "Arguments" | "Parameters" | "Params"
        ) {
            doc.params.extend(parse_params(&lines[start..i]));
        }
    }

    doc
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn parse_params(lines: &[&str]) -> Vec<DocParam> {
    let base_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);

    let mut params: Vec<DocParam> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) > base_indent {
            if let Some(last) = params.last_mut() {
                let extra = line.trim();
                if last.description.is_empty() {
                    last.description = extra.to_string();
                } else {
                    last.description.push(' ');
                    last.description.push_str(extra);
                }
            }
            continue;
        }
        if let Some(caps) = PARAM_ENTRY.captures(line.trim()) {
            params.push(DocParam {
                name: caps[1].to_string(),
                type_name: caps.get(2).map(|m| m.as_str().trim().to_string()),
                description: caps
                    .get(3)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            });
        }
    }
    params
}
