//! Jekyll-style YAML front matter: a `---` delimited block at the top of a
//! markdown post.

use serde::{Deserialize, Serialize};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub layout: String,
    pub title: String,
    pub date: String,
    pub description: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

pub fn render_front_matter(front_matter: &FrontMatter) -> Result<String> {
    let yaml = serde_yaml::to_string(front_matter)?;
    Ok(format!("---\n{}---\n", yaml))
}

/// Splits a post into its front matter and the markdown body after it.
pub fn parse_front_matter(text: &str) -> Result<(FrontMatter, String)> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Err(Error::FrontMatter("post does not start with '---'".to_string())),
    }

    let mut yaml = String::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }
    if !closed {
        return Err(Error::FrontMatter("front matter is not terminated".to_string()));
    }

    let front_matter = if yaml.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str(&yaml)?
    };
    let body: String = lines.collect();
    Ok((front_matter, body))
}
