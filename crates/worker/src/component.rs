use std::sync::OnceLock;

use regex::Regex;

/// Module name from an issue form's "Component Name" section.
pub fn parse_component_name(body: &str) -> Option<&str> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = REGEX
        .get_or_init(|| Regex::new(r"###\s*Component Name\s*\n+([a-zA-Z0-9_]+)").unwrap());
    regex.captures(body).and_then(|c| c.get(1)).map(|m| m.as_str())
}

pub fn component_path(prefix: &str, name: &str) -> String {
    format!("{}/{}.py", prefix.trim_end_matches('/'), name)
}

pub fn link_comment(path: &str, url: &str) -> String {
    format!("Files identified in the description:\n\n- [**{path}**]({url})")
}
