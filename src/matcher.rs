//! Structural matching of concrete URLs against generic templates.
//!
//! A template is a path with optional query where any segment, query key or
//! query value may be a `{placeholder}`. Matching is purely structural:
//! equal segment and pair counts, and exact-or-placeholder equality.

use std::collections::HashMap;

/// True iff the concrete URL has the same shape as the template.
pub fn matches(template: &str, url: &str) -> bool {
    match (template.split_once('?'), url.split_once('?')) {
        (None, None) => path_matches(template, url),
        (Some((template_path, template_query)), Some((url_path, url_query))) => {
            path_matches(template_path, url_path) && query_matches(template_query, url_query)
        }
        _ => false,
    }
}

fn path_matches(template: &str, url: &str) -> bool {
    let template_segments = split_dropping_trailing(template, '/');
    let url_segments = split_dropping_trailing(url, '/');
    template_segments.len() == url_segments.len()
        && template_segments
            .iter()
            .zip(&url_segments)
            .all(|(generic, specific)| token_matches(generic, specific))
}

fn query_matches(template: &str, url: &str) -> bool {
    let template_pairs = split_dropping_trailing(template, '&');
    let url_pairs = split_dropping_trailing(url, '&');
    if template_pairs.len() != url_pairs.len() {
        return false;
    }
    template_pairs.iter().zip(&url_pairs).all(|(generic, specific)| {
        let generic_parts = split_dropping_trailing(generic, '=');
        let specific_parts = split_dropping_trailing(specific, '=');
        generic_parts.len() == specific_parts.len()
            && generic_parts
                .iter()
                .zip(&specific_parts)
                .all(|(g, s)| token_matches(g, s))
    })
}

/// Split on the separator, dropping trailing empty elements so delimiters
/// at the end of a URL (`/files/upload/`, `?action=view&`) do not change
/// the element count.
fn split_dropping_trailing(text: &str, separator: char) -> Vec<&str> {
    let mut parts: Vec<&str> = text.split(separator).collect();
    while parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

fn token_matches(generic: &str, specific: &str) -> bool {
    is_placeholder(generic) || generic == specific
}

fn is_placeholder(token: &str) -> bool {
    token.starts_with('{') && token.ends_with('}')
}

/// Extract the values bound to each `{placeholder}` of a template that
/// already matched the URL. Unmatched pairs simply yield no binding.
pub fn bindings(template: &str, url: &str) -> HashMap<String, String> {
    let mut bound = HashMap::new();
    let (template_path, template_query) = split(template);
    let (url_path, url_query) = split(url);

    for (generic, specific) in template_path.split('/').zip(url_path.split('/')) {
        bind(&mut bound, generic, specific);
    }
    if let (Some(template_query), Some(url_query)) = (template_query, url_query) {
        for (generic_pair, specific_pair) in template_query.split('&').zip(url_query.split('&')) {
            for (generic, specific) in generic_pair.split('=').zip(specific_pair.split('=')) {
                bind(&mut bound, generic, specific);
            }
        }
    }
    bound
}

fn split(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

fn bind(bound: &mut HashMap<String, String>, generic: &str, specific: &str) {
    if is_placeholder(generic) {
        let name = &generic[1..generic.len() - 1];
        bound.insert(name.to_string(), specific.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_paths_must_be_equal() {
        assert!(matches("/files/upload", "/files/upload"));
        assert!(!matches("/files/upload", "/files/download"));
    }

    #[test]
    fn placeholders_match_any_segment() {
        assert!(matches("/files/name/{name}", "/files/name/report.txt"));
        assert!(matches("/files/id/{id}", "/files/id/42"));
        assert!(!matches("/files/name/{name}", "/files/id/42"));
    }

    #[test]
    fn segment_counts_must_agree() {
        assert!(!matches("/files/name/{name}", "/files/name"));
        assert!(!matches("/files/name/{name}", "/files/name/a/b"));
    }

    #[test]
    fn trailing_delimiters_do_not_break_the_match() {
        assert!(matches("/files/upload", "/files/upload/"));
        assert!(matches(
            "/files/query/{query}?action=view",
            "/files/query/all?action=view&"
        ));
        // Missing content before the delimiter is still a mismatch.
        assert!(!matches("/files/name/{name}", "/files/name//"));
    }

    #[test]
    fn query_presence_must_agree() {
        assert!(!matches("/files/id/{id}", "/files/id/1?action=view"));
        assert!(!matches("/files/id/{id}?action=view", "/files/id/1"));
    }

    #[test]
    fn query_keys_are_literal_and_values_may_be_bound() {
        let template = "/files/id/{id}?action=update-name&value={value}";
        assert!(matches(template, "/files/id/7?action=update-name&value=b.txt"));
        assert!(!matches(template, "/files/id/7?action=override&value=b.txt"));
        assert!(!matches(template, "/files/id/7?action=update-name"));
    }

    #[test]
    fn bindings_capture_path_and_query_placeholders() {
        let template = "/files/id/{id}?action=update-name&value={value}";
        let bound = bindings(template, "/files/id/7?action=update-name&value=b.txt");
        assert_eq!(bound.get("id").map(String::as_str), Some("7"));
        assert_eq!(bound.get("value").map(String::as_str), Some("b.txt"));
        assert_eq!(bound.len(), 2);
    }

    #[test]
    fn bindings_on_literal_template_are_empty() {
        assert!(bindings("/files/upload", "/files/upload").is_empty());
    }
}
