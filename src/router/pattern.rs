use std::fmt;

/// Pattern
///
/// A parsed route pattern of the form `[METHOD ][HOST]/PATH`.
///
/// `method` and `host` are `None` when the pattern leaves them out, meaning the
/// route accepts any method or any host. `path` is always cleaned and always
/// starts with `/`; it never carries a trailing slash except for the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pattern {
    pub method: Option<String>,
    pub host: Option<String>,
    pub path: String,
}

impl Pattern {
    /// parse
    ///
    /// Splits a pattern string into method, host and path. Parsing never fails:
    /// anything that does not look like `[METHOD ][HOST]/PATH` is taken whole as
    /// the path.
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();

        // "[METHOD ][HOST]" is everything before the first slash.
        let Some(slash) = pattern.find('/') else {
            return Self::path_only(pattern);
        };
        let (prefix, path) = pattern.split_at(slash);

        if prefix.is_empty() {
            return Self::path_only(path);
        }

        // A single space separates the method from the host, and the host may
        // be empty ("GET /foo"). Anything with more spaces is malformed.
        match prefix.split_once(' ') {
            None => Self {
                method: None,
                host: non_empty(prefix),
                path: clean_path(path),
            },
            Some((method, host)) if !method.is_empty() && !host.contains(' ') => Self {
                method: Some(method.to_string()),
                host: non_empty(host),
                path: clean_path(path),
            },
            Some(_) => Self::path_only(pattern),
        }
    }

    fn path_only(path: &str) -> Self {
        Self {
            method: None,
            host: None,
            path: clean_path(path),
        }
    }

    /// key
    ///
    /// The dispatch key this pattern is stored under: `[METHOD ][HOST]PATH/`.
    /// The trailing slash makes `/foo` and `/foo/` the same route.
    pub fn key(&self) -> String {
        let mut key = String::new();
        if let Some(method) = &self.method {
            key.push_str(method);
            key.push(' ');
        }
        if let Some(host) = &self.host {
            key.push_str(host);
        }
        key.push_str(&normalize(&self.path));
        key
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "{method} ")?;
        }
        if let Some(host) = &self.host {
            f.write_str(host)?;
        }
        f.write_str(&self.path)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// clean_path
///
/// Lexically cleans a path: collapses repeated slashes, drops `.` segments,
/// resolves `..` against the preceding segment and removes the trailing slash.
/// The result always starts with `/`.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// normalize
///
/// Cleans a path and guarantees it both starts and ends with `/`.
pub fn normalize(path: &str) -> String {
    let cleaned = clean_path(path);
    if cleaned.ends_with('/') {
        cleaned
    } else {
        cleaned + "/"
    }
}

/// join
///
/// Joins a mount prefix with a child route path.
pub fn join(prefix: &str, path: &str) -> String {
    clean_path(&format!("{prefix}/{path}"))
}

/// Name of the catch-all parameter when `segment` is written `{name...}`.
pub(crate) fn catch_all_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix("...}"))
        .filter(|name| !name.is_empty())
}

/// axum_paths
///
/// The paths registered with axum's matcher for a cleaned route path. A route
/// answers both with and without the trailing slash; catch-all routes are
/// translated from `{name...}` to axum's `{*name}` form.
pub(crate) fn axum_paths(path: &str) -> Vec<String> {
    if path == "/" {
        return vec![path.to_string()];
    }

    let mut catch_all = false;
    let translated = path
        .split('/')
        .map(|segment| match catch_all_name(segment) {
            Some(name) => {
                catch_all = true;
                format!("{{*{name}}}")
            }
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/");

    if catch_all {
        vec![translated]
    } else {
        vec![translated.clone(), translated + "/"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(p: &Pattern) -> (Option<&str>, Option<&str>, &str) {
        (p.method.as_deref(), p.host.as_deref(), p.path.as_str())
    }

    #[test]
    fn parses_path_only_patterns() {
        assert_eq!(parts(&Pattern::parse("/foo/bar")), (None, None, "/foo/bar"));
        assert_eq!(parts(&Pattern::parse("  /foo//bar/ ")), (None, None, "/foo/bar"));
        assert_eq!(parts(&Pattern::parse("/")), (None, None, "/"));
    }

    #[test]
    fn parses_host_and_method() {
        assert_eq!(
            parts(&Pattern::parse("example.com/foo")),
            (None, Some("example.com"), "/foo")
        );
        assert_eq!(parts(&Pattern::parse("GET /foo")), (Some("GET"), None, "/foo"));
        assert_eq!(
            parts(&Pattern::parse("POST example.com/foo")),
            (Some("POST"), Some("example.com"), "/foo")
        );
        // Unknown verbs are accepted as-is.
        assert_eq!(parts(&Pattern::parse("BREW /pot")), (Some("BREW"), None, "/pot"));
    }

    #[test]
    fn malformed_input_is_a_path() {
        assert_eq!(parts(&Pattern::parse("foo")), (None, None, "/foo"));
        assert_eq!(
            parts(&Pattern::parse("GET a b/c")),
            (None, None, "/GET a b/c")
        );
    }

    #[test]
    fn reparsing_the_key_is_idempotent() {
        for raw in [
            "/",
            "/foo",
            "/foo/",
            "GET /foo/bar",
            "example.com/x/../y",
            "PUT example.com/a//b/",
            "/projects/{id...}",
        ] {
            let parsed = Pattern::parse(raw);
            let reparsed = Pattern::parse(&parsed.key());
            assert_eq!(parsed, reparsed, "pattern {raw:?}");
        }
    }

    #[test]
    fn normalization_adds_slashes_on_both_ends() {
        for raw in ["", "foo", "/foo", "/foo/", "//foo//bar", "/a/./b/../c"] {
            let n = normalize(raw);
            assert!(n.starts_with('/') && n.ends_with('/'), "{raw:?} -> {n:?}");
        }
        assert_eq!(normalize("/foo"), normalize("/foo/"));
        assert_eq!(Pattern::parse("/foo").key(), Pattern::parse("/foo/").key());
    }

    #[test]
    fn key_layout() {
        assert_eq!(Pattern::parse("GET example.com/bar").key(), "GET example.com/bar/");
        assert_eq!(Pattern::parse("GET /bar").key(), "GET /bar/");
        assert_eq!(Pattern::parse("/").key(), "/");
    }

    #[test]
    fn join_cleans_the_result() {
        assert_eq!(join("/api", "/bar"), "/api/bar");
        assert_eq!(join("/api/", "/"), "/api");
        assert_eq!(join("/", "/bar"), "/bar");
    }

    #[test]
    fn axum_paths_cover_trailing_slash_and_catch_all() {
        assert_eq!(axum_paths("/"), vec!["/"]);
        assert_eq!(axum_paths("/foo"), vec!["/foo", "/foo/"]);
        assert_eq!(axum_paths("/p/{id}"), vec!["/p/{id}", "/p/{id}/"]);
        assert_eq!(axum_paths("/static/{path...}"), vec!["/static/{*path}"]);
    }
}
