//! Minimal URL handling for tileset documents: resolving content URIs
//! against the document that declared them and appending query parameters.

/// Split `url` into (scheme + authority, path, query) where the query
/// excludes the leading `?` and any fragment is dropped.
fn split(url: &str) -> (&str, &str, Option<&str>) {
    let url = url.split('#').next().unwrap_or(url);
    let (rest, query) = match url.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (url, None),
    };

    let (authority, path) = match rest.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            match rest[after..].find('/') {
                Some(slash) => rest.split_at(after + slash),
                None => (rest, ""),
            }
        }
        None => ("", rest),
    };
    (authority, path, query)
}

fn has_scheme(uri: &str) -> bool {
    uri.contains("://") || uri.starts_with("data:")
}

/// Collapse `.` and `..` segments. Leading `..` on a relative path are kept.
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = segments.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if path.ends_with('/') && !out.is_empty() && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Resolve `relative` against `base`.
///
/// Absolute URLs are returned as-is. Otherwise the result keeps the
/// base's scheme and host, and the base's query string is carried over so
/// access tokens follow content requests.
pub fn resolve(base: &str, relative: &str) -> String {
    if has_scheme(relative) {
        return relative.to_string();
    }

    let (authority, base_path, base_query) = split(base);
    let (_, relative_path, relative_query) = split(relative);

    let joined = if relative_path.starts_with('/') {
        relative_path.to_string()
    } else {
        let directory = match base_path.rfind('/') {
            Some(slash) => &base_path[..=slash],
            None => "",
        };
        format!("{directory}{relative_path}")
    };

    let mut resolved = format!("{authority}{}", normalize_path(&joined));
    let query = [relative_query, base_query]
        .into_iter()
        .flatten()
        .filter(|q| !q.is_empty())
        .collect::<Vec<_>>()
        .join("&");
    let query = (!query.is_empty()).then_some(query);
    if let Some(query) = query {
        resolved.push('?');
        resolved.push_str(&query);
    }
    resolved
}

/// Append `key=value` to the query string of `url`.
pub fn add_query(url: &str, key: &str, value: &str) -> String {
    let (url, fragment) = match url.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (url, None),
    };
    let separator = if !url.contains('?') {
        "?"
    } else if url.ends_with('?') || url.ends_with('&') {
        ""
    } else {
        "&"
    };

    let mut out = format!("{url}{separator}{key}={value}");
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Strip a `file://` scheme, returning the local path if `url` names one.
pub fn to_file_path(url: &str) -> Option<&str> {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(path) = url.strip_prefix("file://") {
        Some(path)
    } else if has_scheme(url) {
        None
    } else {
        Some(url)
    }
}
