/// Mask the password of a connection URI or DSN before it is logged.
///
/// `postgres://u:secret@h/d` becomes `postgres://u:****@h/d`; `u:secret@tcp(h)/d`
/// becomes `u:****@tcp(h)/d`. Strings without credentials pass through.
pub fn redact_uri(uri: &str) -> String {
    let (scheme, rest) = match uri.find("://") {
        Some(i) => uri.split_at(i + 3),
        None => ("", uri),
    };
    let authority_end = rest.find(&['/', '?'][..]).unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@').or_else(|| {
        // DSN passwords may contain `/`.
        if scheme.is_empty() {
            rest.find('@')
        } else {
            None
        }
    }) else {
        return uri.to_string();
    };
    let userinfo = &rest[..at];
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{scheme}{user}:****{}", &rest[at..]),
        None => uri.to_string(),
    }
}
