use url::Url;

/// Resolves a relative endpoint template against the API base URL.
///
/// Each `{name}` segment is replaced by the matching parameter and percent-encoded as a
/// single path segment, so ids containing `/` or `?` cannot escape their segment.
pub(crate) fn resolve(base: &Url, template: &str, params: &[(&str, &str)]) -> Option<Url> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        for segment in template.split('/').filter(|s| !s.is_empty()) {
            let value = segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(|name| {
                    params
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                })
                .unwrap_or(Some(segment))?;
            segments.push(value);
        }
    }
    url.set_query(None);
    Some(url)
}
