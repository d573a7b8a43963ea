use url::form_urlencoded;

/// Appends `params` to `base` as a form-encoded query string. The parameters are joined with `&` if `base` already
/// carries a query, and with `?` otherwise. If there are no parameters, `base` is returned unchanged.
pub fn append_query<'a, I>(base: &str, params: I) -> String
where I: IntoIterator<Item = (&'a str, &'a str)> {
    let query = form_urlencoded::Serializer::new(String::new()).extend_pairs(params).finish();
    if query.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}
