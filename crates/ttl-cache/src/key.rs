/// Build a deterministic cache key from an endpoint and its query parameters.
///
/// Parameters are sorted by name (then value) so that equivalent queries
/// collide regardless of the order they were supplied in. Names and values are
/// percent-encoded; with no parameters the key is the bare endpoint.
///
/// ```
/// use ttl_cache::cache_key;
///
/// let a = cache_key("pets", [("species", "cat"), ("age", "kitten")]);
/// let b = cache_key("pets", [("age", "kitten"), ("species", "cat")]);
/// assert_eq!(a, b);
/// assert_eq!(a, "pets?age=kitten&species=cat");
/// ```
pub fn cache_key<I, K, V>(endpoint: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k.as_ref()).into_owned(),
                urlencoding::encode(v.as_ref()).into_owned(),
            )
        })
        .collect();

    if pairs.is_empty() {
        return endpoint.to_string();
    }

    pairs.sort();

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_params() {
        let params: [(&str, &str); 0] = [];
        assert_eq!(cache_key("favorites", params), "favorites");
    }

    #[test]
    fn test_single_param() {
        assert_eq!(cache_key("pets", [("species", "cat")]), "pets?species=cat");
    }

    #[test]
    fn test_params_sorted_by_name() {
        let key = cache_key(
            "pets",
            [("size", "small"), ("breed", "siamese"), ("page", "2")],
        );
        assert_eq!(key, "pets?breed=siamese&page=2&size=small");
    }

    #[test]
    fn test_values_are_encoded() {
        let key = cache_key("pets", [("location", "San Francisco, CA")]);
        assert_eq!(key, "pets?location=San%20Francisco%2C%20CA");
    }

    #[test]
    fn test_owned_params() {
        let params = vec![("limit".to_string(), 20.to_string())];
        assert_eq!(cache_key("inquiries", params), "inquiries?limit=20");
    }
}
