//! Credential extraction and token stripping.

use url::Url;

/// A bearer presented by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// One-time token from the query string.
    QueryToken(String),
    /// Session bearer from the cookie header.
    SessionCookie(String),
    None,
}

/// Every credential a request carries. A request may carry both a query
/// token and a session cookie; the token is tried first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub query_token: Option<String>,
    pub session_cookie: Option<String>,
}

impl Credentials {
    pub fn extract(
        url: &Url,
        cookie_header: Option<&str>,
        token_param: &str,
        cookie_name: &str,
    ) -> Self {
        Self {
            query_token: query_token(url, token_param),
            session_cookie: cookie_header.and_then(|h| session_cookie(h, cookie_name)),
        }
    }

    /// The credential validated first.
    pub fn primary(&self) -> Credential {
        match (&self.query_token, &self.session_cookie) {
            (Some(token), _) => Credential::QueryToken(token.clone()),
            (None, Some(session)) => Credential::SessionCookie(session.clone()),
            (None, None) => Credential::None,
        }
    }
}

/// Value of cookie `name`, ignoring empty values.
pub fn session_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Value of query parameter `param`, ignoring empty values and values that
/// cannot be stored verbatim in a cookie.
pub fn query_token(url: &Url, param: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty() && is_cookie_value(value))
}

/// RFC 6265 `cookie-octet`s only: no whitespace, `"`, `,`, `;` or `\`.
pub fn is_cookie_value(value: &str) -> bool {
    value.bytes().all(|b| {
        matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
    })
}

/// Copy of `url` with every `param` removed from the query. The query is
/// dropped entirely when nothing else remains.
pub fn strip_query_param(url: &Url, param: &str) -> Url {
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut canonical = url.clone();
    if remaining.is_empty() {
        canonical.set_query(None);
    } else {
        canonical
            .query_pairs_mut()
            .clear()
            .extend_pairs(remaining.iter());
    }
    canonical
}
