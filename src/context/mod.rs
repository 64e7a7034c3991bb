//! Per-request context handed to route handlers.
//!
//! Bundles the parsed [`Request`] with the path parameters the router
//! extracted from the matched pattern.

use std::collections::HashMap;

use crate::Request;

/// Path parameters extracted from the matched route pattern.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a captured parameter.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Returns a captured parameter value by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns the number of captured parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no parameters were captured.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request context: the parsed request plus extracted path parameters.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// Creates a context with no path parameters.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
        }
    }

    /// Creates a context carrying the parameters captured by the router.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    /// Returns the underlying request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the captured path parameters.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Convenience passthrough to [`Request::query_param`].
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.request.query_param(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(target: &str) -> Request {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn params_roundtrip() {
        let mut params = PathParams::new();
        params.insert("id".into(), "42".into());
        let ctx = Context::with_params(make_request("/api/users/42"), params);
        assert_eq!(ctx.params().get("id"), Some("42"));
        assert_eq!(ctx.params().get("missing"), None);
    }

    #[test]
    fn query_param_passthrough() {
        let ctx = Context::new(make_request("/api/orders?userId=3"));
        assert_eq!(ctx.query_param("userId"), Some("3"));
        assert!(ctx.params().is_empty());
    }
}
