//! HTTP verbs a route can be registered for.

use std::fmt;

use axum::routing::MethodFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub(crate) fn filter(self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
            HttpMethod::Head => MethodFilter::HEAD,
            HttpMethod::Options => MethodFilter::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for http::Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// The verbs a single route answers to. Duplicates collapse, order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Methods(Vec<HttpMethod>);

impl Methods {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, method: HttpMethod) -> bool {
        self.0.contains(&method)
    }

    pub fn iter(&self) -> impl Iterator<Item = HttpMethod> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<HttpMethod> for Methods {
    fn from_iter<I: IntoIterator<Item = HttpMethod>>(iter: I) -> Self {
        let mut out = Vec::new();
        for m in iter {
            if !out.contains(&m) {
                out.push(m);
            }
        }
        Methods(out)
    }
}

impl From<HttpMethod> for Methods {
    fn from(m: HttpMethod) -> Self {
        Methods(vec![m])
    }
}

impl<const N: usize> From<[HttpMethod; N]> for Methods {
    fn from(ms: [HttpMethod; N]) -> Self {
        ms.into_iter().collect()
    }
}

impl From<Vec<HttpMethod>> for Methods {
    fn from(ms: Vec<HttpMethod>) -> Self {
        ms.into_iter().collect()
    }
}

impl fmt::Display for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|m| m.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_methods_collapse_in_order() {
        let set = Methods::from([HttpMethod::Post, HttpMethod::Get, HttpMethod::Post]);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![HttpMethod::Post, HttpMethod::Get]
        );
        assert_eq!(set.to_string(), "POST,GET");
    }

    #[test]
    fn empty_set_is_reported() {
        assert!(Methods::from(Vec::new()).is_empty());
        assert!(!Methods::from(HttpMethod::Get).is_empty());
    }

    #[test]
    fn converts_to_http_method() {
        assert_eq!(http::Method::from(HttpMethod::Patch), http::Method::PATCH);
    }
}
