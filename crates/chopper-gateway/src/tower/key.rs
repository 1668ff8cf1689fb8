//! Client key extraction

/// Strategy for deriving the admission key of a request
///
/// The key picks the token bucket a request draws from. Requests that
/// yield the same key share a bucket.
pub trait ClientKeyExtractor: Send + Sync + 'static {
    /// Derive the client key for a request
    ///
    /// Returning an empty string is allowed; all such requests share one bucket.
    fn client_key<B>(&self, req: &http::Request<B>) -> String;
}

/// Client IP from proxy headers
///
/// Checks, in order:
/// 1. `X-Forwarded-For` (first address in the list)
/// 2. `X-Real-IP`
/// 3. empty key if neither is present
///
/// Only trust this behind a reverse proxy that overwrites these headers.
/// Otherwise clients pick their own bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpKeyExtractor;

impl ClientKeyExtractor for IpKeyExtractor {
    fn client_key<B>(&self, req: &http::Request<B>) -> String {
        let headers = req.headers();
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
            })
            .unwrap_or_default()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder().uri("/me");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let req = request(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "10.0.0.2"),
        ]);
        assert_eq!(IpKeyExtractor.client_key(&req), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = request(&[("x-real-ip", "198.51.100.4")]);
        assert_eq!(IpKeyExtractor.client_key(&req), "198.51.100.4");
    }

    #[test]
    fn test_no_headers_gives_empty_key() {
        assert_eq!(IpKeyExtractor.client_key(&request(&[])), "");
    }
}
