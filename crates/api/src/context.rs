use axum::http::HeaderValue;
use uuid::Uuid;

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for a request.
///
/// Taken from the incoming `x-request-id` header when present, otherwise
/// freshly generated (UUIDv7, so ids sort by arrival time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Accept a caller-supplied id if it is non-empty visible ASCII of sane length.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        let s = value.to_str().ok()?.trim();
        if s.is_empty() || s.len() > 128 {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_v7() {
        let id = RequestId::generate();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn rejects_blank_and_oversized_headers() {
        assert!(RequestId::from_header(&HeaderValue::from_static("  ")).is_none());
        let long = "a".repeat(200);
        assert!(RequestId::from_header(&HeaderValue::from_str(&long).unwrap()).is_none());
        assert_eq!(
            RequestId::from_header(&HeaderValue::from_static("abc-123")).unwrap().as_str(),
            "abc-123"
        );
    }
}
