use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the Carousel library
#[derive(Error, Debug)]
pub enum CarouselError {
    // Selection errors
    #[error("No healthy proxies available in pool")]
    PoolEmpty,

    #[error("All circuit breakers open; service temporarily unavailable")]
    AllCircuitsOpen,

    // Pool errors
    #[error("Proxy pool is full (max {max_size} proxies)")]
    PoolCapacity { max_size: usize },

    // Per-proxy transport errors
    #[error("Proxy connection failed via {proxy_url}: {message}")]
    Connection {
        proxy_url: String,
        message: String,
        retry_recommended: bool,
    },

    #[error("Proxy {proxy_url} rejected credentials")]
    Authentication { proxy_url: String },

    #[error("Request via {proxy_url} timed out")]
    Timeout { proxy_url: String },

    // HTTP status outcomes
    #[error("Retryable HTTP status {status} via {proxy_url}")]
    RetriableStatus { status: u16, proxy_url: String },

    #[error("HTTP status {status} via {proxy_url}")]
    NonRetriableStatus { status: u16, proxy_url: String },

    // Construction/configuration errors
    #[error("Invalid proxy configuration: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown rotation strategy: {0}")]
    UnknownStrategy(String),

    // Exhaustion wrapper: the last error annotated with everything tried
    #[error("All {attempts} attempts failed (tried {} proxies): {last_error}", .proxies_tried.len())]
    RetriesExhausted {
        attempts: u32,
        proxies_tried: Vec<Uuid>,
        last_error: Box<CarouselError>,
    },

    // Request plane
    #[error("Total retry deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Carousel operations
pub type Result<T> = std::result::Result<T, CarouselError>;

impl CarouselError {
    /// Whether the retry executor may attempt the request again on another proxy
    pub fn retryable(&self) -> bool {
        match self {
            CarouselError::Connection {
                retry_recommended, ..
            } => *retry_recommended,
            CarouselError::Timeout { .. } | CarouselError::RetriableStatus { .. } => true,
            _ => false,
        }
    }

    /// The sanitized URL of the proxy the error occurred on, if any
    pub fn proxy_url(&self) -> Option<&str> {
        match self {
            CarouselError::Connection { proxy_url, .. }
            | CarouselError::Authentication { proxy_url }
            | CarouselError::Timeout { proxy_url }
            | CarouselError::RetriableStatus { proxy_url, .. }
            | CarouselError::NonRetriableStatus { proxy_url, .. } => Some(proxy_url),
            _ => None,
        }
    }

    /// Closest HTTP status analogue, for callers bridging to a service surface
    pub fn status_analogue(&self) -> u16 {
        match self {
            CarouselError::PoolEmpty | CarouselError::AllCircuitsOpen => 503,
            CarouselError::Connection { .. } => 502,
            CarouselError::Authentication { .. } => 407,
            CarouselError::Timeout { .. } | CarouselError::DeadlineExceeded => 504,
            CarouselError::RetriableStatus { status, .. }
            | CarouselError::NonRetriableStatus { status, .. } => *status,
            CarouselError::Validation(_)
            | CarouselError::InvalidConfig(_)
            | CarouselError::UnknownStrategy(_) => 400,
            CarouselError::PoolCapacity { .. } => 409,
            CarouselError::RetriesExhausted { last_error, .. } => last_error.status_analogue(),
            CarouselError::Internal(_) => 500,
        }
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for CarouselError {
    fn from(err: url::ParseError) -> Self {
        CarouselError::Validation(format!("invalid proxy URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CarouselError::Timeout {
            proxy_url: "http://h:1".into()
        }
        .retryable());
        assert!(CarouselError::RetriableStatus {
            status: 503,
            proxy_url: "http://h:1".into()
        }
        .retryable());
        assert!(CarouselError::Connection {
            proxy_url: "http://h:1".into(),
            message: "refused".into(),
            retry_recommended: true,
        }
        .retryable());

        assert!(!CarouselError::PoolEmpty.retryable());
        assert!(!CarouselError::AllCircuitsOpen.retryable());
        assert!(!CarouselError::Authentication {
            proxy_url: "http://h:1".into()
        }
        .retryable());
        assert!(!CarouselError::NonRetriableStatus {
            status: 404,
            proxy_url: "http://h:1".into()
        }
        .retryable());
    }

    #[test]
    fn test_status_analogue_mapping() {
        assert_eq!(CarouselError::AllCircuitsOpen.status_analogue(), 503);
        assert_eq!(CarouselError::PoolEmpty.status_analogue(), 503);
        assert_eq!(
            CarouselError::Timeout {
                proxy_url: "http://h:1".into()
            }
            .status_analogue(),
            504
        );
        assert_eq!(
            CarouselError::Validation("bad".into()).status_analogue(),
            400
        );
        assert_eq!(
            CarouselError::PoolCapacity { max_size: 10 }.status_analogue(),
            409
        );
    }

    #[test]
    fn test_exhausted_wrapper_reports_inner() {
        let inner = CarouselError::Connection {
            proxy_url: "http://h:1".into(),
            message: "refused".into(),
            retry_recommended: true,
        };
        let err = CarouselError::RetriesExhausted {
            attempts: 3,
            proxies_tried: vec![Uuid::new_v4(), Uuid::new_v4()],
            last_error: Box::new(inner),
        };

        assert_eq!(err.status_analogue(), 502);
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("2 proxies"));
    }
}
