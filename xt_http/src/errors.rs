use thiserror::Error;
use xt_ratelimit::ConfigError;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Credentials required for {0}")]
    MissingCredentials(&'static str),

    #[error("Admission not granted within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Invalid throttle configuration: {0}")]
    Config(#[from] ConfigError),
}

impl HttpError {
    /// Whether the request may have reached the exchange.
    ///
    /// Only failures that provably happened before anything was sent count as
    /// unserviced: building the request, connecting, signing, admission. A
    /// timeout or a broken body after the request was written may already have
    /// been charged by the exchange.
    pub fn was_serviced(&self) -> bool {
        match self {
            HttpError::Api { .. } => true,
            HttpError::RequestFailed(err) => !(err.is_connect() || err.is_builder()),
            HttpError::AuthenticationFailed(_) | HttpError::MissingCredentials(_) | HttpError::Timeout(_) | HttpError::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serviced_errors() {
        assert!(HttpError::Api { status: 429, body: "{}".into() }.was_serviced());
        assert!(!HttpError::MissingCredentials("account").was_serviced());
        assert!(!HttpError::Timeout(std::time::Duration::from_secs(1)).was_serviced());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: HttpError = ConfigError::ZeroLimit.into();
        assert_eq!(err.to_string(), "Invalid throttle configuration: window limit must be greater than 0");
    }
}
