use std::fmt;

use thiserror::Error;

/// The remote service an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    GitHub,
    Notion,
    Summarizer,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::GitHub => write!(f, "GitHub"),
            Service::Notion => write!(f, "Notion"),
            Service::Summarizer => write!(f, "summarizer"),
        }
    }
}

/// Error from a single remote call. The status-carrying variant is what the
/// per-service retry predicates classify; transport and payload errors never retry.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: Service,
        status: u16,
        body: String,
    },

    #[error("request to {service} failed: {source}")]
    Transport {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {service}: {reason}")]
    Response { service: Service, reason: String },
}

impl ApiError {
    pub fn transport(service: Service, source: reqwest::Error) -> Self {
        ApiError::Transport { service, source }
    }

    pub fn response(service: Service, reason: impl Into<String>) -> Self {
        ApiError::Response {
            service,
            reason: reason.into(),
        }
    }

    /// HTTP status code, if the remote answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn service(&self) -> Service {
        match self {
            ApiError::Status { service, .. }
            | ApiError::Transport { service, .. }
            | ApiError::Response { service, .. } => *service,
        }
    }
}

/// Pass through 2xx responses, convert anything else into `ApiError::Status`
/// with a trimmed copy of the body for diagnostics.
pub(crate) async fn check_status(
    service: Service,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        service,
        status: status.as_u16(),
        body: trim_body(&body),
    })
}

// Error bodies can be whole HTML pages; keep enough to diagnose.
fn trim_body(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(MAX).collect();
        cut.push('…');
        cut
    }
}
