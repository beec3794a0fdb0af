use anyhow::Context;
use serde_json::json;

/// Structured failure of a backend request.
///
/// `status` is the HTTP status, or 0 when the request never got an answer.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error, serde::Deserialize, serde::Serialize)]
#[error("{}", display_error(.status, .error, .details))]
pub struct ApiError {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

fn display_error(status: &u16, error: &Option<String>, details: &Option<String>) -> String {
    let mut res = match error {
        Some(e) => e.clone(),
        None => String::from("Unknown error"),
    };
    if let Some(d) = details {
        res.push_str(": ");
        res.push_str(d);
    }
    if *status != 0 {
        res.push_str(&format!(" (status {status})"));
    }
    res
}

impl ApiError {
    pub fn new(status: u16, error: impl Into<String>) -> ApiError {
        ApiError {
            status,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> ApiError {
        self.details = Some(details.into());
        self
    }

    pub fn bad_request(error: impl Into<String>) -> ApiError {
        ApiError::new(400, error)
    }

    pub fn forbidden() -> ApiError {
        ApiError::new(403, "Permission denied")
    }

    pub fn not_found(what: impl std::fmt::Display) -> ApiError {
        ApiError::new(404, format!("{what} not found"))
    }

    pub fn internal(error: impl Into<String>) -> ApiError {
        ApiError::new(500, error)
    }

    /// The request did not reach the server or its answer could not be read
    pub fn transport(error: impl Into<String>) -> ApiError {
        ApiError::new(0, error)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Single-line message combining the caller's context with whatever the server said
    pub fn diagnostic(&self, context: &str) -> String {
        let mut res = String::from(context);
        if let Some(e) = &self.error {
            res.push_str(": ");
            res.push_str(e);
        }
        if let Some(d) = &self.details {
            res.push_str(": ");
            res.push_str(d);
        }
        res
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "error": self.error,
            "details": self.details,
        }))
        .expect("serializing api error")
    }

    pub fn parse(status: u16, body: &[u8]) -> anyhow::Result<ApiError> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        Ok(ApiError {
            status,
            error: field("error").or_else(|| field("message")),
            details: field("details"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_parse_back() {
        let err = ApiError::not_found("comment").with_details("it was deleted");
        assert_eq!(ApiError::parse(404, &err.contents()).unwrap(), err);
    }

    #[test]
    fn parse_accepts_message_field() {
        let err = ApiError::parse(500, br#"{"message": "boom"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("boom"));
        assert_eq!(err.details, None);
        assert!(ApiError::parse(500, b"<html>").is_err());
    }

    #[test]
    fn diagnostic_concatenates_context() {
        let err = ApiError::bad_request("invalid vote").with_details("already voted");
        assert_eq!(
            err.diagnostic("Error upvoting comment"),
            "Error upvoting comment: invalid vote: already voted"
        );
        let bare = ApiError {
            status: 0,
            error: None,
            details: None,
        };
        assert_eq!(bare.diagnostic("Error"), "Error");
        assert_eq!(err.to_string(), "invalid vote: already voted (status 400)");
    }
}
