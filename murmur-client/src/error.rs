use crate::api::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Login required")]
    LoginRequired,

    #[error("Missing project id")]
    MissingProject,

    #[error("Missing {0}")]
    MissingId(&'static str),

    #[error("Content must not be empty")]
    EmptyContent,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Precondition errors are raised before any request is sent, and retrying them is pointless
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::LoginRequired | Error::MissingProject | Error::MissingId(_) | Error::EmptyContent
        )
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn diagnostic(&self, context: &str) -> String {
        match self {
            Error::Api(e) => e.diagnostic(context),
            Error::Anyhow(e) => format!("{context}: {e:#}"),
            e => format!("{context}: {e}"),
        }
    }
}
