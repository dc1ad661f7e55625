use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")] Kube(#[from] kube::Error),
    #[error("star {owner:?} does not own {kind} {name:?}")] NotOwned { kind: &'static str, name: String, owner: String },
    #[error("object is missing {0}")] MissingObjectKey(&'static str),
    #[error("invalid resource key {0:?}")] InvalidKey(String),
    #[error("config error: {0}")] Config(String),
    #[error("serialization error: {0}")] Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self { Self::Kube(kube::Error::Api(ae)) => Some(ae.code), _ => None }
    }
    pub fn is_not_found(&self) -> bool { self.api_code() == Some(404) }
    pub fn is_conflict(&self) -> bool { self.api_code() == Some(409) }

    /// Low-cardinality label for the reconcile outcome counter.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Kube(_) if self.is_conflict() => "conflict",
            Self::Kube(_) if self.is_not_found() => "not_found",
            Self::Kube(_) => "kube",
            Self::NotOwned { .. } => "not_owned",
            Self::MissingObjectKey(_) => "missing_key",
            Self::InvalidKey(_) => "invalid_key",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Builds the error kube returns for a failed API call; used by the in-memory fakes.
pub fn api_error(code: u16, reason: &str, message: impl Into<String>) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".into(),
        message: message.into(),
        reason: reason.into(),
        code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_api_codes() {
        let nf = api_error(404, "NotFound", "stars.solar.my.dev \"sol\" not found");
        assert!(nf.is_not_found());
        assert!(!nf.is_conflict());
        assert_eq!(nf.metric_label(), "not_found");
        let cf = api_error(409, "Conflict", "the object has been modified");
        assert!(cf.is_conflict());
        assert_eq!(cf.metric_label(), "conflict");
        let owned = Error::NotOwned { kind: "Deployment", name: "energy-source".into(), owner: "sol".into() };
        assert!(!owned.is_not_found());
        assert_eq!(owned.to_string(), "star \"sol\" does not own Deployment \"energy-source\"");
    }
}
