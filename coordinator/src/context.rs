/// Identity of the worker issuing a request, as established by the transport.
#[derive(Debug, Clone, Default)]
pub struct ProverContext {
    pub public_key: Option<String>,
    pub prover_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("get {0} from context failed")]
pub struct MissingIdentity(pub &'static str);

impl ProverContext {
    pub fn new(public_key: impl Into<String>, prover_name: impl Into<String>) -> Self {
        Self {
            public_key: Some(public_key.into()),
            prover_name: Some(prover_name.into()),
        }
    }

    /// Returns `(public_key, prover_name)`; empty values count as missing.
    pub fn identity(&self) -> Result<(&str, &str), MissingIdentity> {
        let public_key = non_empty(&self.public_key).ok_or(MissingIdentity("public key"))?;
        let prover_name = non_empty(&self.prover_name).ok_or(MissingIdentity("prover name"))?;
        Ok((public_key, prover_name))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_both_fields() {
        assert!(ProverContext::new("pk", "prover").identity().is_ok());
        assert!(ProverContext::default().identity().is_err());

        let missing_name = ProverContext {
            public_key: Some("pk".to_string()),
            prover_name: Some(String::new()),
        };
        let err = missing_name.identity().unwrap_err();
        assert_eq!(err.to_string(), "get prover name from context failed");
    }
}
