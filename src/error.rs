use thiserror::Error;

/// Per-table pipeline outcome taxonomy.
///
/// `Skip` is expected, data-dependent absence (a filter matched zero codes,
/// an axis resolved empty) and the orchestrator treats it as "nothing to do".
/// `Structural` means the live API no longer matches the fetcher's
/// assumptions; it is fatal to that one table's run and never retried.
/// Transient HTTP trouble is handled inside the transport and escalates to
/// `Structural` once the retry budget is spent.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("skip: {reason}")]
    Skip { reason: String },

    #[error("{message}")]
    Structural {
        message: String,
        /// Last HTTP status observed, when the failure came off the wire.
        status: Option<u16>,
    },
}

impl PipelineError {
    pub fn skip(reason: impl Into<String>) -> Self {
        PipelineError::Skip {
            reason: reason.into(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        PipelineError::Structural {
            message: message.into(),
            status: None,
        }
    }

    pub fn http(message: impl Into<String>, status: u16) -> Self {
        PipelineError::Structural {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, PipelineError::Skip { .. })
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_and_structural_are_distinguishable() {
        let skip = PipelineError::skip("no fuel codes matched");
        let hard = PipelineError::http("metadata fetch failed", 429);
        assert!(skip.is_skip());
        assert!(!hard.is_skip());
        match hard {
            PipelineError::Structural { status, .. } => assert_eq!(status, Some(429)),
            _ => panic!("expected structural"),
        }
    }
}
