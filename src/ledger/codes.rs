use std::collections::HashSet;

/// How one settlement result code is interpreted by the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    /// The escrow was finished
    Success,
    /// The escrow is already gone or can never be finished by this agent;
    /// retrying cannot succeed, so the record is dropped as a moot success
    Moot,
    /// Anything else - worth retrying
    Retryable,
}

/// Classification table for ledger result codes.
///
/// The exact code set is a protocol-version detail of the external ledger,
/// so the table is configurable rather than hard-coded in the engine.
#[derive(Debug, Clone)]
pub struct ResultClassifier {
    success: HashSet<String>,
    moot: HashSet<String>,
}

impl ResultClassifier {
    pub fn new<S, M>(success: S, moot: M) -> Self
    where
        S: IntoIterator<Item = String>,
        M: IntoIterator<Item = String>,
    {
        Self {
            success: success.into_iter().collect(),
            moot: moot.into_iter().collect(),
        }
    }

    pub fn classify(&self, code: &str) -> ResultClass {
        if self.success.contains(code) {
            ResultClass::Success
        } else if self.moot.contains(code) {
            ResultClass::Moot
        } else {
            ResultClass::Retryable
        }
    }
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::new(
            ["tesSUCCESS".to_string()],
            ["tecNO_TARGET".to_string(), "tecNO_PERMISSION".to_string()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_classification() {
        let classifier = ResultClassifier::default();

        assert_eq!(classifier.classify("tesSUCCESS"), ResultClass::Success);
        assert_eq!(classifier.classify("tecNO_TARGET"), ResultClass::Moot);
        assert_eq!(classifier.classify("tecNO_PERMISSION"), ResultClass::Moot);
        assert_eq!(classifier.classify("tecUNFUNDED"), ResultClass::Retryable);
        assert_eq!(classifier.classify("telINSUF_FEE_P"), ResultClass::Retryable);
    }

    #[test]
    fn table_is_extensible() {
        let classifier = ResultClassifier::new(
            ["tesSUCCESS".to_string()],
            ["tecNO_TARGET".to_string(), "tecCRYPTOCONDITION_ERROR".to_string()],
        );

        assert_eq!(
            classifier.classify("tecCRYPTOCONDITION_ERROR"),
            ResultClass::Moot
        );
    }
}
