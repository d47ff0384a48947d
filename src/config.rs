use crate::error::OpsError;
use std::time::Duration;

/// Runtime configuration for the transaction layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpsConfig {
    /// Upper bound on one transaction round trip, shared by every
    /// transaction issued through a context.
    pub txn_timeout_ms: u64,
    pub remediate_duplicates: bool,
    /// Retry the failed resolution once after duplicates were detached.
    pub retry_after_remediation: bool,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            txn_timeout_ms: 100_000,
            remediate_duplicates: true,
            retry_after_remediation: true,
        }
    }
}

impl OpsConfig {
    pub fn with_txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn txn_timeout(&self) -> Duration {
        Duration::from_millis(self.txn_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), OpsError> {
        if self.txn_timeout_ms == 0 {
            return Err(OpsError::InvalidConfig {
                message: "txn_timeout_ms must be > 0".into(),
            });
        }
        if self.retry_after_remediation && !self.remediate_duplicates {
            return Err(OpsError::InvalidConfig {
                message: "retry_after_remediation requires remediate_duplicates".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::OpsConfig;
    use std::time::Duration;

    #[test]
    fn default_config_is_valid() {
        let config = OpsConfig::default();
        config.validate().expect("default config");
        assert_eq!(config.txn_timeout(), Duration::from_secs(100));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = OpsConfig::default().with_txn_timeout(Duration::ZERO);
        let err = config.validate().expect_err("zero timeout");
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn retry_without_remediation_is_rejected() {
        let config = OpsConfig {
            remediate_duplicates: false,
            ..OpsConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
