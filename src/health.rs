//! Three independent, concurrently-run availability probes.
//! Ground truth: `original_source/services/health.py` verbatim.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::domain::HealthStatus;
use crate::ports::QuoteProvider;

pub const REQUIRED_OLLAMA_MODEL: &str = "llama3.1:8b";
pub const YFINANCE_CANARY_TICKER: &str = "SPY";
const YFINANCE_CANARY_PERIOD: &str = "1d";

const OLLAMA_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const YFINANCE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const SQLITE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal persistence-liveness seam so `HealthService` does not need to
/// depend on the full repository surface, only on its ability to answer
/// "is the schema applied and the connection alive".
#[async_trait]
pub trait PersistenceProbe: Send + Sync {
    async fn schema_version_count(&self) -> Result<i64, crate::error::RepositoryError>;
}

/// Narrow seam over [`crate::ports::LlmTransport::list_models`], kept
/// separate so the health probe doesn't need a full chat-capable client.
#[async_trait]
pub trait ModelLister: Send + Sync {
    async fn list_models(&self) -> Result<Vec<String>, crate::error::DomainError>;
}

pub struct HealthService {
    llm: Option<Arc<dyn ModelLister>>,
    vendor: Option<Arc<dyn QuoteProvider>>,
    persistence: Option<Arc<dyn PersistenceProbe>>,
}

impl HealthService {
    pub fn new(
        llm: Option<Arc<dyn ModelLister>>,
        vendor: Option<Arc<dyn QuoteProvider>>,
        persistence: Option<Arc<dyn PersistenceProbe>>,
    ) -> Self {
        Self { llm, vendor, persistence }
    }

    /// Runs all three probes concurrently; any probe erroring or timing
    /// out is reported as unavailable without affecting the others.
    pub async fn check_all(&self) -> HealthStatus {
        let (llm_result, vendor_available, persistence_available) =
            tokio::join!(self.check_llm(), self.check_vendor(), self.check_persistence());

        let (llm_available, llm_models) = llm_result;

        HealthStatus {
            llm_available,
            vendor_available,
            persistence_available,
            llm_models,
            last_check_utc: Utc::now(),
        }
    }

    async fn check_llm(&self) -> (bool, Vec<String>) {
        let Some(llm) = &self.llm else {
            return (false, vec![]);
        };

        let probe = async {
            match llm.list_models().await {
                Ok(models) => {
                    let has_required = models.iter().any(|m| m.contains(REQUIRED_OLLAMA_MODEL));
                    if !has_required {
                        warn!(available = ?models, "required LLM model not found");
                    }
                    (has_required, models)
                }
                Err(err) => {
                    warn!(error = %err, "LLM health check failed");
                    (false, vec![])
                }
            }
        };

        match tokio::time::timeout(OLLAMA_CHECK_TIMEOUT, probe).await {
            Ok(result) => result,
            Err(_) => {
                warn!("LLM health check timed out");
                (false, vec![])
            }
        }
    }

    async fn check_vendor(&self) -> bool {
        let Some(vendor) = &self.vendor else {
            return false;
        };

        let probe = async {
            match vendor.history(YFINANCE_CANARY_TICKER, YFINANCE_CANARY_PERIOD).await {
                Ok(rows) => !rows.is_empty(),
                Err(err) => {
                    warn!(error = %err, "vendor canary health check failed");
                    false
                }
            }
        };

        tokio::time::timeout(YFINANCE_CHECK_TIMEOUT, probe).await.unwrap_or_else(|_| {
            warn!("vendor canary health check timed out");
            false
        })
    }

    async fn check_persistence(&self) -> bool {
        let Some(persistence) = &self.persistence else {
            return false;
        };

        let probe = async {
            match persistence.schema_version_count().await {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, "persistence health check failed");
                    false
                }
            }
        };

        tokio::time::timeout(SQLITE_CHECK_TIMEOUT, probe).await.unwrap_or_else(|_| {
            warn!("persistence health check timed out");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainError, RepositoryError};
    use crate::ports::{RawBar, RawOptionRow, RawQuote, RawTickerInfo};
    use chrono::NaiveDate;

    struct OkLlm;
    #[async_trait]
    impl ModelLister for OkLlm {
        async fn list_models(&self) -> Result<Vec<String>, DomainError> {
            Ok(vec![REQUIRED_OLLAMA_MODEL.to_string()])
        }
    }

    struct DownLlm;
    #[async_trait]
    impl ModelLister for DownLlm {
        async fn list_models(&self) -> Result<Vec<String>, DomainError> {
            Err(DomainError::DataSourceUnavailable {
                ticker: "*".to_string(),
                source_name: "ollama".to_string(),
                detail: "connection refused".to_string(),
                cause: None,
            })
        }
    }

    struct OkVendor;
    #[async_trait]
    impl QuoteProvider for OkVendor {
        async fn history(&self, _symbol: &str, _period: &str) -> Result<Vec<RawBar>, DomainError> {
            Ok(vec![RawBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 100,
            }])
        }
        async fn info(&self, _symbol: &str) -> Result<RawTickerInfo, DomainError> {
            Ok(RawTickerInfo::default())
        }
        async fn quote(&self, _symbol: &str) -> Result<RawQuote, DomainError> {
            Ok(RawQuote {
                bid: 1.0,
                ask: 1.1,
                last: 1.05,
                volume: 10,
            })
        }
        async fn options(&self, _symbol: &str) -> Result<Vec<NaiveDate>, DomainError> {
            Ok(vec![])
        }
        async fn option_chain(
            &self,
            _symbol: &str,
            _expiration: NaiveDate,
        ) -> Result<(Vec<RawOptionRow>, Vec<RawOptionRow>), DomainError> {
            Ok((vec![], vec![]))
        }
    }

    struct OkPersistence;
    #[async_trait]
    impl PersistenceProbe for OkPersistence {
        async fn schema_version_count(&self) -> Result<i64, RepositoryError> {
            Ok(3)
        }
    }

    #[tokio::test]
    async fn all_probes_healthy() {
        let service = HealthService::new(Some(Arc::new(OkLlm)), Some(Arc::new(OkVendor)), Some(Arc::new(OkPersistence)));
        let status = service.check_all().await;
        assert!(status.llm_available);
        assert!(status.vendor_available);
        assert!(status.persistence_available);
        assert_eq!(status.llm_models, vec![REQUIRED_OLLAMA_MODEL.to_string()]);
    }

    #[tokio::test]
    async fn missing_dependencies_report_unavailable_independently() {
        let service = HealthService::new(Some(Arc::new(DownLlm)), None, None);
        let status = service.check_all().await;
        assert!(!status.llm_available);
        assert!(!status.vendor_available);
        assert!(!status.persistence_available);
    }

    #[tokio::test]
    async fn unconfigured_probes_default_unavailable() {
        let service = HealthService::new(None, None, None);
        let status = service.check_all().await;
        assert!(!status.llm_available);
        assert!(!status.vendor_available);
        assert!(!status.persistence_available);
        assert!(status.llm_models.is_empty());
    }
}
