//! Open-access PDF fallback chain.

use std::sync::Arc;
use std::time::Duration;

use super::guarded;
use crate::models::Paper;
use crate::sources::{Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::utils::CircuitBreakerManager;

/// Attaches a PDF link by asking sources one at a time, in a fixed order.
///
/// The next source is tried only after the previous one came back empty or
/// failed, so a link from a low-priority source never races an empty answer
/// from a higher one.
#[derive(Debug, Clone)]
pub struct PdfEnhancer {
    chain: Vec<Arc<dyn Source>>,
    breakers: Arc<CircuitBreakerManager>,
    attempt_timeout: Duration,
}

impl PdfEnhancer {
    /// `pdf_priority` orders the chain; PDF-capable sources it omits go last.
    pub fn new(
        registry: &SourceRegistry,
        pdf_priority: &[String],
        breakers: Arc<CircuitBreakerManager>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            chain: registry
                .ordered(pdf_priority)
                .with_capability(SourceCapabilities::PDF_LOOKUP),
            breakers,
            attempt_timeout,
        }
    }

    /// Source ids in the order they are tried
    pub fn chain(&self) -> Vec<&str> {
        self.chain.iter().map(|s| s.id()).collect()
    }

    /// Return `paper` with a PDF link if any source has one.
    ///
    /// Never fails; on total failure the paper comes back unchanged.
    pub async fn enhance(&self, mut paper: Paper) -> Paper {
        if paper.pdf_url.is_some() {
            return paper;
        }

        for source in &self.chain {
            let outcome = guarded(
                &self.breakers,
                source.as_ref(),
                self.attempt_timeout,
                source.find_pdf(&paper),
            )
            .await;

            match outcome {
                Ok(Some(url)) if !url.trim().is_empty() => {
                    tracing::debug!(source = source.id(), id = %paper.id, "PDF found");
                    paper.pdf_url = Some(url.trim().to_string());
                    paper.is_open_access = true;
                    return paper;
                }
                Ok(_) | Err(SourceError::NotFound(_)) | Err(SourceError::NotImplemented) => {}
                Err(err) => {
                    tracing::debug!(source = source.id(), error = %err, "PDF attempt failed");
                }
            }
        }

        tracing::debug!(id = %paper.id, "No open-access PDF located");
        paper
    }
}
