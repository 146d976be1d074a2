//! Tool handlers backed by the shared paper service.

use serde_json::Value;

use super::tools::ToolHandler;
use crate::service::PaperService;

fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing '{}' parameter", name))
}

/// Handler for searching papers across all sources.
///
/// An id-shaped query is resolved as a paper first.
#[derive(Debug)]
pub struct SearchPapersHandler {
    pub service: PaperService,
}

#[async_trait::async_trait]
impl ToolHandler for SearchPapersHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = required_str(&args, "query")?;

        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(10) as usize;

        let results = self
            .service
            .lookup(query.trim(), max_results)
            .await
            .map_err(|e| e.to_string())?
            .into_results();

        serde_json::to_value(results).map_err(|e| e.to_string())
    }
}

/// Handler for getting a paper by id
#[derive(Debug)]
pub struct GetPaperHandler {
    pub service: PaperService,
}

#[async_trait::async_trait]
impl ToolHandler for GetPaperHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let paper_id = required_str(&args, "paper_id")?;
        let doi = args.get("doi").and_then(|v| v.as_str());

        let paper = self
            .service
            .get_paper(paper_id, doi)
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_value(&*paper).map_err(|e| e.to_string())
    }
}

/// Handler for the one-hop citation network of a paper
#[derive(Debug)]
pub struct GetCitationNetworkHandler {
    pub service: PaperService,
}

#[async_trait::async_trait]
impl ToolHandler for GetCitationNetworkHandler {
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let paper_id = required_str(&args, "paper_id")?;
        let doi = args.get("doi").and_then(|v| v.as_str());

        let network = self
            .service
            .get_citation_network(paper_id, doi)
            .await
            .map_err(|e| e.to_string())?;

        serde_json::to_value(&*network).map_err(|e| e.to_string())
    }
}

/// Handler reporting sources and cache state
#[derive(Debug)]
pub struct SourceStatusHandler {
    pub service: PaperService,
}

#[async_trait::async_trait]
impl ToolHandler for SourceStatusHandler {
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        serde_json::to_value(self.service.status()).map_err(|e| e.to_string())
    }
}
