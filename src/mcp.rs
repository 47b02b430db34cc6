use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    error::{self, Error},
    search::{Retriever, ScoredPassage},
};

const DEFAULT_SEARCH_LIMIT: usize = 3;

#[derive(Clone)]
pub struct VersebertMcpServer {
    retriever: Arc<Retriever>,
    tool_router: ToolRouter<Self>,
}

impl VersebertMcpServer {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self {
            retriever,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl VersebertMcpServer {
    /// Semantic verse search over the loaded index.
    #[tool(
        name = "verse_search",
        description = "Find the scripture verses closest in meaning to a query. Returns citations, verse text, and similarity scores, best match first."
    )]
    pub async fn verse_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let results = self
            .retriever
            .query(&params.query, limit)
            .map_err(|e| mcp_error("search failed", e))?;

        let items: Vec<VerseItem> = results.into_iter().map(VerseItem::from).collect();
        let summary = format_search_summary(&items, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            result_count: items.len(),
            results: items,
        })
        .map_err(|e| mcp_error("failed to serialize search results", Error::Config(e.to_string())))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Exact lookup of one verse by citation.
    #[tool(
        name = "verse_get",
        description = "Retrieve the text of a single verse by citation, e.g. \"John 3:16\"."
    )]
    pub async fn verse_get(
        &self,
        params: Parameters<GetParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let passage = self
            .retriever
            .get(&params.0.citation)
            .map_err(|e| mcp_error("lookup failed", e))?;

        let citation = passage.citation();
        let structured = json!({
            "citation": citation,
            "collection": passage.source_ref.collection,
            "chapter": passage.source_ref.major,
            "verse": passage.source_ref.minor,
            "text": passage.text,
        });

        let mut result =
            CallToolResult::success(vec![Content::text(format!("{citation}: {}", passage.text))]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for VersebertMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = Implementation::new("versebert", env!("CARGO_PKG_VERSION"))
            .with_title("versebert MCP");
        info.instructions = Some(
            "Use verse_search to find verses by meaning and verse_get to quote a verse by citation."
                .to_string(),
        );
        info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Natural-language query.
    pub query: String,
    /// Maximum number of verses to return (default: 3).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetParams {
    /// Verse citation such as "Genesis 1:1".
    pub citation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    result_count: usize,
    results: Vec<VerseItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerseItem {
    rank: usize,
    citation: String,
    collection: String,
    chapter: u32,
    verse: u32,
    text: String,
    score: f32,
}

impl From<ScoredPassage> for VerseItem {
    fn from(hit: ScoredPassage) -> Self {
        let citation = hit.citation();
        let source_ref = hit.passage.source_ref;
        Self {
            rank: hit.rank,
            citation,
            collection: source_ref.collection,
            chapter: source_ref.major,
            verse: source_ref.minor,
            text: hit.passage.text,
            score: hit.score,
        }
    }
}

fn format_search_summary(results: &[VerseItem], query: &str) -> String {
    if results.is_empty() {
        return format!("No verses found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} verse{} for \"{query}\":",
        results.len(),
        suffix
    ));

    for item in results {
        lines.push(format!(
            "{}. [{:.3}] {}: {}",
            item.rank, item.score, item.citation, item.text
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: Error) -> rmcp::ErrorData {
    let data = Some(json!({ "error": error.to_string() }));
    match error {
        Error::InvalidArgument(_)
        | Error::InputTooLong { .. }
        | Error::NotFound { .. } => {
            rmcp::ErrorData::invalid_params(message.to_string(), data)
        }
        _ => rmcp::ErrorData::internal_error(message.to_string(), data),
    }
}

/// Serve `retriever` over MCP stdio until the client disconnects.
pub fn run_mcp(retriever: Retriever) -> error::Result<()> {
    info!(
        passages = retriever.index().len(),
        model = %retriever.index().binding().embedder.model_id,
        "starting MCP server"
    );
    let server = VersebertMcpServer::new(Arc::new(retriever));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
