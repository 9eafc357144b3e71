use std::sync::Arc;

use poem::web::Data;
use poem_openapi::{OpenApi, Tags, payload::Json};

use crate::{
    AppState,
    error::PosterError,
    schemas::{
        common::{InternalServerErrorResponse, NotFoundResponse},
        tools::{
            CallToolResponse, HealthResponse, ListToolsResponse, RasterizerHealth,
            ToolCallRequest,
        },
    },
};

#[derive(Tags)]
enum ApiToolsTags {
    Tools,
}

pub struct ApiTools;

#[OpenApi()]
impl ApiTools {
    /// List Tools
    ///
    /// Describe every tool with its JSON input schema.
    #[oai(path = "/tools", method = "get", tag = "ApiToolsTags::Tools")]
    async fn list_tools(&self, state: Data<&Arc<AppState>>) -> ListToolsResponse {
        let tools = state
            .dispatcher
            .definitions()
            .into_iter()
            .map(Into::into)
            .collect();
        ListToolsResponse::Ok(Json(tools))
    }

    /// Call Tool
    ///
    /// Invoke a tool by name. Tool failures are reported in the body with
    /// `isError: true`; only an unknown tool name returns 404.
    ///
    /// # Example Request
    /// ```json
    /// {
    ///   "name": "generateMarkdownPoster",
    ///   "arguments": {
    ///     "markdown": "# Release notes\n\n- Faster builds",
    ///     "theme": "purple",
    ///     "template": "QuoteCard",
    ///     "aspectRatio": "16/9",
    ///     "format": "jpeg",
    ///     "quality": 85
    ///   }
    /// }
    /// ```
    #[oai(path = "/tools/call", method = "post", tag = "ApiToolsTags::Tools")]
    async fn call_tool(
        &self,
        Json(json): Json<ToolCallRequest>,
        state: Data<&Arc<AppState>>,
    ) -> CallToolResponse {
        match state.dispatcher.call(&json.name, json.arguments).await {
            Ok(output) => CallToolResponse::Ok(Json(output.into())),
            Err(e @ PosterError::UnknownTool(_)) => {
                tracing::warn!("{}", e);
                CallToolResponse::NotFound(Json(NotFoundResponse::new(e.to_string())))
            }
            Err(e) => CallToolResponse::InternalServerError(Json(
                InternalServerErrorResponse::new(
                    "route.tools",
                    "call_tool",
                    &json.name,
                    &e.to_string(),
                ),
            )),
        }
    }

    #[oai(path = "/health", method = "get")]
    async fn health(&self, state: Data<&Arc<AppState>>) -> Json<HealthResponse> {
        let rasterizer = state.generator.rasterizer();

        Json(HealthResponse {
            status: "healthy".to_string(),
            rasterizer: RasterizerHealth {
                state: rasterizer.status().as_str().to_string(),
                active_surfaces: rasterizer.active_surfaces() as u64,
            },
        })
    }
}
