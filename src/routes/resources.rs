use std::sync::Arc;

use poem::web::Data;
use poem_openapi::{OpenApi, Tags, param::Query, payload::Json};

use crate::{
    AppState,
    core::resources::{list_resources, read_resource},
    error::PosterError,
    schemas::{
        common::{InternalServerErrorResponse, NotFoundResponse},
        tools::{ListResourcesResponse, ReadResourceResponse},
    },
};

#[derive(Tags)]
enum ApiResourcesTags {
    Resources,
}

pub struct ApiResources;

#[OpenApi()]
impl ApiResources {
    /// List Resources
    ///
    /// One `_all` entry plus one entry per theme and template.
    #[oai(path = "/resources", method = "get", tag = "ApiResourcesTags::Resources")]
    async fn list_resources(&self, state: Data<&Arc<AppState>>) -> ListResourcesResponse {
        let resources = list_resources(state.generator.registry())
            .into_iter()
            .map(Into::into)
            .collect();
        ListResourcesResponse::Ok(Json(resources))
    }

    /// Read Resource
    ///
    /// Read `markdown-poster://themes/{id}` or `markdown-poster://templates/{id}`,
    /// where `{id}` may be `_all`.
    #[oai(
        path = "/resources/read",
        method = "get",
        tag = "ApiResourcesTags::Resources"
    )]
    async fn read_resource(
        &self,
        uri: Query<String>,
        state: Data<&Arc<AppState>>,
    ) -> ReadResourceResponse {
        match read_resource(state.generator.registry(), &uri.0) {
            Ok(contents) => ReadResourceResponse::Ok(Json(contents.into())),
            Err(e @ PosterError::UnknownResource(_)) => {
                tracing::warn!("{}", e);
                ReadResourceResponse::NotFound(Json(NotFoundResponse::new(e.to_string())))
            }
            Err(e) => ReadResourceResponse::InternalServerError(Json(
                InternalServerErrorResponse::new(
                    "route.resources",
                    "read_resource",
                    &uri.0,
                    &e.to_string(),
                ),
            )),
        }
    }
}
