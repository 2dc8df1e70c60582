//! Embedded OpenAPI document and Swagger UI page.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use openapiv3::OpenAPI;

use super::{handlers, state::AppState};

/// Path prefix under which the documentation is served.
pub const DOCS_PREFIX: &str = "/api-docs";

const OPENAPI_YAML: &str = include_str!("../../assets/openapi.yaml");
const INDEX_TEMPLATE: &str = include_str!("../../assets/index.html");

/// Documentation assets, parsed and rendered once at startup.
#[derive(Debug)]
pub struct ApiDocs {
    yaml: &'static str,
    json: String,
    index: String,
}

impl ApiDocs {
    /// Parse the embedded OpenAPI document and render its derived assets.
    pub fn load() -> Result<Self> {
        let api: OpenAPI =
            serde_yaml::from_str(OPENAPI_YAML).context("parsing embedded OpenAPI document")?;
        let json = serde_json::to_string_pretty(&api).context("rendering OpenAPI as JSON")?;
        let index = INDEX_TEMPLATE.replace("{{SPEC_URL}}", &format!("{DOCS_PREFIX}/openapi.yaml"));
        Ok(Self {
            yaml: OPENAPI_YAML,
            json,
            index,
        })
    }

    fn asset(&self, name: &str) -> Option<&str> {
        match name {
            "" | "index.html" => Some(&self.index),
            "openapi.yaml" => Some(self.yaml),
            "openapi.json" => Some(&self.json),
            _ => None,
        }
    }
}

fn content_type(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("json") => "application/json",
        Some("yaml") | Some("yml") => "application/yaml",
        _ => "text/html; charset=utf-8",
    }
}

/// `GET /api-docs/*`: serve the Swagger UI page and the OpenAPI document.
pub async fn serve(State(state): State<AppState>, uri: Uri) -> Response {
    let name = uri
        .path()
        .strip_prefix(DOCS_PREFIX)
        .unwrap_or_default()
        .trim_start_matches('/');

    match state.docs.asset(name) {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(name))],
            body.to_owned(),
        )
            .into_response(),
        None => handlers::not_found().await.into_response(),
    }
}
