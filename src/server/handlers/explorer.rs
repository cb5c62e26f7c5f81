// 文件浏览 API 处理器

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::explorer::{
    DownloadRequest, ExplorerError, ExplorerErrorCode, SearchRequest, SearchResponse,
    TreeRequest, TreeResponse,
};
use crate::server::state::AppState;

/// 错误响应
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let status = match self.code {
            ExplorerErrorCode::InvalidPath => StatusCode::BAD_REQUEST,
            ExplorerErrorCode::MissingParameter => StatusCode::BAD_REQUEST,
            ExplorerErrorCode::NotFound => StatusCode::NOT_FOUND,
            ExplorerErrorCode::DirectoryUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ExplorerErrorCode::ArchiveFailure => StatusCode::INTERNAL_SERVER_ERROR,
            ExplorerErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.code.is_client_error() {
            tracing::debug!("请求被拒绝: {}", self);
        } else {
            tracing::error!("请求处理失败: {}", self);
        }

        let body = Json(ErrorResponse {
            code: self.code.code(),
            error: self.message,
            path: self.path,
        });

        (status, body).into_response()
    }
}

/// 构造 Content-Disposition
///
/// `filename` 只保留 ASCII 作为兼容回退，`filename*` 携带 UTF-8 原名
pub(crate) fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

fn build_response(builder: axum::http::response::Builder, body: Body) -> Result<Response, ExplorerError> {
    builder.body(body).map_err(|e| {
        ExplorerError::new(ExplorerErrorCode::Internal).with_message(format!("构造响应失败: {}", e))
    })
}

/// GET /api/tree?path=Docs&sort=name&order=asc
/// 获取目录树
pub async fn get_tree(
    State(state): State<AppState>,
    Query(req): Query<TreeRequest>,
) -> Result<Json<TreeResponse>, ExplorerError> {
    let response = state.explorer.tree(req).await?;
    Ok(Json(response))
}

/// GET /api/search?q=report&path=Docs
/// 按名称搜索
pub async fn search(
    State(state): State<AppState>,
    Query(req): Query<SearchRequest>,
) -> Result<Json<SearchResponse>, ExplorerError> {
    let response = state.explorer.search(req).await?;
    Ok(Json(response))
}

/// GET /api/download?path=Docs/report.pdf
/// 下载单个文件
pub async fn download_file(
    State(state): State<AppState>,
    Query(req): Query<DownloadRequest>,
) -> Result<Response, ExplorerError> {
    let download = state.explorer.open_file(req.path.as_deref()).await?;
    info!("下载文件: {:?} ({} 字节)", req.path, download.size);

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&download.name));

    build_response(builder, Body::from_stream(ReaderStream::new(download.file)))
}

/// GET /api/download-folder?path=Docs
/// 打包下载文件夹（zip 流）
pub async fn download_folder(
    State(state): State<AppState>,
    Query(req): Query<DownloadRequest>,
) -> Result<Response, ExplorerError> {
    let path = req.path.unwrap_or_default();
    let download = state.explorer.archive(&path).await?;
    info!("打包下载文件夹: {:?} -> {}", path, download.name);

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, content_disposition(&download.name))
        .header(header::CACHE_CONTROL, "no-store");

    build_response(builder, Body::from_stream(download.stream))
}
