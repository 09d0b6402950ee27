use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use datexport_xlsx::conf::{C_MIME_XLSX, C_TEMPLATE_FILE_NAME};
use log::{error, warn};
use tokio_util::io::ReaderStream;

const C_HEADER_TRANSFER_ENCODING: &str = "content-transfer-encoding";

#[derive(Debug, Clone)]
pub struct SpecServeState {
    pub file_template: PathBuf,
}

pub fn build_router(route: &str, file_template: PathBuf) -> Router {
    Router::new()
        .route(route, get(get_report_template))
        .with_state(Arc::new(SpecServeState { file_template }))
}

/// Stream the template workbook as an attachment.
async fn get_report_template(State(state): State<Arc<SpecServeState>>) -> Response {
    let file = match tokio::fs::File::open(&state.file_template).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("template not found: {}", state.file_template.display());
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(err) => {
            error!("cannot open {}: {err}", state.file_template.display());
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let c_disposition = format!(
        "attachment; filename={}",
        urlencoding::encode(C_TEMPLATE_FILE_NAME)
    );
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(C_MIME_XLSX));
    headers.insert(
        C_HEADER_TRANSFER_ENCODING,
        HeaderValue::from_static("binary"),
    );
    match HeaderValue::from_str(&c_disposition) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(err) => warn!("invalid content-disposition {c_disposition:?}: {err}"),
    }
    response
}
