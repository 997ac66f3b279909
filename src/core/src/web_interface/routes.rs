use std::convert::Infallible;
use std::sync::Arc;

use log::{debug, warn};
use rust_embed::RustEmbed;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{ApiError, CheckResponse};
use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::Storer;

/// Static files of the chart page, embedded at build time.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/web/"]
struct Assets;

pub const VIEW_PAGE: &str = "view.html";

/// Maps a storage failure onto the HTTP status returned to the client.
pub fn status_for(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StorageError::BackendUnavailable(_) | StorageError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: &StorageError) -> reply::Response {
    reply::with_status(
        reply::json(&ApiError {
            message: err.to_string(),
        }),
        status_for(err),
    )
    .into_response()
}

fn with_storage(
    storage: Arc<dyn Storer>,
) -> impl Filter<Extract = (Arc<dyn Storer>,), Error = Infallible> + Clone {
    warp::any().map(move || storage.clone())
}

/// Handler behind `GET /viewData/{module}`.
pub async fn view_data(module: String, storage: Arc<dyn Storer>) -> reply::Response {
    match storage.view(&module).await {
        Ok(view) => {
            debug!("view of {}: {} topics", module, view.len());
            reply::json(&view).into_response()
        }
        Err(e) => {
            warn!("view of {} failed: {}", module, e);
            error_reply(&e)
        }
    }
}

/// Serves one embedded asset, or `404` when it is not part of the build.
pub fn serve_asset(path: &str) -> reply::Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            reply::with_header(file.data.into_owned(), "Content-Type", mime.to_string())
                .into_response()
        }
        None => reply::with_status(
            reply::json(&ApiError {
                message: format!("{} not found", path),
            }),
            StatusCode::NOT_FOUND,
        )
        .into_response(),
    }
}

/// GET /api/v1/check
pub fn check_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "check")
        .and(warp::get())
        .map(|| reply::json(&CheckResponse { status: "ok" }))
}

/// GET /viewData/{module}
pub fn view_data_route(
    storage: Arc<dyn Storer>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("viewData" / String)
        .and(warp::get())
        .and(with_storage(storage))
        .then(view_data)
}

/// GET /view and GET /assets/{file}
pub fn view_page_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let page = warp::path!("view")
        .and(warp::get())
        .map(|| serve_asset(VIEW_PAGE));
    let assets = warp::path("assets")
        .and(warp::path::tail())
        .and(warp::get())
        .map(|tail: warp::path::Tail| serve_asset(tail.as_str()));
    page.or(assets)
}

/// Every route of the read boundary, with the permissive CORS header the
/// chart page relies on when it is opened from another origin.
pub fn routes(
    storage: Arc<dyn Storer>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    check_route()
        .or(view_data_route(storage))
        .or(view_page_route())
        .with(warp::reply::with::header("Access-Control-Allow-Origin", "*"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_storage::MemoryStorage;
    use crate::storage::types::Data;

    async fn seeded() -> Arc<dyn Storer> {
        let store = MemoryStorage::default();
        store
            .write(Data::new("cave", "2024-01-01 00:00", "temp", "21.5"))
            .await
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&StorageError::NotFound("m".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&StorageError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&StorageError::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&StorageError::BackendUnavailable("closed".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&StorageError::Unconfigured),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_view_data_ok() {
        let res = view_data("cave".into(), seeded().await).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_view_data_unknown_module() {
        let res = view_data("nope".into(), seeded().await).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_view_data_invalid_module() {
        let res = view_data("bad name".into(), seeded().await).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_view_page_is_embedded() {
        let res = serve_asset(VIEW_PAGE);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "text/html");
    }

    #[test]
    fn test_missing_asset() {
        assert_eq!(serve_asset("nope.js").status(), StatusCode::NOT_FOUND);
    }
}
