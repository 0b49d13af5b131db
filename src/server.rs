mod responses;
mod routes;

use std::future::Future;

use anyhow::{anyhow, Context, Result};
use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, TraceLayer};
use tracing::{error, info, Level};

use crate::state::State;

async fn convert_errors<F, R>(fut: F) -> axum::response::Result<R>
where
    F: Future<Output = Result<R>>,
{
    match fut.await {
        Ok(r) => Ok(r),

        Err(e) => {
            error!("Error occured while processing an HTTP request: {e:#}");

            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("Internal error: {e}")).into())
        }
    }
}

pub fn router(state: State) -> Router {
    use axum::routing::get;

    let prefix = state.cfg.route_prefix();

    Router::new()
        .route("/", get(routes::index))
        .route(&format!("{prefix}/feed.rss"), get(routes::feed_all))
        .route(&format!("{prefix}/logo/:file"), get(routes::logo))
        .route(&format!("{prefix}/:name"), get(routes::recording))
        .route(&format!("{prefix}/:name/feed.rss"), get(routes::feed_program))
        .route(&format!("{prefix}/:name/:file"), get(routes::program_recording))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO)),
            ),
        )
        .with_state(state)
}

pub struct Server {
    socket: TcpListener,
    app: Router,
}

impl Server {
    pub async fn new(state: State) -> Result<Self> {
        let bind_addr = &state.cfg.bind_addr;
        let socket = TcpListener::bind(bind_addr)
            .await
            .with_context(|| anyhow!("could not bind to `{bind_addr}`"))?;
        info!("Listening on {bind_addr}");

        Ok(Self {
            socket,
            app: router(state),
        })
    }

    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        axum::serve(self.socket, self.app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .context("the HTTP server encountered a failure")
    }
}
