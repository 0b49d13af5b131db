use std::io;
use std::path::{Path as FsPath, PathBuf};

use anyhow::{anyhow, Context};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response, Result};
use serde::{Deserialize, Serialize};
use tokio::task;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use crate::config::Config;
use crate::feed::FeedRequest;
use crate::recordings::{self, RECORDING_EXTENSION};
use crate::server::convert_errors;
use crate::state::State as AppState;
use crate::template::Template;

use super::responses::{AccessDenied, InvalidSecret, NotFound, UnknownProgram};

const DEFAULT_HOST: &str = "localhost:8080";
const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

#[derive(Deserialize, Debug, Default)]
pub struct AuthQuery {
    secret: Option<String>,
}

fn authorize(state: &AppState, query: &AuthQuery) -> Result<(), InvalidSecret> {
    let Some(expected) = state.cfg.secret.as_deref() else {
        return Ok(());
    };

    if query.secret.as_deref() == Some(expected) {
        Ok(())
    } else {
        warn!("Rejected a feed request with an invalid or missing secret");

        Err(InvalidSecret)
    }
}

/// `scheme://host/prefix/` as seen by the client, honoring reverse proxy headers.
pub fn base_url(headers: &HeaderMap, cfg: &Config) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let scheme = if cfg.force_https {
        "https".to_string()
    } else if let Some(proto) = header("x-forwarded-proto") {
        // the first proxy in the chain is the one the client talked to.
        proto.split(',').next().unwrap_or(proto).trim().to_ascii_lowercase()
    } else if header("x-forwarded-ssl").is_some_and(|ssl| ssl.eq_ignore_ascii_case("on")) {
        "https".to_string()
    } else {
        "http".to_string()
    };

    let host = header("x-forwarded-host")
        .or_else(|| header(header::HOST.as_str()))
        .unwrap_or(DEFAULT_HOST);

    format!("{scheme}://{host}{}/", cfg.route_prefix())
}

pub async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    #[derive(Serialize, Debug, Clone)]
    struct ProgramDescription {
        id: String,
        name: String,
        days: String,
        start: String,
        end: String,
        rss_url: String,
    }

    #[derive(Serialize, Debug, Clone)]
    struct Context {
        title: String,
        recording_count: usize,
        all_rss_url: String,
        programs: Vec<ProgramDescription>,
    }

    convert_errors(async move {
        let recordings_dir = state.cfg.recordings_dir.clone();
        let recording_count = task::spawn_blocking(move || recordings::list_files(recordings_dir))
            .await
            .context("the recording listing task failed")??
            .len();

        let prefix = state.cfg.route_prefix();
        let programs = state
            .programs
            .iter()
            .map(|program| ProgramDescription {
                id: program.id.clone(),
                name: program.name.clone(),
                days: program.days.to_string(),
                start: program.start.to_string(),
                end: program.end.to_string(),
                rss_url: format!("{prefix}/{}/feed.rss", urlencoding::encode(&program.id)),
            })
            .collect();

        let ctx = Context {
            title: state.cfg.feed_title.clone(),
            recording_count,
            all_rss_url: format!("{prefix}/feed.rss"),
            programs,
        };
        let html = state
            .template
            .render(Template::Index.as_str(), &ctx)
            .context("could not render the HTML template")?;

        Ok(Html(html))
    })
    .await
}

async fn render_feed(state: AppState, program_id: Option<String>, base_url: String) -> Result<Response> {
    convert_errors(async move {
        let document = task::spawn_blocking(move || {
            let request = match program_id.as_deref().and_then(|id| state.programs.get(id)) {
                Some(program) => FeedRequest::program(program, &base_url),
                None => FeedRequest::all(&base_url),
            };

            state
                .feed_cache
                .get_or_build(request.cache_key(), || request.build(&state.cfg))
        })
        .await
        .context("the feed generation task failed")?
        .context("could not generate the feed")?;

        Ok(([(header::CONTENT_TYPE, RSS_CONTENT_TYPE)], document.to_string()).into_response())
    })
    .await
}

pub async fn feed_all(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    authorize(&state, &auth)?;
    let base_url = base_url(&headers, &state.cfg);

    render_feed(state, None, base_url).await
}

pub async fn feed_program(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    authorize(&state, &auth)?;

    if state.programs.get(&name).is_none() {
        return Err(UnknownProgram { id: name }.into());
    }

    let base_url = base_url(&headers, &state.cfg);

    render_feed(state, Some(name), base_url).await
}

fn check_file_name(name: &str) -> Result<(), AccessDenied> {
    if name.is_empty() || name.contains("..") || name.contains(['/', '\\']) {
        warn!("Rejected a request for `{name}`");

        return Err(AccessDenied);
    }

    Ok(())
}

fn has_extension(path: &FsPath, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

async fn send_file(path: PathBuf, content_type: &'static str, what: &'static str) -> Result<Response> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(NotFound(what).into()),

        Err(e) => {
            error!("Could not open `{}`: {e}", path.display());

            return Err(StatusCode::INTERNAL_SERVER_ERROR.into());
        }
    };

    let metadata = convert_errors(async {
        file.metadata()
            .await
            .with_context(|| anyhow!("could not stat `{}`", path.display()))
    })
    .await?;

    if !metadata.is_file() {
        return Err(NotFound(what).into());
    }

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn send_recording(state: &AppState, file: &str) -> Result<Response> {
    check_file_name(file)?;
    let path = state.cfg.recordings_dir.join(file);

    let content_type = if has_extension(&path, RECORDING_EXTENSION) {
        "audio/mp4"
    } else {
        "application/octet-stream"
    };

    send_file(path, content_type, "File").await
}

pub async fn logo(State(state): State<AppState>, Path(file): Path<String>) -> Result<Response> {
    check_file_name(&file)?;
    let path = state.cfg.logo_dir.join(&file);

    let content_type = if has_extension(&path, "jpg") || has_extension(&path, "jpeg") {
        "image/jpeg"
    } else {
        "image/png"
    };

    send_file(path, content_type, "Logo").await
}

pub async fn recording(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    send_recording(&state, &name).await
}

pub async fn program_recording(
    State(state): State<AppState>,
    Path((name, file)): Path<(String, String)>,
) -> Result<Response> {
    if state.programs.get(&name).is_none() {
        return Err(UnknownProgram { id: name }.into());
    }

    send_recording(&state, &file).await
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::Router;
    use rss::Channel;
    use tower::ServiceExt;

    use crate::schedule::Programs;
    use crate::server::router;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        cfg: Config,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            recordings_dir: dir.path().join("recordings"),
            logo_dir: dir.path().join("logo"),
            ..Default::default()
        };
        fs::create_dir(&cfg.recordings_dir).unwrap();
        fs::create_dir(&cfg.logo_dir).unwrap();
        fs::write(cfg.recordings_dir.join("20251222-0740-aaaaaaaa.m4a"), b"morning").unwrap();
        fs::write(cfg.recordings_dir.join("20251222-2000-bbbbbbbb.m4a"), b"evening").unwrap();
        fs::write(cfg.logo_dir.join("default.png"), b"png").unwrap();

        Fixture { _dir: dir, cfg }
    }

    fn app(cfg: &Config) -> Router {
        let programs = Programs::parse([
            ("PROGRAM1", "07:40-08:00|ALL|morning|Morning Show|url1"),
            ("PROGRAM2", "20:00-21:00|MON-FRI|evening|Evening Show|url2"),
        ]);

        router(AppState::new(cfg.clone(), programs).unwrap())
    }

    async fn get(app: &Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut request = Request::builder().uri(uri);

        for &(name, value) in headers {
            request = request.header(name, value);
        }

        let response = app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, headers, body.to_vec())
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|&(name, value)| {
                (
                    header::HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                )
            })
            .collect()
    }

    #[test]
    fn base_url_from_headers() {
        let mut cfg = Config::default();

        assert_eq!(base_url(&HeaderMap::new(), &cfg), "http://localhost:8080/radio/");
        assert_eq!(
            base_url(&headers(&[("host", "radio.example.com")]), &cfg),
            "http://radio.example.com/radio/",
        );
        assert_eq!(
            base_url(
                &headers(&[
                    ("host", "internal:8080"),
                    ("x-forwarded-host", "radio.example.com"),
                    ("x-forwarded-proto", "HTTPS"),
                ]),
                &cfg,
            ),
            "https://radio.example.com/radio/",
        );
        assert_eq!(
            base_url(&headers(&[("host", "h"), ("x-forwarded-proto", "https, http")]), &cfg),
            "https://h/radio/",
        );
        assert_eq!(
            base_url(&headers(&[("host", "h"), ("x-forwarded-ssl", "on")]), &cfg),
            "https://h/radio/",
        );

        cfg.force_https = true;
        cfg.route_prefix = "/".into();
        assert_eq!(
            base_url(&headers(&[("host", "h"), ("x-forwarded-proto", "http")]), &cfg),
            "https://h/",
        );
    }

    #[tokio::test]
    async fn serves_the_aggregate_feed() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (status, headers, body) =
            get(&app, "/radio/feed.rss", &[("host", "radio.example.com")]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], RSS_CONTENT_TYPE);
        let channel = Channel::read_from(&body[..]).unwrap();
        assert_eq!(channel.items().len(), 2);
        assert_eq!(channel.link(), "http://radio.example.com/radio/");
    }

    #[tokio::test]
    async fn serves_program_feeds() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (status, _, body) = get(&app, "/radio/evening/feed.rss", &[("host", "h")]).await;

        assert_eq!(status, StatusCode::OK);
        let channel = Channel::read_from(&body[..]).unwrap();
        assert_eq!(channel.title(), "Evening Show");
        assert_eq!(channel.items().len(), 1);
        assert_eq!(
            channel.items()[0].enclosure().unwrap().url(),
            "http://h/radio/20251222-2000-bbbbbbbb.m4a",
        );

        let (status, _, _) = get(&app, "/radio/nope/feed.rss", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scheme_is_never_shared_between_cached_feeds() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (_, _, http) = get(&app, "/radio/morning/feed.rss", &[("host", "h")]).await;
        let (_, _, https) = get(
            &app,
            "/radio/morning/feed.rss",
            &[("host", "h"), ("x-forwarded-proto", "https")],
        )
        .await;

        let url = |body: &[u8]| {
            Channel::read_from(body).unwrap().items()[0]
                .enclosure()
                .unwrap()
                .url()
                .to_string()
        };
        assert_eq!(url(&http), "http://h/radio/20251222-0740-aaaaaaaa.m4a");
        assert_eq!(url(&https), "https://h/radio/20251222-0740-aaaaaaaa.m4a");
    }

    #[tokio::test]
    async fn new_recordings_show_up_after_the_marker_advances() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (_, _, before) = get(&app, "/radio/feed.rss", &[("host", "h")]).await;
        assert_eq!(Channel::read_from(&before[..]).unwrap().items().len(), 2);

        fs::write(cfg.recordings_dir.join("20251223-0740-cccccccc.m4a"), b"new").unwrap();
        let (_, _, cached) = get(&app, "/radio/feed.rss", &[("host", "h")]).await;
        assert_eq!(cached, before);

        recordings::touch_marker(&cfg.recordings_dir).unwrap();
        let (_, _, after) = get(&app, "/radio/feed.rss", &[("host", "h")]).await;
        assert_eq!(Channel::read_from(&after[..]).unwrap().items().len(), 3);
    }

    #[tokio::test]
    async fn secret_protects_feeds() {
        let Fixture { _dir, mut cfg } = fixture();
        cfg.secret = Some("hunter2".into());
        let app = app(&cfg);

        let (status, _, _) = get(&app, "/radio/feed.rss", &[]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = get(&app, "/radio/morning/feed.rss?secret=wrong", &[]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = get(&app, "/radio/morning/feed.rss?secret=hunter2", &[]).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = get(&app, "/radio/20251222-0740-aaaaaaaa.m4a", &[]).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn serves_recordings() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (status, headers, body) = get(&app, "/radio/20251222-0740-aaaaaaaa.m4a", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mp4");
        assert_eq!(headers[header::CONTENT_LENGTH], "7");
        assert_eq!(body, b"morning");

        let (status, _, body) =
            get(&app, "/radio/evening/20251222-2000-bbbbbbbb.m4a", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"evening");

        let (status, _, _) = get(&app, "/radio/nope/20251222-2000-bbbbbbbb.m4a", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get(&app, "/radio/missing.m4a", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_logos() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (status, headers, body) = get(&app, "/radio/logo/default.png", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(body, b"png");

        let (status, _, _) = get(&app, "/radio/logo/missing.jpg", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        for uri in ["/radio/..%2Fsecret.m4a", "/radio/logo/..", "/radio/morning/..%2F..%2Fetc"] {
            let (status, _, _) = get(&app, uri, &[]).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn index_lists_programs() {
        let Fixture { _dir, cfg } = fixture();
        let app = app(&cfg);

        let (status, _, body) = get(&app, "/", &[]).await;
        let html = String::from_utf8(body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Morning Show"));
        assert!(html.contains("/radio/evening/feed.rss"));
        assert!(html.contains("2 recordings"));
    }
}
