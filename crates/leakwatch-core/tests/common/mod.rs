//! Shared harness for the end-to-end scenarios: a static file server over
//! `demos/fixtures/` plus a real headless Chromium instance, wired up the
//! same way `leakwatch-cli` launches one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use leakwatch_runtime::ChromiumDriver;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

pub struct FixtureServer {
    pub base_url: String,
    pub facebook_hits: Arc<AtomicUsize>,
}

/// Serves `demos/fixtures/` on an ephemeral localhost port, with a
/// `/facebook.html` route that just counts hits instead of 404ing, standing
/// in for the outbound request a real Facebook SDK endpoint would receive.
pub async fn spawn_fixture_server() -> FixtureServer {
    let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("demos/fixtures");

    let facebook_hits = Arc::new(AtomicUsize::new(0));

    let app = Router::new()
        .route("/facebook.html", get(count_facebook_hit))
        .with_state(facebook_hits.clone())
        .fallback_service(ServeDir::new(fixtures_dir));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fixture server crashed");
    });

    FixtureServer {
        base_url: format!("http://{addr}"),
        facebook_hits,
    }
}

async fn count_facebook_hit(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    "ok"
}

/// Launches headless Chrome the same way `leakwatch-cli` does and wraps it
/// in the driver facade the orchestrator depends on.
pub async fn launch_driver() -> ChromiumDriver {
    let config = BrowserConfig::builder()
        .arg("--headless=new")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .build()
        .expect("valid browser configuration");

    let (browser, mut handler) = Browser::launch(config)
        .await
        .expect("chrome failed to launch");

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                eprintln!("browser handler error: {e}");
            }
        }
    });

    ChromiumDriver::new(Arc::new(browser))
}
