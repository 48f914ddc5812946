//! Session-artifact verifier — the downstream consumer contract.
//!
//! Loads a captured artifact, injects its cookies (storage is deliberately
//! left out) into a fresh, always-sandboxed browser instance, navigates to a
//! target page, and reports whether the rendered content contains a search
//! string. The instance here is independent of any tunnel server: no proxy,
//! its own lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use authtunnel_browser::{Driver, Instance, LaunchOptions};
use authtunnel_core::artifact::CapturedSession;
use authtunnel_core::error::Result;

/// How long the page gets to settle after navigation before its content is
/// inspected.
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// One verification run.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub session_file: PathBuf,
    pub url: String,
    pub search: String,
    /// Overridable for tests; defaults to [`SETTLE_DELAY`].
    pub settle: Duration,
}

impl VerifyRequest {
    pub fn new(
        session_file: impl Into<PathBuf>,
        url: impl Into<String>,
        search: impl Into<String>,
    ) -> Self {
        Self {
            session_file: session_file.into(),
            url: url.into(),
            search: search.into(),
            settle: SETTLE_DELAY,
        }
    }
}

/// Verify that the captured session still authenticates against the target.
///
/// A missing artifact fails before any browser resource is allocated. The
/// match is a case-insensitive substring check on the rendered document.
pub async fn verify_session(
    driver: &dyn Driver,
    executable: Option<PathBuf>,
    request: &VerifyRequest,
) -> Result<bool> {
    // Fails with ArtifactMissing before anything is launched.
    let artifact = CapturedSession::load(&request.session_file).await?;
    info!(
        cookies = artifact.cookies.len(),
        url = %request.url,
        "Verifying captured session"
    );

    // Sandbox is always enabled; this launch ignores any tunnel proxy policy.
    let options = LaunchOptions {
        executable,
        ..LaunchOptions::default()
    };

    let mut instance = driver.launch(&options).await?;
    let result = check_target(instance.as_ref(), &artifact, request).await;
    instance.close().await?;
    result
}

async fn check_target(
    instance: &dyn Instance,
    artifact: &CapturedSession,
    request: &VerifyRequest,
) -> Result<bool> {
    let page = instance.new_page().await?;

    // Cookies only; client storage is never injected.
    let cookies = artifact
        .cookies
        .iter()
        .cloned()
        .map(|mut cookie| {
            if cookie.domain.is_none() && cookie.url.is_none() {
                // Scope domainless records to the target.
                cookie.url = Some(request.url.clone());
            }
            cookie
        })
        .collect();
    page.set_cookies(cookies).await?;

    page.goto(&request.url).await?;
    tokio::time::sleep(request.settle).await;

    let content = page.content().await?;
    let found = content
        .to_lowercase()
        .contains(&request.search.to_lowercase());
    debug!(found, "Verification content check complete");
    Ok(found)
}
