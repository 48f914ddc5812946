//! Session capturer — cookies + client storage to the artifact file.

use std::path::Path;

use authtunnel_browser::Page;
use authtunnel_core::artifact::CapturedSession;
use authtunnel_core::error::{Result, TunnelError};

/// In-page expression serializing persistent client storage to a string.
const STORAGE_SNAPSHOT: &str = "JSON.stringify(localStorage)";

/// Read cookies and storage from the live context and overwrite the artifact.
///
/// The snapshot is taken fresh on every call; the file is replaced
/// wholesale. Returns the captured session so callers can acknowledge only
/// after the write actually returned.
pub async fn capture_session(page: &dyn Page, path: &Path) -> Result<CapturedSession> {
    let cookies = page.cookies().await?;
    let storage = match page.evaluate(STORAGE_SNAPSHOT).await? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };

    let session = CapturedSession { cookies, storage };
    session
        .save(path)
        .await
        .map_err(|e| TunnelError::Capture(e.to_string()))?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use authtunnel_browser::fake::FakeDriver;
    use authtunnel_browser::{Driver, LaunchOptions};
    use authtunnel_core::artifact::CookieRecord;

    async fn fake_page(driver: &FakeDriver) -> Box<dyn Page> {
        let instance = driver.launch(&LaunchOptions::default()).await.unwrap();
        instance.new_page().await.unwrap()
    }

    #[tokio::test]
    async fn test_capture_writes_snapshot() {
        let driver = FakeDriver::new();
        driver.set_cookies(vec![CookieRecord {
            name: "sid".into(),
            value: "abc".into(),
            ..Default::default()
        }]);
        driver.set_storage(r#"{"theme":"dark"}"#);
        let page = fake_page(&driver).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let captured = capture_session(page.as_ref(), &path).await.unwrap();

        let on_disk = CapturedSession::load(&path).await.unwrap();
        assert_eq!(on_disk, captured);
        assert_eq!(on_disk.cookies[0].name, "sid");
        assert_eq!(on_disk.storage, r#"{"theme":"dark"}"#);
    }

    #[tokio::test]
    async fn test_capture_overwrites_previous_artifact() {
        let driver = FakeDriver::new();
        let page = fake_page(&driver).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        driver.set_cookies(vec![CookieRecord {
            name: "first".into(),
            value: "1".into(),
            ..Default::default()
        }]);
        capture_session(page.as_ref(), &path).await.unwrap();

        driver.set_cookies(vec![CookieRecord {
            name: "second".into(),
            value: "2".into(),
            ..Default::default()
        }]);
        capture_session(page.as_ref(), &path).await.unwrap();

        let on_disk = CapturedSession::load(&path).await.unwrap();
        assert_eq!(on_disk.cookies.len(), 1);
        assert_eq!(on_disk.cookies[0].name, "second");
    }

    #[tokio::test]
    async fn test_write_failure_is_capture_error() {
        let driver = FakeDriver::new();
        let page = fake_page(&driver).await;

        let err = capture_session(page.as_ref(), Path::new("/nonexistent/dir/session.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Capture(_)));
    }
}
