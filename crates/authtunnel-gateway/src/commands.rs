//! Command router — dispatches validated operator commands against the
//! single page owned by the connection.

use tracing::{debug, warn};

use authtunnel_browser::driver::normalize_target_url;
use authtunnel_browser::Page;
use authtunnel_core::error::Result;
use authtunnel_core::protocol::Command;

/// Dispatch one input command. Returns whether a fresh frame should be
/// pushed for low-latency feedback.
///
/// `FinishCapture` is the session's job, not the router's, and returns
/// `false` untouched here. Callers are expected to catch and discard errors;
/// a failed action must never terminate the connection.
pub async fn dispatch(page: &dyn Page, command: &Command) -> Result<bool> {
    match command {
        Command::Click { x, y } => {
            page.click(*x, *y).await?;
            Ok(true)
        }
        Command::TypeText { text } => {
            page.type_text(text).await?;
            Ok(true)
        }
        Command::KeyPress { key } => {
            page.press_key(key).await?;
            Ok(true)
        }
        Command::Navigate { url } => match normalize_target_url(url) {
            Some(target) => {
                if let Err(e) = page.goto(&target).await {
                    // Unlike the other inputs, failed navigations leave a
                    // server-side trace before being discarded.
                    warn!(%target, %e, "Navigation failed");
                    return Err(e);
                }
                Ok(true)
            }
            None => {
                debug!(raw = %url, "Dropped navigation without a usable scheme");
                Ok(false)
            }
        },
        Command::FinishCapture => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authtunnel_browser::fake::FakeDriver;
    use authtunnel_browser::{Driver, LaunchOptions};

    async fn fake_page(driver: &FakeDriver) -> Box<dyn Page> {
        let instance = driver.launch(&LaunchOptions::default()).await.unwrap();
        instance.new_page().await.unwrap()
    }

    #[tokio::test]
    async fn test_click_requests_frame_push() {
        let driver = FakeDriver::new();
        let page = fake_page(&driver).await;
        let push = dispatch(page.as_ref(), &Command::Click { x: 3.0, y: 4.0 })
            .await
            .unwrap();
        assert!(push);
        assert!(driver.ops().contains(&"click 3,4".to_string()));
    }

    #[tokio::test]
    async fn test_navigate_scheme_insertion() {
        let driver = FakeDriver::new();
        let page = fake_page(&driver).await;
        let push = dispatch(
            page.as_ref(),
            &Command::Navigate {
                url: "example.com".into(),
            },
        )
        .await
        .unwrap();
        assert!(push);
        assert!(driver.ops().contains(&"goto https://example.com".to_string()));
    }

    #[tokio::test]
    async fn test_schemeless_garbage_is_noop() {
        let driver = FakeDriver::new();
        let page = fake_page(&driver).await;
        let push = dispatch(
            page.as_ref(),
            &Command::Navigate {
                url: "not a url, no scheme".into(),
            },
        )
        .await
        .unwrap();
        assert!(!push);
        assert!(!driver.ops().iter().any(|op| op.starts_with("goto")));
    }

    #[tokio::test]
    async fn test_failed_action_surfaces_error_for_caller_to_swallow() {
        let driver = FakeDriver::new();
        driver.fail_on("key");
        let page = fake_page(&driver).await;
        let result = dispatch(
            page.as_ref(),
            &Command::KeyPress {
                key: "Enter".into(),
            },
        )
        .await;
        assert!(result.is_err());
    }
}
