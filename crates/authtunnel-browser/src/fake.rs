//! Scripted in-memory driver for exercising the tunnel without a browser.
//!
//! Records every operation, serves canned data, and supports per-operation
//! failure injection. Used by the gateway and verifier test suites.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use authtunnel_core::artifact::CookieRecord;
use authtunnel_core::error::{Result, TunnelError};

use crate::driver::{Driver, Instance, LaunchOptions, Page};

/// Shared scripted state, observable from the test after driving the system.
#[derive(Default)]
pub struct FakeState {
    /// Every operation in dispatch order, e.g. `click 10,20`, `goto https://..`.
    ops: Mutex<Vec<String>>,
    /// Cookies the page reports on capture.
    cookies: Mutex<Vec<CookieRecord>>,
    /// Cookies injected via `set_cookies`.
    injected: Mutex<Vec<CookieRecord>>,
    /// Value returned by in-page storage serialization.
    storage: Mutex<String>,
    /// Rendered document returned by `content`.
    content: Mutex<String>,
    /// Bytes returned by `screenshot`.
    frame: Mutex<Vec<u8>>,
    /// Operation names that should fail.
    failing: Mutex<HashSet<String>>,
    launches: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeState {
    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(TunnelError::Browser(format!("scripted {op} failure")));
        }
        Ok(())
    }
}

/// Driver half of the fake; cheap to clone, all clones share one state.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        *driver.state.storage.lock().unwrap() = "{}".to_string();
        *driver.state.frame.lock().unwrap() = b"fake-jpeg-frame".to_vec();
        driver
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.ops.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn injected_cookies(&self) -> Vec<CookieRecord> {
        self.state.injected.lock().unwrap().clone()
    }

    pub fn set_cookies(&self, cookies: Vec<CookieRecord>) {
        *self.state.cookies.lock().unwrap() = cookies;
    }

    pub fn set_storage(&self, storage: &str) {
        *self.state.storage.lock().unwrap() = storage.to_string();
    }

    pub fn set_content(&self, content: &str) {
        *self.state.content.lock().unwrap() = content.to_string();
    }

    pub fn set_frame(&self, frame: Vec<u8>) {
        *self.state.frame.lock().unwrap() = frame;
    }

    /// Make the named operation (`launch`, `click`, `goto`, ...) fail.
    pub fn fail_on(&self, op: &str) {
        self.state.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.state.failing.lock().unwrap().remove(op);
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Instance>> {
        self.state.check("launch")?;
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        self.state.record(format!(
            "launch headless={} proxy={}",
            options.headless,
            options.proxy.as_deref().unwrap_or("-")
        ));
        Ok(Box::new(FakeInstance {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct FakeInstance {
    state: Arc<FakeState>,
    closed: bool,
}

#[async_trait]
impl Instance for FakeInstance {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        self.state.check("new_page")?;
        self.state.record("new_page".to_string());
        Ok(Box::new(FakePage {
            state: self.state.clone(),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        // Repeat closes are tolerated and not counted.
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
            self.state.record("close".to_string());
        }
        Ok(())
    }
}

struct FakePage {
    state: Arc<FakeState>,
}

#[async_trait]
impl Page for FakePage {
    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.state.check("screenshot")?;
        self.state.record("screenshot".to_string());
        Ok(self.state.frame.lock().unwrap().clone())
    }

    async fn click(&self, x: f64, y: f64) -> Result<()> {
        self.state.check("click")?;
        self.state.record(format!("click {x},{y}"));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.state.check("type")?;
        self.state.record(format!("type {text}"));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.state.check("key")?;
        self.state.record(format!("key {key}"));
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.state.check("goto")?;
        self.state.record(format!("goto {url}"));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        self.state.check("cookies")?;
        self.state.record("cookies".to_string());
        Ok(self.state.cookies.lock().unwrap().clone())
    }

    async fn set_cookies(&self, cookies: Vec<CookieRecord>) -> Result<()> {
        self.state.check("set_cookies")?;
        self.state.record(format!("set_cookies {}", cookies.len()));
        self.state.injected.lock().unwrap().extend(cookies);
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        self.state.check("evaluate")?;
        self.state.record(format!("evaluate {expression}"));
        Ok(serde_json::Value::String(
            self.state.storage.lock().unwrap().clone(),
        ))
    }

    async fn content(&self) -> Result<String> {
        self.state.check("content")?;
        self.state.record("content".to_string());
        Ok(self.state.content.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LaunchOptions;

    #[tokio::test]
    async fn test_records_operations_in_order() {
        let driver = FakeDriver::new();
        let instance = driver.launch(&LaunchOptions::default()).await.unwrap();
        let page = instance.new_page().await.unwrap();

        page.goto("https://example.com").await.unwrap();
        page.click(10.0, 20.0).await.unwrap();
        page.type_text("hello").await.unwrap();

        let ops = driver.ops();
        assert_eq!(ops[1..], [
            "new_page",
            "goto https://example.com",
            "click 10,20",
            "type hello"
        ]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let driver = FakeDriver::new();
        driver.fail_on("launch");
        assert!(driver.launch(&LaunchOptions::default()).await.is_err());
        assert_eq!(driver.launch_count(), 0);

        driver.recover("launch");
        assert!(driver.launch(&LaunchOptions::default()).await.is_ok());
        assert_eq!(driver.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let driver = FakeDriver::new();
        let mut instance = driver.launch(&LaunchOptions::default()).await.unwrap();
        instance.close().await.unwrap();
        instance.close().await.unwrap();
        assert_eq!(driver.close_count(), 1);
    }
}
