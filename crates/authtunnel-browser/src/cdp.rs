//! chromiumoxide-backed implementation of the automation capability.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page as CdpPage, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use authtunnel_core::artifact::CookieRecord;
use authtunnel_core::error::{Result, TunnelError};

use crate::driver::{Driver, Instance, LaunchOptions, Page, LAUNCH_ARGS};

/// JPEG quality for streamed frames; small enough to push every tick.
const FRAME_QUALITY: i64 = 50;

/// Launches real Chromium processes over the DevTools protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpDriver;

#[async_trait]
impl Driver for CdpDriver {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Instance>> {
        let mut builder = BrowserConfig::builder()
            .viewport(Viewport {
                width: options.viewport.0,
                height: options.viewport.1,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: options.viewport.0 >= options.viewport.1,
                has_touch: false,
            })
            .args(LAUNCH_ARGS.iter().map(|a| a.to_string()));

        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(proxy) = &options.proxy {
            // Routing only; the sandbox flag set stays untouched.
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if !options.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(TunnelError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TunnelError::Browser(format!("launch failed: {e}")))?;

        // Drive CDP traffic until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if result.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(CdpInstance {
            browser: Some(browser),
            handler_task: Some(handler_task),
            user_agent: options.user_agent.clone(),
        }))
    }
}

struct CdpInstance {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    user_agent: String,
}

#[async_trait]
impl Instance for CdpInstance {
    async fn new_page(&self) -> Result<Box<dyn Page>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| TunnelError::Browser("instance already closed".into()))?;

        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        if let Err(e) = page.set_user_agent(self.user_agent.clone()).await {
            debug!(%e, "User agent override failed");
        }

        Ok(Box::new(CdpPageHandle { page }))
    }

    async fn close(&mut self) -> Result<()> {
        // Second and later invocations are no-ops.
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!(%e, "Browser close reported an error");
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        Ok(())
    }
}

struct CdpPageHandle {
    page: CdpPage,
}

#[async_trait]
impl Page for CdpPageHandle {
    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(FRAME_QUALITY)
            .build();
        self.page.screenshot(params).await.map_err(cdp_err)
    }

    async fn click(&self, x: f64, y: f64) -> Result<()> {
        let press = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(TunnelError::Browser)?;
        self.page.execute(press).await.map_err(cdp_err)?;

        let release = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(TunnelError::Browser)?;
        self.page.execute(release).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .build()
            .map_err(TunnelError::Browser)?;
        self.page.execute(down).await.map_err(cdp_err)?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .build()
            .map_err(TunnelError::Browser)?;
        self.page.execute(up).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let cookies = self.page.get_cookies().await.map_err(cdp_err)?;
        Ok(cookies.into_iter().map(cookie_to_record).collect())
    }

    async fn set_cookies(&self, cookies: Vec<CookieRecord>) -> Result<()> {
        let params: Vec<CookieParam> = cookies.into_iter().map(record_to_param).collect();
        self.page.set_cookies(params).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(expression).await.map_err(cdp_err)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(cdp_err)
    }
}

fn cdp_err(e: chromiumoxide::error::CdpError) -> TunnelError {
    TunnelError::Browser(e.to_string())
}

fn cookie_to_record(cookie: Cookie) -> CookieRecord {
    CookieRecord {
        name: cookie.name,
        value: cookie.value,
        domain: Some(cookie.domain),
        path: Some(cookie.path),
        expires: normalize_expiry(cookie.expires),
        http_only: Some(cookie.http_only),
        secure: Some(cookie.secure),
        same_site: cookie.same_site.map(|s| same_site_str(&s).to_string()),
        url: None,
    }
}

/// CDP reports -1 for session cookies; the artifact omits the field instead.
fn normalize_expiry(expires: f64) -> Option<f64> {
    (expires >= 0.0).then_some(expires)
}

fn record_to_param(record: CookieRecord) -> CookieParam {
    let mut param = CookieParam::new(record.name, record.value);
    param.domain = record.domain;
    param.path = record.path;
    param.expires = record.expires.map(TimeSinceEpoch::new);
    param.http_only = record.http_only;
    param.secure = record.secure;
    param.same_site = record.same_site.as_deref().and_then(parse_same_site);
    param.url = record.url;
    param
}

fn same_site_str(same_site: &CookieSameSite) -> &'static str {
    match same_site {
        CookieSameSite::Strict => "Strict",
        CookieSameSite::Lax => "Lax",
        CookieSameSite::None => "None",
    }
}

fn parse_same_site(value: &str) -> Option<CookieSameSite> {
    match value {
        "Strict" => Some(CookieSameSite::Strict),
        "Lax" => Some(CookieSameSite::Lax),
        "None" => Some(CookieSameSite::None),
        _ => None,
    }
}
