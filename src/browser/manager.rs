use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, warn};

use crate::browser::chrome::ChromePage;
use crate::core::config::Config;
use crate::errors::{EngineError, Result};

/// Owns the three nested scoped resources of one automation run: the Chrome
/// process, an isolated incognito context (fresh state per request), and
/// the driven page. Release tears them down page-first, each attempt
/// independent so one failure never blocks the others.
pub struct SessionManager {
    config: Config,
}

impl SessionManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn acquire(&self, headless: bool) -> Result<SessionHandle> {
        let browser = self.launch(headless)?;

        let (context_id, tab) = {
            let context = browser
                .new_context()
                .map_err(|e| EngineError::Resource(format!("context creation failed: {}", e)))?;
            let context_id = context.get_id().to_string();
            let tab = context
                .new_tab()
                .map_err(|e| EngineError::Resource(format!("page creation failed: {}", e)))?;
            (context_id, tab)
        };

        tab.set_default_timeout(Duration::from_millis(
            self.config.session.default_timeout_ms,
        ));

        // Share-URL extraction may fall back to the clipboard; the
        // permission has to be in place before any prompt could appear.
        grant_clipboard_read(&tab, &context_id)
            .map_err(|e| EngineError::Resource(format!("clipboard permission failed: {}", e)))?;

        debug!(context = %context_id, "browser session acquired");
        Ok(SessionHandle {
            tab: Some(tab.clone()),
            teardown: Some(Box::new(ChromeTeardown {
                browser: Some(browser),
                context_id: Some(context_id),
                tab: Some(tab),
            })),
        })
    }

    fn launch(&self, headless: bool) -> Result<Browser> {
        let window_size_arg = format!(
            "--window-size={},{}",
            self.config.browser.viewport.width, self.config.browser.viewport.height
        );
        let user_agent_arg = self
            .config
            .browser
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];
        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }
        for arg in &self.config.browser.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(headless)
            .args(args)
            .build()
            .map_err(|e| EngineError::Resource(e.to_string()))?;

        Browser::new(launch_options).map_err(|e| EngineError::Resource(e.to_string()))
    }
}

fn grant_clipboard_read(tab: &Arc<Tab>, context_id: &str) -> anyhow::Result<()> {
    use headless_chrome::protocol::cdp::Browser::{GrantPermissions, PermissionType};

    tab.call_method(GrantPermissions {
        permissions: vec![
            PermissionType::ClipboardReadWrite,
            PermissionType::ClipboardSanitizedWrite,
        ],
        origin: None,
        browser_context_id: Some(context_id.to_string()),
    })?;
    Ok(())
}

/// The three closers in teardown order: page, then context, then process.
/// A seam rather than inline calls so the release semantics are checkable
/// without a running browser.
trait Teardown: Send {
    fn close_page(&mut self) -> anyhow::Result<()>;
    fn dispose_context(&mut self) -> anyhow::Result<()>;
    fn terminate_process(&mut self) -> anyhow::Result<()>;
}

struct ChromeTeardown {
    browser: Option<Browser>,
    context_id: Option<String>,
    tab: Option<Arc<Tab>>,
}

impl Teardown for ChromeTeardown {
    fn close_page(&mut self) -> anyhow::Result<()> {
        if let Some(tab) = self.tab.take() {
            tab.close(true)?;
        }
        Ok(())
    }

    fn dispose_context(&mut self) -> anyhow::Result<()> {
        if let (Some(context_id), Some(browser)) = (self.context_id.take(), self.browser.as_ref())
        {
            dispose_context(browser, &context_id)?;
        }
        Ok(())
    }

    fn terminate_process(&mut self) -> anyhow::Result<()> {
        // Dropping the Browser handle terminates the process.
        self.browser.take();
        Ok(())
    }
}

fn dispose_context(browser: &Browser, context_id: &str) -> anyhow::Result<()> {
    use headless_chrome::protocol::cdp::Target::DisposeBrowserContext;

    // Context-level CDP commands ride on a throwaway tab in the default
    // context; the incognito context's own tab is already gone.
    let tab = browser.new_tab()?;
    tab.call_method(DisposeBrowserContext {
        browser_context_id: context_id.to_string(),
    })?;
    let _ = tab.close(true);
    Ok(())
}

fn run_teardown(teardown: &mut dyn Teardown) {
    if let Err(err) = teardown.close_page() {
        warn!(error = %err, "page close failed");
    }
    if let Err(err) = teardown.dispose_context() {
        warn!(error = %err, "context disposal failed");
    }
    if let Err(err) = teardown.terminate_process() {
        warn!(error = %err, "process termination failed");
    }
}

pub struct SessionHandle {
    tab: Option<Arc<Tab>>,
    teardown: Option<Box<dyn Teardown>>,
}

impl SessionHandle {
    pub fn page(&self) -> Result<ChromePage> {
        self.tab
            .as_ref()
            .map(|tab| ChromePage::new(tab.clone()))
            .ok_or_else(|| EngineError::Resource("session handle already released".to_string()))
    }

    /// Release page, then context, then process, each exactly once. Runs
    /// every closer even if an earlier one fails; errors are logged and
    /// swallowed since there is nothing actionable left by this point.
    pub async fn release(&mut self) {
        self.tab = None;
        let Some(mut teardown) = self.teardown.take() else {
            return;
        };
        run_teardown(teardown.as_mut());
        debug!("browser session released");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Backstop for panics and early returns; release() is the normal
        // path. Taking the teardown keeps every closer single-shot.
        if let Some(mut teardown) = self.teardown.take() {
            warn!("session handle dropped without explicit release");
            run_teardown(teardown.as_mut());
        }
    }
}
