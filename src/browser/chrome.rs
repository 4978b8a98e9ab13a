use std::sync::Arc;

use async_trait::async_trait;
use headless_chrome::Tab;
use serde_json::Value;

use crate::core::driver::{PageDriver, RenderedOption};
use crate::errors::{EngineError, Result};
use crate::types::ConsoleLine;

/// One driven Chrome page. Every interaction goes through JavaScript
/// evaluation against the tab, which keeps the driver uniform across the
/// third party's custom widgets.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn eval(&self, script: &str, await_promise: bool) -> Result<Value> {
        let result = self
            .tab
            .evaluate(script, await_promise)
            .map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn quoted(text: &str) -> Result<String> {
        serde_json::to_string(text).map_err(EngineError::from)
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| EngineError::Resource(e.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| EngineError::Resource(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"
            (function() {{
                const el = document.querySelector({sel});
                if (!el) return {{ ok: false, error: 'not found' }};
                el.scrollIntoView({{ block: 'center' }});
                el.focus();
                el.click();
                return {{ ok: true }};
            }})()
            "#,
            sel = Self::quoted(selector)?
        );
        let result = self.eval(&script, false)?;
        if result.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(())
        } else {
            Err(EngineError::Driver(format!(
                "click failed on {}: {}",
                selector,
                result
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
            )))
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r#"
            (function() {{
                const el = document.querySelector({sel});
                if (!el) return {{ ok: false, error: 'not found' }};
                el.focus();
                if (typeof el.select === 'function') el.select();
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true, cancelable: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true, cancelable: true }}));
                return {{ ok: true }};
            }})()
            "#,
            sel = Self::quoted(selector)?,
            val = Self::quoted(value)?
        );
        let result = self.eval(&script, false)?;
        if result.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(())
        } else {
            Err(EngineError::Driver(format!("fill failed on {}", selector)))
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        self.click(selector).await?;
        self.tab
            .type_str(text)
            .map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.tab
            .press_key(key)
            .map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(function() {{ const el = document.querySelector({sel}); return el ? (el.value ?? '') : null; }})()",
            sel = Self::quoted(selector)?
        );
        match self.eval(&script, false)? {
            Value::String(value) => Ok(value),
            _ => Err(EngineError::Driver(format!("no element for {}", selector))),
        }
    }

    async fn read_text(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(function() {{ const el = document.querySelector({sel}); return el ? (el.textContent || '').trim() : null; }})()",
            sel = Self::quoted(selector)?
        );
        match self.eval(&script, false)? {
            Value::String(text) => Ok(text),
            _ => Err(EngineError::Driver(format!("no element for {}", selector))),
        }
    }

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let script = format!(
            "(function() {{ const el = document.querySelector({sel}); return el ? el.getAttribute({attr}) : null; }})()",
            sel = Self::quoted(selector)?,
            attr = Self::quoted(name)?
        );
        match self.eval(&script, false)? {
            Value::String(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "!!document.querySelector({sel})",
            sel = Self::quoted(selector)?
        );
        Ok(self.eval(&script, false)?.as_bool().unwrap_or(false))
    }

    async fn options(&self, list_selector: &str) -> Result<Vec<RenderedOption>> {
        let script = format!(
            r#"
            (function() {{
                const list = document.querySelector({sel});
                if (!list) return null;
                const nodes = list.querySelectorAll('[role="option"], option, [role="listitem"]');
                return Array.from(nodes).map(el => ({{
                    id: el.id || null,
                    value: el.getAttribute('data-value') || el.getAttribute('value'),
                    label: (el.textContent || '').trim(),
                    selected: el.getAttribute('aria-selected') === 'true' || el.selected === true
                }}));
            }})()
            "#,
            sel = Self::quoted(list_selector)?
        );
        match self.eval(&script, false)? {
            Value::Null => Err(EngineError::Driver(format!(
                "option list missing: {}",
                list_selector
            ))),
            value => serde_json::from_value(value).map_err(EngineError::from),
        }
    }

    async fn active_option(&self, list_selector: &str) -> Result<Option<RenderedOption>> {
        let script = format!(
            r#"
            (function() {{
                const list = document.querySelector({sel});
                if (!list) return null;
                let el = null;
                const activeId = list.getAttribute('aria-activedescendant')
                    || (document.activeElement && document.activeElement.getAttribute('aria-activedescendant'));
                if (activeId) el = document.getElementById(activeId);
                if (!el) el = list.querySelector('[aria-selected="true"], .active, .highlighted');
                if (!el) return null;
                return {{
                    id: el.id || null,
                    value: el.getAttribute('data-value') || el.getAttribute('value'),
                    label: (el.textContent || '').trim(),
                    selected: true
                }};
            }})()
            "#,
            sel = Self::quoted(list_selector)?
        );
        match self.eval(&script, false)? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn click_option(&self, list_selector: &str, index: usize) -> Result<()> {
        let script = format!(
            r#"
            (function() {{
                const list = document.querySelector({sel});
                if (!list) return {{ ok: false }};
                const nodes = list.querySelectorAll('[role="option"], option, [role="listitem"]');
                const el = nodes[{index}];
                if (!el) return {{ ok: false }};
                el.scrollIntoView({{ block: 'center' }});
                el.click();
                return {{ ok: true }};
            }})()
            "#,
            sel = Self::quoted(list_selector)?,
            index = index
        );
        let result = self.eval(&script, false)?;
        if result.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(())
        } else {
            Err(EngineError::Driver(format!(
                "option {} vanished from {}",
                index, list_selector
            )))
        }
    }

    async fn scroll_list(&self, list_selector: &str, delta_px: i64) -> Result<()> {
        let script = format!(
            r#"
            (function() {{
                const list = document.querySelector({sel});
                if (!list) return {{ ok: false, error: 'not found' }};
                const before = list.scrollTop;
                list.scrollTop = before + {delta};
                list.dispatchEvent(new Event('scroll', {{ bubbles: true }}));
                return {{ ok: list.scrollTop !== before }};
            }})()
            "#,
            sel = Self::quoted(list_selector)?,
            delta = delta_px
        );
        let result = self.eval(&script, false)?;
        if result.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(())
        } else {
            // Either missing or not scrollable; the caller falls back to
            // keyboard paging.
            Err(EngineError::Driver(format!(
                "direct scroll had no effect on {}",
                list_selector
            )))
        }
    }

    async fn body_text(&self) -> Result<String> {
        match self.eval("document.body ? document.body.innerText : ''", false)? {
            Value::String(text) => Ok(text),
            _ => Ok(String::new()),
        }
    }

    async fn inner_html(&self, selector: &str) -> Result<String> {
        let script = format!(
            "(function() {{ const el = document.querySelector({sel}); return el ? el.innerHTML : null; }})()",
            sel = Self::quoted(selector)?
        );
        match self.eval(&script, false)? {
            Value::String(html) => Ok(html),
            _ => Err(EngineError::Driver(format!("no element for {}", selector))),
        }
    }

    async fn read_clipboard(&self) -> Result<String> {
        // Requires the clipboard-read permission granted at context setup.
        let result = self.eval("navigator.clipboard.readText()", true)?;
        match result {
            Value::String(text) => Ok(text),
            _ => Err(EngineError::Driver("clipboard read returned no text".to_string())),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(
                headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|e| EngineError::Driver(e.to_string()))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn install_console_hook(&self) -> Result<()> {
        let script = r#"
            (function() {
                if (window.__epConsole) return true;
                window.__epConsole = [];
                for (const level of ['log', 'info', 'warn', 'error']) {
                    const original = console[level].bind(console);
                    console[level] = (...args) => {
                        try {
                            window.__epConsole.push({
                                level: level,
                                text: args.map(a => String(a)).join(' '),
                                at: Date.now()
                            });
                        } catch (e) {}
                        original(...args);
                    };
                }
                return true;
            })()
        "#;
        self.eval(script, false)?;
        Ok(())
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleLine>> {
        let result = self.eval(
            "(function() { const b = window.__epConsole || []; window.__epConsole = []; return b; })()",
            false,
        )?;
        let raw: Vec<serde_json::Map<String, Value>> =
            serde_json::from_value(result).unwrap_or_default();
        Ok(raw
            .into_iter()
            .map(|entry| {
                let millis = entry.get("at").and_then(Value::as_i64).unwrap_or(0);
                ConsoleLine {
                    level: entry
                        .get("level")
                        .and_then(Value::as_str)
                        .unwrap_or("log")
                        .to_string(),
                    text: entry
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    captured_at: chrono::DateTime::from_timestamp_millis(millis)
                        .unwrap_or_else(chrono::Utc::now),
                }
            })
            .collect())
    }
}
