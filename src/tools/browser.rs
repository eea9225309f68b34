//! 网页模式工具：基于 Headless Chrome 的浏览器会话与 goto_url / click_element / fill_text / get_page_content
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//!
//! BrowserSession 是显式持有的资源：由宿主在一次运行前获取、运行后释放（close 或 drop），
//! 不存在进程级单例。会话内所有操作经同一把锁串行执行，同一批并发调度的工具调用也不会交错操作页面。
//! headless_chrome 为同步 API，统一放到 spawn_blocking 中执行。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::config::BrowserSection;
use crate::core::AgentError;
use crate::react::ContextProvider;
use crate::tools::schema::args_schema;
use crate::tools::{RemoteTools, Tool};

const CONTENT_TRUNCATED: &str = "\n[Content truncated due to length...]";

/// 在页面中收集可交互元素（按钮、链接、表单输入），返回 JSON 字符串
const INTERACTIVE_ELEMENTS_JS: &str = r#"
(function() {
    function selectorFor(el, fallback) {
        if (el.id) return '#' + el.id;
        const cls = (el.getAttribute('class') || '').trim().split(/\s+/).filter(Boolean);
        if (cls.length) return '.' + cls.join('.');
        return fallback;
    }
    const buttons = [];
    document.querySelectorAll('button, input[type=submit], input[type=button], input[type=reset]').forEach(el => {
        const text = (el.innerText || el.value || '').trim();
        const fallback = el.tagName === 'BUTTON'
            ? (text ? "button:contains('" + text + "')" : '')
            : (text ? "input[type='" + el.type + "'][value='" + text + "']" : '');
        const selector = selectorFor(el, fallback);
        if (selector) buttons.push({ text: text, selector: selector });
    });
    const links = [];
    document.querySelectorAll('a').forEach(el => {
        const text = (el.innerText || '').trim();
        const selector = selectorFor(el, text ? "a:contains('" + text + "')" : '');
        if (selector) links.push({ text: text, href: el.getAttribute('href') || '', selector: selector });
    });
    const inputs = [];
    document.querySelectorAll('input, textarea, select').forEach(el => {
        const tag = el.tagName.toLowerCase();
        const type = tag === 'input' ? (el.getAttribute('type') || '') : tag;
        if (['submit', 'button', 'reset'].includes(type)) return;
        const name = el.getAttribute('name') || '';
        let selector = el.id ? '#' + el.id : '';
        if (!selector && name) selector = "[name='" + name + "']";
        if (!selector) selector = type ? tag + "[type='" + type + "']" : tag;
        inputs.push({ type: type, name: name, placeholder: el.getAttribute('placeholder') || '', selector: selector });
    });
    return JSON.stringify({ buttons: buttons, links: links, inputs: inputs });
})()
"#;

#[derive(Debug, Default, Deserialize)]
struct InteractiveElements {
    #[serde(default)]
    buttons: Vec<ButtonElement>,
    #[serde(default)]
    links: Vec<LinkElement>,
    #[serde(default)]
    inputs: Vec<InputElement>,
}

#[derive(Debug, Deserialize)]
struct ButtonElement {
    text: String,
    selector: String,
}

#[derive(Debug, Deserialize)]
struct LinkElement {
    text: String,
    href: String,
    selector: String,
}

#[derive(Debug, Deserialize)]
struct InputElement {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    placeholder: String,
    selector: String,
}

impl InteractiveElements {
    fn render(&self, limit: usize) -> String {
        let mut out = String::from("INTERACTIVE ELEMENTS:\n");
        if !self.buttons.is_empty() {
            out.push_str("\nButtons:\n");
            for (i, b) in self.buttons.iter().take(limit).enumerate() {
                out.push_str(&format!(
                    "{}. Text: '{}', Selector: '{}'\n",
                    i + 1,
                    b.text,
                    b.selector
                ));
            }
            push_more(&mut out, self.buttons.len(), limit, "buttons");
        }
        if !self.links.is_empty() {
            out.push_str("\nLinks:\n");
            for (i, l) in self.links.iter().take(limit).enumerate() {
                out.push_str(&format!(
                    "{}. Text: '{}', Href: '{}', Selector: '{}'\n",
                    i + 1,
                    l.text,
                    l.href,
                    l.selector
                ));
            }
            push_more(&mut out, self.links.len(), limit, "links");
        }
        if !self.inputs.is_empty() {
            out.push_str("\nForm Inputs:\n");
            for (i, f) in self.inputs.iter().take(limit).enumerate() {
                out.push_str(&format!(
                    "{}. Type: '{}', Name: '{}', Placeholder: '{}', Selector: '{}'\n",
                    i + 1,
                    f.kind,
                    f.name,
                    f.placeholder,
                    f.selector
                ));
            }
            push_more(&mut out, self.inputs.len(), limit, "inputs");
        }
        out
    }
}

fn push_more(out: &mut String, total: usize, limit: usize, what: &str) {
    if total > limit {
        out.push_str(&format!("... and {} more {}\n", total - limit, what));
    }
}

/// 压缩空行并截断页面正文
fn clean_text(text: &str, max_chars: usize) -> String {
    let cleaned = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if cleaned.chars().count() > max_chars {
        cleaned.chars().take(max_chars).collect::<String>() + CONTENT_TRUNCATED
    } else {
        cleaned
    }
}

struct SessionInner {
    // 持有 Browser 以保持 Chrome 进程存活，drop 时进程退出
    _browser: Browser,
    tab: Arc<Tab>,
}

/// 浏览器会话：一次运行独占一个
pub struct BrowserSession {
    inner: Mutex<Option<SessionInner>>,
    settings: BrowserSection,
}

impl BrowserSession {
    /// 启动 Chrome 并打开一个标签页
    pub async fn launch(settings: &BrowserSection) -> Result<Arc<Self>, AgentError> {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(settings.headless)
                .build()
                .map_err(|e| AgentError::Browser(format!("Invalid launch options: {}", e)))?;
            let browser = Browser::new(options)
                .map_err(|e| AgentError::Browser(format!("Chrome launch failed: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| AgentError::Browser(format!("Browser tab failed: {}", e)))?;
            tab.set_default_timeout(Duration::from_secs(settings.navigation_timeout_secs));
            tracing::info!(headless = settings.headless, "browser session started");
            Ok(Arc::new(Self {
                inner: Mutex::new(Some(SessionInner {
                    _browser: browser,
                    tab,
                })),
                settings,
            }))
        })
        .await
        .map_err(|e| AgentError::Browser(format!("Task join: {}", e)))?
    }

    pub fn settings(&self) -> &BrowserSection {
        &self.settings
    }

    /// 释放会话（关闭标签页并结束 Chrome 进程）；重复调用无副作用
    pub fn close(&self) {
        let taken = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(inner) = taken {
            if let Err(e) = inner.tab.close(true) {
                tracing::warn!(error = %e, "closing browser tab failed");
            }
            tracing::info!("browser session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// 在阻塞线程中以独占方式操作标签页
    async fn with_tab<F, R>(self: &Arc<Self>, f: F) -> Result<R, String>
    where
        F: FnOnce(&Tab, &BrowserSection) -> Result<R, String> + Send + 'static,
        R: Send + 'static,
    {
        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let guard = session.inner.lock().map_err(|e| e.to_string())?;
            let inner = guard
                .as_ref()
                .ok_or_else(|| "Browser session is closed".to_string())?;
            f(&inner.tab, &session.settings)
        })
        .await
        .map_err(|e| format!("Task join: {}", e))?
    }

    pub async fn goto(self: &Arc<Self>, url: &str) -> Result<String, String> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        tracing::info!(url = %url, "browser navigate");
        self.with_tab(move |tab, _| {
            tab.navigate_to(&url)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| format!("Error navigating to {}: {}", url, e))?;
            Ok(format!("Successfully navigated to {}", url))
        })
        .await
    }

    pub async fn click(self: &Arc<Self>, selector: &str) -> Result<String, String> {
        let selector = selector.to_string();
        self.with_tab(move |tab, _| {
            tab.wait_for_element(&selector)
                .and_then(|el| el.click().map(|_| ()))
                .map_err(|e| format!("Error clicking element '{}': {}", selector, e))?;
            // 点击未必触发导航，等待失败不影响结果
            let _ = tab.wait_until_navigated();
            Ok(format!("Successfully clicked on element with selector '{}'.", selector))
        })
        .await
    }

    pub async fn fill(self: &Arc<Self>, selector: &str, text: &str) -> Result<String, String> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab, _| {
            let sel_js = serde_json::to_string(&selector).map_err(|e| e.to_string())?;
            let text_js = serde_json::to_string(&text).map_err(|e| e.to_string())?;
            let js = format!(
                r#"(function() {{
                    const el = document.querySelector({sel});
                    if (!el) return 'not found';
                    el.focus();
                    el.value = {txt};
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return 'filled';
                }})()"#,
                sel = sel_js,
                txt = text_js
            );
            let result = tab
                .evaluate(&js, false)
                .map_err(|e| format!("Error filling element '{}': {}", selector, e))?;
            match result.value.as_ref().and_then(|v| v.as_str()) {
                Some("filled") => Ok(format!(
                    "Successfully filled '{}' into element '{}'.",
                    text, selector
                )),
                _ => Err(format!("Error filling element '{}': element not found", selector)),
            }
        })
        .await
    }

    /// 页面标题、URL、可交互元素与清理后的正文
    pub async fn page_content(self: &Arc<Self>) -> Result<String, String> {
        self.with_tab(|tab, settings| {
            let html = tab
                .get_content()
                .map_err(|e| format!("Error getting page content: {}", e))?;
            let title = tab.get_title().unwrap_or_else(|_| "No title".to_string());
            let url = tab.get_url();

            let text = html2text::from_read(html.as_bytes(), 120).unwrap_or_else(|_| html.clone());
            let text = clean_text(&text, settings.max_content_chars);

            let elements = tab
                .evaluate(INTERACTIVE_ELEMENTS_JS, false)
                .ok()
                .and_then(|r| r.value)
                .and_then(|v| v.as_str().map(String::from))
                .and_then(|s| serde_json::from_str::<InteractiveElements>(&s).ok())
                .unwrap_or_default();

            Ok(format!(
                "PAGE TITLE: {}\nURL: {}\n\n{}\nPAGE CONTENT:\n{}",
                title,
                url,
                elements.render(settings.max_listed_elements),
                text
            ))
        })
        .await
    }

    pub async fn current_url(self: &Arc<Self>) -> Result<String, String> {
        self.with_tab(|tab, _| Ok(tab.get_url())).await
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GotoUrlArgs {
    /// 目标 URL
    url: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ClickElementArgs {
    /// CSS 选择器
    selector: String,
    /// 点击对象的简短说明，如 "the login button"
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FillTextArgs {
    /// 输入框的 CSS 选择器
    selector: String,
    /// 要填入的文本
    text: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))
}

pub struct GotoUrlTool {
    session: Arc<BrowserSession>,
}

#[async_trait]
impl Tool for GotoUrlTool {
    fn name(&self) -> &str {
        "goto_url"
    }

    fn description(&self) -> &str {
        "Navigate the browser to a URL. Args: {\"url\": \"https://...\"}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<GotoUrlArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: GotoUrlArgs = parse_args(args)?;
        self.session.goto(&args.url).await
    }
}

pub struct ClickElementTool {
    session: Arc<BrowserSession>,
}

#[async_trait]
impl Tool for ClickElementTool {
    fn name(&self) -> &str {
        "click_element"
    }

    fn description(&self) -> &str {
        "Click a button, link or other element found by CSS selector. Args: {\"selector\": \"#submit\", \"description\": \"the login button\"}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ClickElementArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ClickElementArgs = parse_args(args)?;
        tracing::info!(selector = %args.selector, description = %args.description, "browser click");
        self.session.click(&args.selector).await
    }
}

pub struct FillTextTool {
    session: Arc<BrowserSession>,
}

#[async_trait]
impl Tool for FillTextTool {
    fn name(&self) -> &str {
        "fill_text"
    }

    fn description(&self) -> &str {
        "Fill a text input (search bar, login form) with text. Args: {\"selector\": \"input[name='q']\", \"text\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FillTextArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: FillTextArgs = parse_args(args)?;
        self.session.fill(&args.selector, &args.text).await
    }
}

pub struct GetPageContentTool {
    session: Arc<BrowserSession>,
}

#[async_trait]
impl Tool for GetPageContentTool {
    fn name(&self) -> &str {
        "get_page_content"
    }

    fn description(&self) -> &str {
        "Return the cleaned text and interactive elements of the current page. Args: {}"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        self.session.page_content().await
    }
}

/// 网页模式的工具集（全部为异步远程工具）
pub fn web_tools(session: &Arc<BrowserSession>) -> Result<RemoteTools, AgentError> {
    RemoteTools::new()
        .with(GotoUrlTool {
            session: Arc::clone(session),
        })?
        .with(ClickElementTool {
            session: Arc::clone(session),
        })?
        .with(FillTextTool {
            session: Arc::clone(session),
        })?
        .with(GetPageContentTool {
            session: Arc::clone(session),
        })
}

/// 以实时页面作为 Decision Unit 的外部上下文：每轮决策前重新读取
pub struct PageContext {
    session: Arc<BrowserSession>,
}

impl PageContext {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl ContextProvider for PageContext {
    async fn current(&self) -> Result<String, AgentError> {
        // 页面读取失败同样作为文本交给模型，而不是中止运行
        Ok(self
            .session
            .page_content()
            .await
            .unwrap_or_else(|e| format!("Error getting page content: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_compacts_and_truncates() {
        assert_eq!(clean_text("  a \n\n\n b  \n", 100), "a\nb");
        let long = "x".repeat(20);
        assert_eq!(clean_text(&long, 5), format!("xxxxx{}", CONTENT_TRUNCATED));
    }

    #[test]
    fn test_render_interactive_elements_limits() {
        let json = r##"{"buttons":[{"text":"Go","selector":"#go"},{"text":"Stop","selector":"#stop"}],
            "links":[{"text":"Home","href":"/","selector":"a:contains('Home')"}],
            "inputs":[{"type":"text","name":"q","placeholder":"Search","selector":"[name='q']"}]}"##;
        let elements: InteractiveElements = serde_json::from_str(json).unwrap();
        let text = elements.render(1);
        assert!(text.contains("1. Text: 'Go', Selector: '#go'"));
        assert!(text.contains("... and 1 more buttons"));
        assert!(text.contains("Href: '/'"));
        assert!(text.contains("Placeholder: 'Search', Selector: '[name='q']'"));
    }
}
