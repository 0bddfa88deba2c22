//! Template rendering seam.
//!
//! Rendering engines are external collaborators; the gateway only needs an
//! opaque byte stream per page. The built-in renderer resolves a tenant
//! override directory (tenant slug, then `default`) and falls back to
//! compiled-in pages with placeholder substitution.

use crate::entities::Tenant;
use crate::error::GatewayError;
use std::path::PathBuf;

/// Pages the gateway renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// The login form
    Login,
    /// The logout auto-redirect page
    Logout,
    /// Error page for HTML-accepting clients
    Error,
}

impl Page {
    const fn file_name(self) -> &'static str {
        match self {
            Self::Login => "login.html",
            Self::Logout => "logout.html",
            Self::Error => "error.html",
        }
    }
}

/// Substitution context for a page render.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// The `location` the login form posts back, or the logout target
    pub location: String,
    /// Machine-readable error token to display
    pub error: Option<&'static str>,
}

/// Renders pages to an opaque byte stream.
pub trait TemplateRenderer: Send + Sync {
    /// Render a page for a tenant (or the default when none resolves).
    ///
    /// # Errors
    ///
    /// Implementation-specific rendering failures.
    fn render(
        &self,
        tenant: Option<&Tenant>,
        page: Page,
        context: &PageContext,
    ) -> Result<Vec<u8>, GatewayError>;
}

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
  <main>
    <h1>Sign in</h1>
    <!-- ERROR:{{error}} -->
    <p class="error">{{error}}</p>
    <form action="/login" method="post">
      <input type="hidden" name="location" value="{{location}}">
      <label>Username <input type="text" name="username" autocomplete="username"></label>
      <label>Password <input type="password" name="password" autocomplete="current-password"></label>
      <button type="submit">Sign in</button>
    </form>
  </main>
</body>
</html>
"#;

const LOGOUT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="0; url={{location}}">
  <title>Signing out</title>
</head>
<body>
  <p>Signing out&hellip; <a href="{{location}}">continue</a></p>
</body>
</html>
"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Error</title></head>
<body>
  <main>
    <h1>Request failed</h1>
    <p class="error">{{error}}</p>
  </main>
</body>
</html>
"#;

/// Built-in HTML renderer with optional on-disk tenant overrides.
pub struct HtmlTemplates {
    override_root: Option<PathBuf>,
}

impl HtmlTemplates {
    /// Renderer without overrides.
    #[must_use]
    pub fn new() -> Self {
        Self {
            override_root: None,
        }
    }

    /// Renderer resolving overrides under `<root>/<slug>/<page>.html`.
    #[must_use]
    pub fn with_override_root(root: PathBuf) -> Self {
        Self {
            override_root: Some(root),
        }
    }

    fn load_override(&self, tenant: Option<&Tenant>, page: Page) -> Option<String> {
        let root = self.override_root.as_ref()?;
        let slugs: Vec<String> = match tenant {
            Some(tenant) => vec![tenant.slug(), "default".to_string()],
            None => vec!["default".to_string()],
        };
        slugs
            .iter()
            .map(|slug| root.join(slug).join(page.file_name()))
            .find_map(|path| std::fs::read_to_string(path).ok())
    }
}

impl Default for HtmlTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for HtmlTemplates {
    fn render(
        &self,
        tenant: Option<&Tenant>,
        page: Page,
        context: &PageContext,
    ) -> Result<Vec<u8>, GatewayError> {
        let source = self.load_override(tenant, page).unwrap_or_else(|| {
            match page {
                Page::Login => LOGIN_HTML,
                Page::Logout => LOGOUT_HTML,
                Page::Error => ERROR_HTML,
            }
            .to_string()
        });

        let rendered = source
            .replace("{{location}}", &escape_html(&context.location))
            .replace("{{error}}", context.error.unwrap_or(""));
        Ok(rendered.into_bytes())
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_page_embeds_location() {
        let renderer = HtmlTemplates::new();
        let context = PageContext {
            location: "/authorize?client_id=abc&state=1".to_string(),
            error: None,
        };
        let html = String::from_utf8(renderer.render(None, Page::Login, &context).unwrap()).unwrap();

        assert!(html.contains(r#"form action="/login""#));
        assert!(html.contains("/authorize?client_id=abc&amp;state=1"));
    }

    #[test]
    fn test_error_token_rendered() {
        let renderer = HtmlTemplates::new();
        let context = PageContext {
            location: String::new(),
            error: Some("WRONG_CREDENTIALS"),
        };
        let html = String::from_utf8(renderer.render(None, Page::Login, &context).unwrap()).unwrap();
        assert!(html.contains("WRONG_CREDENTIALS"));
    }

    #[test]
    fn test_location_is_escaped() {
        let renderer = HtmlTemplates::new();
        let context = PageContext {
            location: r#""><script>alert(1)</script>"#.to_string(),
            error: None,
        };
        let html = String::from_utf8(renderer.render(None, Page::Login, &context).unwrap()).unwrap();
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn test_logout_page_redirects() {
        let renderer = HtmlTemplates::new();
        let context = PageContext {
            location: "/logout/finalize?location=/".to_string(),
            error: None,
        };
        let html =
            String::from_utf8(renderer.render(None, Page::Logout, &context).unwrap()).unwrap();
        assert!(html.contains("http-equiv=\"refresh\""));
        assert!(html.contains("/logout/finalize?location=/"));
    }
}
