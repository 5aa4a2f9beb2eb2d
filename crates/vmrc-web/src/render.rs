//! HTML pages for the console picker and viewer.
//!
//! Templates are embedded at build time. Placeholders are `{{name}}` and
//! every substituted value is HTML-escaped.

use axum::response::Html;
use rust_embed::Embed;

use crate::error::AppError;

#[derive(Embed)]
#[folder = "templates/"]
struct Templates;

fn template(name: &str) -> Result<String, AppError> {
    let file = Templates::get(name)
        .ok_or_else(|| AppError::Internal(format!("missing template {name}")))?;
    String::from_utf8(file.data.into_owned())
        .map_err(|e| AppError::Internal(format!("template {name} is not UTF-8: {e}")))
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Picker page listing `consoles`, each linking to `/console/{name}`.
pub fn index_page(consoles: &[String]) -> Result<Html<String>, AppError> {
    let items = if consoles.is_empty() {
        "    <li class=\"empty\">No powered-on machines</li>".to_string()
    } else {
        consoles
            .iter()
            .map(|name| {
                format!(
                    "    <li><a href=\"/console/{}\">{}</a></li>",
                    urlencoding::encode(name),
                    escape_html(name)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    Ok(Html(template("index.html")?.replace("{{consoles}}", &items)))
}

/// Viewer page bound to `ticket`.
pub fn console_page(
    resource: &str,
    identity: &str,
    ticket: &str,
) -> Result<Html<String>, AppError> {
    let page = template("console.html")?
        .replace("{{resource}}", &escape_html(resource))
        .replace("{{identity}}", &escape_html(identity))
        .replace("{{ticket}}", &escape_html(ticket));
    Ok(Html(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<vm "a" & 'b'>"#),
            "&lt;vm &quot;a&quot; &amp; &#39;b&#39;&gt;"
        );
    }

    #[test]
    fn index_links_each_console() {
        let Html(page) = index_page(&["db 01".to_string(), "<web>".to_string()]).unwrap();

        assert!(page.contains(r#"<a href="/console/db%2001">db 01</a>"#));
        assert!(page.contains("&lt;web&gt;"));
        assert!(!page.contains("{{consoles}}"));
    }

    #[test]
    fn index_without_consoles() {
        let Html(page) = index_page(&[]).unwrap();
        assert!(page.contains("No powered-on machines"));
    }

    #[test]
    fn console_page_carries_ticket() {
        let Html(page) = console_page("myvm", "svc@vsphere.local", "T1").unwrap();

        assert!(page.contains(r#"data-ticket="T1""#));
        assert!(page.contains("as svc@vsphere.local"));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn viewer_loads_jquery_before_wmks() {
        let Html(page) = console_page("myvm", "svc", "T1").unwrap();

        let jquery = page.find("/static/jquery.min.js").unwrap();
        let jquery_ui = page.find("/static/jquery-ui.min.js").unwrap();
        let wmks = page.find("/static/wmks.min.js").unwrap();
        let viewer = page.find("/static/console.js").unwrap();
        assert!(jquery < jquery_ui && jquery_ui < wmks && wmks < viewer);
    }
}
