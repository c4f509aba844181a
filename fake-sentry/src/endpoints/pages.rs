//! Human readable pages for browsing the fake upstream.

use axum::extract::State;
use axum::http::Uri;
use axum::response::{Html, IntoResponse};
use axum::{Router, routing};

use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/", routing::get(root))
        .fallback(catch_all)
}

async fn root(State(state): State<ServiceState>) -> impl IntoResponse {
    let mut page = String::from("<h1>Fake Sentry</h1><div>This is the root url</div>");
    if let Some(dsn) = state.config.dsn() {
        page.push_str(&format!("<div>DSN: <code>{}</code></div>", escape(&dsn)));
    }
    Html(page)
}

/// Answers requests to unknown paths with a hint instead of a 404.
async fn catch_all(uri: Uri) -> impl IntoResponse {
    tracing::debug!(%uri, "request to unknown path");

    Html(format!(
        "<h1>Fake Sentry</h1>\
        <div>You have called fake-sentry on: \
        <span style='font-family:monospace; background-color:#e8e8e8;'>{}</span></div>\
        <h3><b>Note:</b> This is probably the wrong url to call !!!</h3>",
        escape(uri.path().trim_start_matches('/'))
    ))
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a/<b>&'c'"), "a/&lt;b&gt;&amp;&#39;c&#39;");
        assert_eq!(escape("api/1/foo"), "api/1/foo");
    }
}
