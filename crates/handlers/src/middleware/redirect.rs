use crate::handler::Handler;
use crate::request::Request;
use crate::writer::{ResponseWriter, header_value, write_all};
use async_trait::async_trait;
use http::{HeaderValue, Method, StatusCode, header};
use tracing::{debug, trace};

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Redirects `/messages/` to `/messages` with a 301. The root path is left alone.
///
/// The query string is carried over, `/messages/?page=2` goes to `/messages?page=2`.
#[derive(Debug)]
pub struct TrailingSlashRedirect<H> {
    handler: H,
}

pub fn trailing_slash_redirect<H: Handler>(handler: H) -> TrailingSlashRedirect<H> {
    TrailingSlashRedirect { handler }
}

#[async_trait]
impl<H: Handler> Handler for TrailingSlashRedirect<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let path = req.path();
        if path.len() > 1
            && let Some(stripped) = path.strip_suffix('/')
        {
            let mut location = clean_path(stripped);
            if let Some(query) = req.query() {
                location.push('?');
                location.push_str(query);
            }
            redirect(w, &req, &location, StatusCode::MOVED_PERMANENTLY);
            return;
        }

        self.handler.serve(req, w).await;
    }
}

/// Redirects requests carrying `X-Forwarded-Proto: http` to their https equivalent with a 302.
#[derive(Debug)]
pub struct RedirectProto<H> {
    handler: H,
}

pub fn redirect_proto<H: Handler>(handler: H) -> RedirectProto<H> {
    RedirectProto { handler }
}

#[async_trait]
impl<H: Handler> Handler for RedirectProto<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        if req.header(X_FORWARDED_PROTO) == Some("http") {
            let location = format!("https://{}{}", req.host().unwrap_or_default(), req.request_uri());
            redirect(w, &req, &location, StatusCode::FOUND);
            return;
        }

        self.handler.serve(req, w).await;
    }
}

/// Answers with a redirect to `location`.
///
/// GET and HEAD get an html content type, and GET a short html body linking to the target.
pub fn redirect(w: &mut dyn ResponseWriter, req: &Request, location: &str, status: StatusCode) {
    match header_value(location) {
        Some(value) => {
            w.headers_mut().insert(header::LOCATION, value);
        }
        None => debug!(location, "redirect target is not a valid header value"),
    }

    let method = req.method();
    let html = method == Method::GET || method == Method::HEAD;
    if html && let Ok(value) = HeaderValue::from_str(mime::TEXT_HTML_UTF_8.as_ref()) {
        w.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    w.write_header(status);

    if method == Method::GET {
        let reason = status.canonical_reason().unwrap_or_default();
        let body = format!("<a href=\"{}\">{reason}</a>.\n", html_escape(location));
        if let Err(e) = write_all(w, body.as_bytes()) {
            trace!(cause = %e, "failed to write redirect body");
        }
    }
}

/// Lexically cleans a slash separated path, keeping one trailing slash if `path` had one.
///
/// Runs of slashes collapse, `.` elements go away, and each `..` removes the element before it
/// (or nothing, at the root).
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            part => parts.push(part),
        }
    }

    let joined = parts.join("/");
    let mut cleaned = match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    };

    if path.ends_with('/') && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_util::{request, request_with_headers};
    use crate::writer::Recorder;

    struct Ok200;

    #[async_trait]
    impl Handler for Ok200 {
        async fn serve(&self, _req: Request, w: &mut dyn ResponseWriter) {
            write_all(w, b"ok").unwrap();
        }
    }

    async fn trailing(method: &str, uri: &str) -> Recorder {
        let mut recorder = Recorder::new();
        trailing_slash_redirect(Ok200).serve(request(method, uri), &mut recorder).await;
        recorder
    }

    #[tokio::test]
    async fn strips_one_trailing_slash() {
        let recorder = trailing("GET", "/a/").await;
        assert_eq!(recorder.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(recorder.header(header::LOCATION), Some("/a"));
        assert_eq!(recorder.header(header::CONTENT_TYPE), Some("text/html; charset=utf-8"));
        assert_eq!(recorder.body(), b"<a href=\"/a\">Moved Permanently</a>.\n");
    }

    #[tokio::test]
    async fn collapses_repeated_slashes() {
        let recorder = trailing("GET", "/a//////").await;
        assert_eq!(recorder.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(recorder.header(header::LOCATION), Some("/a/"));
    }

    #[tokio::test]
    async fn keeps_the_query() {
        let recorder = trailing("GET", "/search/?q=a&b=c").await;
        assert_eq!(recorder.header(header::LOCATION), Some("/search?q=a&b=c"));
        assert_eq!(recorder.body(), b"<a href=\"/search?q=a&amp;b=c\">Moved Permanently</a>.\n");
    }

    #[tokio::test]
    async fn only_get_gets_a_body() {
        let recorder = trailing("HEAD", "/a/").await;
        assert_eq!(recorder.header(header::CONTENT_TYPE), Some("text/html; charset=utf-8"));
        assert!(recorder.body().is_empty());

        let recorder = trailing("POST", "/a/").await;
        assert_eq!(recorder.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(recorder.header(header::CONTENT_TYPE), None);
        assert!(recorder.body().is_empty());
    }

    #[tokio::test]
    async fn passes_through_other_paths() {
        for uri in ["/a", "/"] {
            let recorder = trailing("GET", uri).await;
            assert_eq!(recorder.status(), StatusCode::OK);
            assert_eq!(recorder.body(), b"ok");
        }
    }

    #[tokio::test]
    async fn redirects_plain_http_to_https() {
        let req = request_with_headers(
            "GET",
            "/path?x=1",
            &[("host", "example.com"), ("x-forwarded-proto", "http")],
        );
        let mut recorder = Recorder::new();
        redirect_proto(Ok200).serve(req, &mut recorder).await;

        assert_eq!(recorder.status(), StatusCode::FOUND);
        assert_eq!(recorder.header(header::LOCATION), Some("https://example.com/path?x=1"));
    }

    #[tokio::test]
    async fn https_passes_through() {
        let req = request_with_headers("GET", "/", &[("host", "example.com"), ("x-forwarded-proto", "https")]);
        let mut recorder = Recorder::new();
        redirect_proto(Ok200).serve(req, &mut recorder).await;
        assert_eq!(recorder.status(), StatusCode::OK);

        let mut recorder = Recorder::new();
        redirect_proto(Ok200).serve(request("GET", "/"), &mut recorder).await;
        assert_eq!(recorder.body(), b"ok");
    }

    #[test]
    fn cleans_like_path_clean() {
        let cases = [
            ("", "."),
            ("/", "/"),
            ("/a", "/a"),
            ("/a//////", "/a/"),
            ("a/b/../c", "a/c"),
            ("/../a", "/a"),
            ("../../a", "../../a"),
            ("/a/./b/", "/a/b/"),
            ("/a/b/..", "/a"),
            ("a/..", "."),
        ];
        for (input, expected) in cases {
            assert_eq!(clean_path(input), expected, "clean_path({input:?})");
        }
    }
}
