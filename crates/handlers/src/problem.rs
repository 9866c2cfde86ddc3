//! JSON error bodies for the responses this crate produces on its own.
//!
//! Every body carries a human readable `title` and a machine readable `id`, plus optional
//! `detail`, `instance` (the request path) and `status`.

use crate::request::Request;
use crate::writer::{ResponseWriter, write_all};
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use tracing::trace;

const JSON_UTF_8: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub title: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Problem {
    pub fn new(title: impl Into<String>, id: impl Into<String>) -> Self {
        Self { title: title.into(), id: id.into(), detail: None, instance: None, status: None }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Writes the problem as the whole response, with `status`.
    pub fn write_to(mut self, w: &mut dyn ResponseWriter, status: StatusCode) {
        self.status = Some(status.as_u16());
        w.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_UTF_8));
        w.write_header(status);

        match serde_json::to_vec(&self) {
            Ok(mut body) => {
                body.push(b'\n');
                if let Err(e) = write_all(w, &body) {
                    trace!(cause = %e, id = %self.id, "failed to write problem body");
                }
            }
            Err(e) => trace!(cause = %e, id = %self.id, "failed to serialize problem"),
        }
    }
}

/// 401 with a `WWW-Authenticate: Basic` challenge for `realm`.
pub fn unauthorized(w: &mut dyn ResponseWriter, realm: &str) {
    let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "\\\""));
    match HeaderValue::from_str(&challenge) {
        Ok(value) => {
            w.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        Err(_) => {
            w.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        }
    }

    Problem::new("Unauthorized. Please include your API credentials", "unauthorized")
        .write_to(w, StatusCode::UNAUTHORIZED);
}

pub fn forbidden(w: &mut dyn ResponseWriter, problem: Problem) {
    problem.write_to(w, StatusCode::FORBIDDEN);
}

pub fn not_found(w: &mut dyn ResponseWriter, req: &Request) {
    Problem::new("Resource not found", "not_found").with_instance(req.path()).write_to(w, StatusCode::NOT_FOUND);
}

pub fn method_not_allowed(w: &mut dyn ResponseWriter, req: &Request) {
    Problem::new("Method not allowed", "method_not_allowed")
        .with_instance(req.path())
        .write_to(w, StatusCode::METHOD_NOT_ALLOWED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_util::request;
    use crate::writer::Recorder;
    use serde_json::{Value, json};

    fn body_json(recorder: &Recorder) -> Value {
        serde_json::from_slice(recorder.body()).unwrap()
    }

    #[test]
    fn unauthorized_challenges_the_realm() {
        let mut recorder = Recorder::new();
        unauthorized(&mut recorder, "api");

        assert_eq!(recorder.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(recorder.header(header::WWW_AUTHENTICATE), Some("Basic realm=\"api\""));
        assert_eq!(recorder.header(header::CONTENT_TYPE), Some(JSON_UTF_8));
        assert_eq!(
            body_json(&recorder),
            json!({"title": "Unauthorized. Please include your API credentials", "id": "unauthorized", "status": 401})
        );
    }

    #[test]
    fn not_found_names_the_path() {
        let mut recorder = Recorder::new();
        not_found(&mut recorder, &request("GET", "/missing?x=1"));

        assert_eq!(recorder.status(), StatusCode::NOT_FOUND);
        let body = body_json(&recorder);
        assert_eq!(body["id"], "not_found");
        assert_eq!(body["instance"], "/missing");
    }

    #[test]
    fn method_not_allowed_is_405() {
        let mut recorder = Recorder::new();
        method_not_allowed(&mut recorder, &request("PATCH", "/v1"));

        assert_eq!(recorder.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(&recorder)["id"], "method_not_allowed");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let mut recorder = Recorder::new();
        forbidden(&mut recorder, Problem::new("nope", "forbidden").with_detail("try again"));

        assert_eq!(recorder.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(&recorder), json!({"title": "nope", "id": "forbidden", "detail": "try again", "status": 403}));
    }
}
