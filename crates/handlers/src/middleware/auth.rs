use crate::handler::Handler;
use crate::problem::{self, Problem};
use crate::request::Request;
use crate::writer::ResponseWriter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Lets a request through only with basic auth credentials matching one of `users`.
///
/// - no or malformed credentials, or an empty unknown user: 401 with a challenge for the realm
/// - a non-empty unknown user: 403 `forbidden`
/// - a known user with the wrong password: 403 `incorrect_password` naming the user
pub struct BasicAuth<H> {
    handler: H,
    realm: String,
    users: HashMap<String, String>,
}

impl<H: fmt::Debug> fmt::Debug for BasicAuth<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("handler", &self.handler)
            .field("realm", &self.realm)
            .field("users", &self.users.len())
            .finish()
    }
}

pub fn basic_auth<H, I, U, P>(handler: H, realm: impl Into<String>, users: I) -> BasicAuth<H>
where
    H: Handler,
    I: IntoIterator<Item = (U, P)>,
    U: Into<String>,
    P: Into<String>,
{
    let users = users.into_iter().map(|(user, password)| (user.into(), password.into())).collect();
    BasicAuth { handler, realm: realm.into(), users }
}

#[async_trait]
impl<H: Handler> Handler for BasicAuth<H> {
    async fn serve(&self, req: Request, w: &mut dyn ResponseWriter) {
        let Some((user, password)) = req.basic_auth() else {
            problem::unauthorized(w, &self.realm);
            return;
        };

        let Some(expected) = self.users.get(&user) else {
            if user.is_empty() {
                problem::unauthorized(w, &self.realm);
            } else {
                trace!(%user, "unknown user");
                problem::forbidden(
                    w,
                    Problem::new("Username or password are invalid. Please double check your credentials", "forbidden"),
                );
            }
            return;
        };

        if !constant_time_eq(password.as_bytes(), expected.as_bytes()) {
            trace!(%user, "incorrect password");
            problem::forbidden(
                w,
                Problem::new(format!("Incorrect password for user {user}"), "incorrect_password")
                    .with_instance(req.path()),
            );
            return;
        }

        self.handler.serve(req, w).await;
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in a.iter().zip(b) {
        result |= a ^ b;
    }
    result == 0
}
