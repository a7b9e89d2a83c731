// Client-side screens and the navigation guard in front of them

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Login,
    Upload,
    Interview,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Upload => "/upload",
            Route::Interview => "/interview",
        }
    }

    /// Map a request path onto a screen. The root path lands on the login
    /// screen; unknown paths yield `None`.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" | "/login" => Some(Route::Login),
            "/upload" => Some(Route::Upload),
            "/interview" => Some(Route::Interview),
            _ => None,
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::Login)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where a visitor actually ends up when asking for `requested`.
///
/// Signed-out visitors are sent to the login screen; signed-in visitors
/// skip the login screen and go straight to the upload form.
pub fn resolve(requested: Route, authenticated: bool) -> Route {
    match (requested, authenticated) {
        (route, false) if route.requires_auth() => Route::Login,
        (Route::Login, true) => Route::Upload,
        (route, _) => route,
    }
}
