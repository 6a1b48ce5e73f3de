//! Protected views of the school manager and who may open them.

use school_manager_access::{ProtectedRoute, Role};

/// Returns the declared protected views.
#[must_use]
pub fn declared_routes() -> Vec<ProtectedRoute> {
    let staff = [Role::Teacher, Role::Admin];
    vec![
        ProtectedRoute::authenticated("/dashboard"),
        ProtectedRoute::authenticated("/profile"),
        ProtectedRoute::for_roles("/admin", &[Role::Admin]),
        ProtectedRoute::for_roles("/teacher", &staff),
        ProtectedRoute::for_roles("/teacher/grades", &staff),
        ProtectedRoute::for_roles("/teacher/classes", &staff),
        ProtectedRoute::for_roles("/student", &[Role::Student]),
        ProtectedRoute::for_roles("/student/grades", &[Role::Student]),
        ProtectedRoute::for_roles("/student/progress", &[Role::Student]),
    ]
}

/// Finds the route for a requested path, ignoring any query string and
/// trailing slash.
#[must_use]
pub fn find_route<'a>(routes: &'a [ProtectedRoute], requested: &str) -> Option<&'a ProtectedRoute> {
    let path = requested.split(['?', '#']).next().unwrap_or_default();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    routes.iter().find(|route| route.path == path)
}

/// Renders a route's allow list for display.
#[must_use]
pub fn describe_roles(route: &ProtectedRoute) -> String {
    if route.allowed_roles.is_empty() {
        return "any signed-in user".to_string();
    }
    route
        .allowed_roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
