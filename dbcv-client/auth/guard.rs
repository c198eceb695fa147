use crate::store::users::User;

pub const LOGIN_PATH: &str = "/login";
pub const DEFAULT_PATH: &str = "/channels";
pub const ADMIN_REQUIRED: &str = "Insufficient rights to access this page";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub path: &'static str,
    pub requires_auth: bool,
    pub requires_admin: bool,
}

impl Route {
    const fn new(name: &'static str, path: &'static str, requires_auth: bool) -> Self {
        Self {
            name,
            path,
            requires_auth,
            requires_admin: false,
        }
    }

    const fn admin(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            requires_auth: true,
            requires_admin: true,
        }
    }
}

pub static ROUTES: [Route; 8] = [
    Route::new("home", "/", true),
    Route::new("login", LOGIN_PATH, false),
    Route::new("channels", DEFAULT_PATH, true),
    Route::new("bot", "/bot/:id", true),
    Route::new("bots", "/bots", true),
    Route::new("widgets", "/widgets", true),
    Route::new("requests", "/requests", true),
    Route::admin("templates", "/templates"),
];

pub fn route(name: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.name == name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(String),
    /// Redirect and show `notice` to the user.
    Deny { redirect: String, notice: String },
}

/// Decide a navigation from `from_path` to `to`.
pub fn check(
    to: &Route,
    from_path: &str,
    authenticated: bool,
    current_user: Option<&User>,
) -> Navigation {
    if to.path == LOGIN_PATH && authenticated {
        return Navigation::Redirect(DEFAULT_PATH.to_string());
    }

    if to.requires_auth && !authenticated {
        return Navigation::Redirect(LOGIN_PATH.to_string());
    }

    if to.requires_admin && !current_user.is_some_and(User::is_admin) {
        let redirect = if from_path != "/" {
            from_path.to_string()
        } else {
            DEFAULT_PATH.to_string()
        };
        tracing::info!(route = to.name, %redirect, "admin route denied");
        return Navigation::Deny {
            redirect,
            notice: ADMIN_REQUIRED.to_string(),
        };
    }

    Navigation::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> User {
        serde_json::from_value(serde_json::json!({"id": "u", "role": role})).unwrap()
    }

    #[test]
    fn test_authenticated_user_skips_login_page() {
        let login = route("login").unwrap();
        assert_eq!(
            check(login, "/", true, None),
            Navigation::Redirect("/channels".into())
        );
        assert_eq!(check(login, "/", false, None), Navigation::Allow);
    }

    #[test]
    fn test_protected_route_requires_login() {
        let bots = route("bots").unwrap();
        assert_eq!(
            check(bots, "/", false, None),
            Navigation::Redirect("/login".into())
        );
        assert_eq!(check(bots, "/", true, None), Navigation::Allow);
    }

    #[test]
    fn test_admin_route_denies_non_admin_back_to_referrer() {
        let templates = route("templates").unwrap();
        let regular = user("USER");
        match check(templates, "/bots", true, Some(&regular)) {
            Navigation::Deny { redirect, notice } => {
                assert_eq!(redirect, "/bots");
                assert_eq!(notice, ADMIN_REQUIRED);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_admin_route_from_root_falls_back_to_default() {
        let templates = route("templates").unwrap();
        assert!(matches!(
            check(templates, "/", true, None),
            Navigation::Deny { redirect, .. } if redirect == "/channels"
        ));
    }

    #[test]
    fn test_admin_route_allows_admin() {
        let templates = route("templates").unwrap();
        let admin = user("ADMIN");
        assert_eq!(check(templates, "/", true, Some(&admin)), Navigation::Allow);
    }

    #[test]
    fn test_unauthenticated_admin_route_goes_to_login_first() {
        let templates = route("templates").unwrap();
        assert_eq!(
            check(templates, "/bots", false, None),
            Navigation::Redirect("/login".into())
        );
    }
}
