//! End-to-end tests driving the full router, session layer included.
use std::path::Path;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use sqlx::SqlitePool;
use tower::ServiceExt;
use tower_sessions_sqlx_store::SqliteStore;

use crate::auth::oauth::OAuthCredentials;
use crate::auth::{OAuthClient, OAuthClients, StateTokenService};
use crate::config::SessionConfig;
use crate::db::{DbService, OAuthProvider};
use crate::web::{self, AppState};

async fn app(pool: SqlitePool, oauth: OAuthClients) -> Router {
    let store = SqliteStore::new(pool.clone());
    store.migrate().await.unwrap();

    let state = AppState {
        db_service: DbService { pool },
        oauth,
        state_tokens: StateTokenService::new("test-secret"),
    };
    let sessions = web::session_layer(store, &SessionConfig::default());

    web::router(
        state,
        sessions,
        Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/public")),
    )
}

fn github_clients() -> OAuthClients {
    let credentials = OAuthCredentials {
        client_id: "client-123".to_owned(),
        client_secret: "secret".to_owned(),
        callback_url: "http://localhost:3000/auth/github/callback".to_owned(),
    };
    OAuthClients::default().with(OAuthClient::new(OAuthProvider::Github, &credentials).unwrap())
}

/// A browser: keeps the session cookie between requests.
struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    async fn send(&mut self, mut request: Request<Body>) -> Response {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.app.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap().to_owned();
            let cleared = pair.split_once('=').is_none_or(|(_, value)| value.is_empty());
            self.cookie = if cleared { None } else { Some(pair) };
        }

        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let body = fields
            .iter()
            .map(|(key, value)| format!("{key}={}", value.replace(' ', "+")))
            .collect::<Vec<_>>()
            .join("&");

        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Follow a redirect and return the body of the page it leads to.
    async fn follow(&mut self, response: Response) -> String {
        let location = location(&response);
        let response = self.get(&location).await;
        let response = if response.status().is_redirection() {
            let location = location_of(&response);
            self.get(&location).await
        } else {
            response
        };
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await
    }

    async fn register(&mut self, username: &str, email: &str, password: &str) -> Response {
        self.post(
            "/auth/register",
            &[
                ("username", username),
                ("email", email),
                ("password", password),
                ("password2", password),
                ("full_name", ""),
            ],
        )
        .await
    }

    async fn login(&mut self, username: &str, password: &str) -> Response {
        self.post("/auth/login", &[("username", username), ("password", password)])
            .await
    }

    async fn signed_in(app: Router, username: &str, password: &str) -> Self {
        let mut browser = Browser::new(app);
        browser
            .register(username, &format!("{username}@example.com"), password)
            .await;
        let response = browser.login(username, password).await;
        assert_eq!(location(&response), "/events");
        browser
    }
}

fn location_of(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("response should be a redirect")
        .to_str()
        .unwrap()
        .to_owned()
}

fn location(response: &Response) -> String {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    location_of(response)
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn user_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM Users")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_register_and_log_in(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool.clone(), OAuthClients::default()).await);

    let response = browser.register("Alice", "Alice@Example.com", "secret1").await;
    assert_eq!(location(&response), "/auth/login");
    let page = browser.follow(response).await;
    assert!(page.contains("Registration successful! Please log in."));

    let db = DbService { pool: pool.clone() };
    let alice = db.find_user_by_username("alice").await.unwrap().unwrap();
    assert_eq!(alice.email, "alice@example.com");
    assert!(alice.is_local());
    assert_ne!(alice.password_hash.as_deref(), Some("secret1"));

    let response = browser.login("ALICE ", "secret1").await;
    assert_eq!(location(&response), "/events");
    let page = browser.follow(response).await;
    assert!(page.contains("Welcome back!"));
    assert!(page.contains("Log out"));

    // Flash messages are shown once
    let page = body_text(browser.get("/events").await).await;
    assert!(!page.contains("Welcome back!"));
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_register_rejects_invalid_input(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool.clone(), OAuthClients::default()).await);

    let response = browser
        .post(
            "/auth/register",
            &[
                ("username", "alice"),
                ("email", "alice@example.com"),
                ("password", "secret1"),
                ("password2", "secret2"),
            ],
        )
        .await;
    assert_eq!(location(&response), "/auth/register");
    assert!(browser.follow(response).await.contains("Passwords do not match"));
    assert_eq!(user_count(&pool).await, 0);

    let response = browser.register("al", "al@example.com", "secret1").await;
    assert!(browser
        .follow(response)
        .await
        .contains("Username must be at least 3 characters long"));

    let response = browser.register("alice", "not-an-email", "secret1").await;
    assert!(browser
        .follow(response)
        .await
        .contains("Please enter a valid email address"));

    let response = browser.register("alice", "alice@example.com", "12345").await;
    assert!(browser
        .follow(response)
        .await
        .contains("Password must be at least 6 characters long"));

    assert_eq!(user_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_register_rejects_duplicates(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool.clone(), OAuthClients::default()).await);
    browser.register("alice", "alice@example.com", "secret1").await;

    let response = browser.register("Alice", "other@example.com", "secret1").await;
    assert_eq!(location(&response), "/auth/register");
    assert!(browser.follow(response).await.contains("Username already taken"));

    let response = browser.register("alice2", "ALICE@example.com", "secret1").await;
    assert!(browser.follow(response).await.contains("Email already registered"));

    assert_eq!(user_count(&pool).await, 1);
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_missing_form_fields_are_flashed(pool: SqlitePool) {
    let app = app(pool.clone(), OAuthClients::default()).await;

    let mut visitor = Browser::new(app.clone());
    let response = visitor
        .post(
            "/auth/register",
            &[("username", "alice"), ("email", "alice@example.com"), ("password", "secret1")],
        )
        .await;
    assert_eq!(location(&response), "/auth/register");
    assert!(visitor.follow(response).await.contains("Passwords do not match"));
    assert_eq!(user_count(&pool).await, 0);

    let response = visitor.post("/auth/login", &[("username", "alice")]).await;
    assert_eq!(location(&response), "/auth/login");
    assert!(visitor.follow(response).await.contains("Invalid username or password"));

    let mut alice = Browser::signed_in(app, "alice", "secret1").await;
    let response = alice
        .post("/events/create", &[("title", "Party"), ("date", "2025-07-01")])
        .await;
    assert_eq!(location(&response), "/events/create");
    assert!(alice.follow(response).await.contains("Event location is required"));

    let response = alice
        .post("/users/change-password", &[("current_password", "secret1")])
        .await;
    assert_eq!(location(&response), "/users/change-password");
    assert!(alice
        .follow(response)
        .await
        .contains("New password must be at least 6 characters long"));
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_login_issues_new_session_id(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool, OAuthClients::default()).await);
    browser.register("alice", "alice@example.com", "secret1").await;
    let before = browser.cookie.clone().expect("registration stores a flash in the session");

    let response = browser.login("alice", "secret1").await;
    assert_eq!(location(&response), "/events");
    let after = browser.cookie.clone().unwrap();
    assert_ne!(before, after);

    // The old id no longer carries the sign-in
    let mut stolen = Browser::new(browser.app.clone());
    stolen.cookie = Some(before);
    let response = stolen.get("/events/create").await;
    assert_eq!(location(&response), "/auth/login");
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_session_of_deleted_user_is_anonymous(pool: SqlitePool) {
    let mut alice =
        Browser::signed_in(app(pool.clone(), OAuthClients::default()).await, "alice", "secret1").await;

    sqlx::query("DELETE FROM Users WHERE username = ?")
        .bind("alice")
        .execute(&pool)
        .await
        .unwrap();

    let response = alice.get("/events/create").await;
    assert_eq!(location(&response), "/auth/login");

    // The stale id was removed, so guest pages render instead of bouncing to /events
    let response = alice.get("/auth/login").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Please log in to access this page"));
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_wrong_credentials_do_not_sign_in(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool, OAuthClients::default()).await);
    browser.register("alice", "alice@example.com", "secret1").await;

    for (username, password) in [("alice", "wrong-password"), ("nobody", "secret1")] {
        let response = browser.login(username, password).await;
        assert_eq!(location(&response), "/auth/login");
        assert!(browser.follow(response).await.contains("Invalid username or password"));
    }

    let response = browser.get("/events/create").await;
    assert_eq!(location(&response), "/auth/login");
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_guards_redirect(pool: SqlitePool) {
    let app = app(pool, OAuthClients::default()).await;

    let mut anonymous = Browser::new(app.clone());
    for uri in ["/events/create", "/events/edit/1", "/events/delete/1", "/users/change-password"] {
        let response = anonymous.get(uri).await;
        assert_eq!(location(&response), "/auth/login", "{uri}");
    }
    let response = anonymous.get("/events/create").await;
    assert!(anonymous.follow(response).await.contains("Please log in to access this page"));

    let response = anonymous.get("/").await;
    assert_eq!(location(&response), "/events");
    let response = anonymous.get("/events").await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut alice = Browser::signed_in(app, "alice", "secret1").await;
    for uri in ["/auth/login", "/auth/register"] {
        let response = alice.get(uri).await;
        assert_eq!(location(&response), "/events", "{uri}");
    }
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_logout(pool: SqlitePool) {
    let mut alice = Browser::signed_in(app(pool, OAuthClients::default()).await, "alice", "secret1").await;

    let response = alice.get("/auth/logout").await;
    assert_eq!(location(&response), "/");
    let page = alice.follow(response).await;
    assert!(page.contains("You have been logged out"));
    assert!(page.contains("Log in"));

    let response = alice.get("/events/create").await;
    assert_eq!(location(&response), "/auth/login");
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_event_lifecycle(pool: SqlitePool) {
    let mut alice =
        Browser::signed_in(app(pool.clone(), OAuthClients::default()).await, "alice", "secret1").await;

    let response = alice
        .post(
            "/events/create",
            &[
                ("title", "Summer Party"),
                ("date", "2025-07-01"),
                ("location", "Rooftop"),
                ("description", "Bring snacks"),
            ],
        )
        .await;
    assert_eq!(location(&response), "/events");
    assert!(alice.follow(response).await.contains("Event created successfully"));

    alice
        .post(
            "/events/create",
            &[("title", "Spring Meetup"), ("date", "2025-03-10"), ("location", "Library")],
        )
        .await;

    let page = body_text(alice.get("/events").await).await;
    let spring = page.find("Spring Meetup").unwrap();
    let summer = page.find("Summer Party").unwrap();
    assert!(spring < summer, "events should be listed by date");
    assert!(page.contains("Mon, 10 Mar 2025"));

    let db = DbService { pool };
    let party = db
        .list_events()
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.title == "Summer Party")
        .unwrap();

    let edit_uri = format!("/events/edit/{}", party.id);
    let page = body_text(alice.get(&edit_uri).await).await;
    assert!(page.contains("value=\"2025-07-01\""));

    let response = alice
        .post(
            &edit_uri,
            &[("title", "Summer Bash"), ("date", "2025-07-02"), ("location", "Rooftop")],
        )
        .await;
    assert!(alice.follow(response).await.contains("Event updated successfully"));
    let updated = db.get_event(party.id).await.unwrap().unwrap();
    assert_eq!(updated.title, "Summer Bash");
    assert_eq!(updated.description, "");

    let delete_uri = format!("/events/delete/{}", party.id);
    let page = body_text(alice.get(&delete_uri).await).await;
    assert!(page.contains("Summer Bash"));

    let response = alice.post(&delete_uri, &[]).await;
    assert!(alice.follow(response).await.contains("Event deleted successfully"));
    assert!(db.get_event(party.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_invalid_events_are_rejected(pool: SqlitePool) {
    let mut alice =
        Browser::signed_in(app(pool.clone(), OAuthClients::default()).await, "alice", "secret1").await;

    let response = alice
        .post(
            "/events/create",
            &[("title", "  "), ("date", "2025-07-01"), ("location", "Rooftop")],
        )
        .await;
    assert_eq!(location(&response), "/events/create");
    assert!(alice.follow(response).await.contains("Event title is required"));

    let response = alice
        .post(
            "/events/create",
            &[("title", "Party"), ("date", "next tuesday"), ("location", "Rooftop")],
        )
        .await;
    assert!(alice.follow(response).await.contains("Event date must be a valid date"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_missing_events_are_not_found(pool: SqlitePool) {
    let mut alice = Browser::signed_in(app(pool, OAuthClients::default()).await, "alice", "secret1").await;

    for uri in ["/events/edit/999", "/events/edit/abc", "/events/delete/999", "/events/delete/abc"] {
        let response = alice.get(uri).await;
        assert_eq!(location(&response), "/events", "{uri}");
        assert!(alice.follow(response).await.contains("Event not found"), "{uri}");
    }

    let response = alice
        .post(
            "/events/edit/999",
            &[("title", "Party"), ("date", "2025-07-01"), ("location", "Rooftop")],
        )
        .await;
    assert!(alice.follow(response).await.contains("Event not found"));

    let response = alice.post("/events/delete/999", &[]).await;
    assert!(alice.follow(response).await.contains("Event not found"));
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_change_password(pool: SqlitePool) {
    let app = app(pool, OAuthClients::default()).await;
    let mut alice = Browser::signed_in(app.clone(), "alice", "secret1").await;

    let attempts = [
        ("wrong-password", "newsecret", "newsecret", "Current password is incorrect"),
        ("secret1", "newsecret", "different", "New passwords do not match"),
        ("secret1", "short", "short", "New password must be at least 6 characters long"),
        ("secret1", "secret1", "secret1", "New password must be different from current password"),
    ];
    for (current, new, confirm, message) in attempts {
        let response = alice
            .post(
                "/users/change-password",
                &[
                    ("current_password", current),
                    ("new_password", new),
                    ("confirm_password", confirm),
                ],
            )
            .await;
        assert_eq!(location(&response), "/users/change-password");
        assert!(alice.follow(response).await.contains(message), "{message}");
    }

    let response = alice
        .post(
            "/users/change-password",
            &[
                ("current_password", "secret1"),
                ("new_password", "newsecret"),
                ("confirm_password", "newsecret"),
            ],
        )
        .await;
    assert_eq!(location(&response), "/events");
    assert!(alice.follow(response).await.contains("Password changed successfully!"));

    let mut again = Browser::new(app);
    let response = again.login("alice", "secret1").await;
    assert_eq!(location(&response), "/auth/login");
    let response = again.login("alice", "newsecret").await;
    assert_eq!(location(&response), "/events");
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_linked_accounts_cannot_change_password(pool: SqlitePool) {
    let mut alice =
        Browser::signed_in(app(pool.clone(), OAuthClients::default()).await, "alice", "secret1").await;

    // Same state an email match leaves behind after a GitHub sign-in
    sqlx::query("UPDATE Users SET oauth_provider = 'github', oauth_id = '42' WHERE username = ?")
        .bind("alice")
        .execute(&pool)
        .await
        .unwrap();

    let response = alice.get("/users/change-password").await;
    assert_eq!(location(&response), "/events");
    assert!(alice.follow(response).await.contains(
        "Password change is only available for local accounts. You signed in with GitHub"
    ));
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_unconfigured_provider(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool, OAuthClients::default()).await);

    let response = browser.get("/auth/google").await;
    assert_eq!(location(&response), "/auth/login");
    assert!(browser.follow(response).await.contains("Google sign-in is not available"));

    let page = body_text(browser.get("/auth/login").await).await;
    assert!(!page.contains("/auth/google"));
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_oauth_state_is_bound_to_session(pool: SqlitePool) {
    let app = app(pool.clone(), github_clients()).await;

    let mut browser = Browser::new(app.clone());
    let response = browser.get("/auth/github").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let url = location_of(&response);
    assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
    let state = url
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("state="))
        .unwrap()
        .to_owned();

    // A callback arriving in another browser is refused before any code exchange
    let mut other = Browser::new(app);
    let response = other
        .get(&format!("/auth/github/callback?code=abc&state={state}"))
        .await;
    assert_eq!(location(&response), "/auth/login");
    assert!(other
        .follow(response)
        .await
        .contains("Your sign-in request expired. Please try again."));

    let response = browser
        .get("/auth/github/callback?error=access_denied")
        .await;
    assert_eq!(location(&response), "/auth/login");
    assert!(browser.follow(response).await.contains("Sign-in was cancelled"));

    assert_eq!(user_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./sql/migrations")]
async fn test_unknown_pages(pool: SqlitePool) {
    let mut browser = Browser::new(app(pool, OAuthClients::default()).await);

    let response = browser.get("/no/such/page").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Page not found"));

    let response = browser.get("/static/css/timely.css").await;
    assert_eq!(response.status(), StatusCode::OK);
}
