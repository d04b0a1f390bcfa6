pub mod admin;
pub mod auth;
pub mod common;
pub mod health;
pub mod student;
pub mod teacher;

pub use health::health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Every HTTP route of the service. Everything except `/health` and the public
/// auth endpoints requires a token; area prefixes are role-guarded.
pub fn router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/otp", post(auth::request_otp))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).put(auth::update_me))
        .route("/password", put(auth::change_password));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route("/users/:user_id", get(admin::get_user).delete(admin::delete_user))
        .route("/users/:user_id/role", put(admin::update_user_role))
        .route("/rooms", get(admin::list_rooms).post(admin::create_room))
        .route(
            "/rooms/:room_id",
            get(admin::get_room)
                .put(admin::update_room)
                .delete(admin::delete_room),
        )
        .route("/rooms/:room_id/students", get(admin::list_room_students))
        .route("/subjects", get(admin::list_subjects).post(admin::create_subject))
        .route(
            "/subjects/:subject_id",
            put(admin::update_subject).delete(admin::delete_subject),
        )
        .route(
            "/students/:user_id",
            get(admin::get_student).put(admin::upsert_student),
        )
        .route("/students/:user_id/room", put(admin::assign_room))
        .route("/pool", get(admin::pool_stats))
        .route_layer(middleware::from_fn(auth::middleware::require_admin));

    let teacher_routes = Router::new()
        .route("/subjects", get(teacher::my_subjects))
        .route("/subjects/:subject_id/students", get(teacher::subject_roster))
        .route(
            "/subjects/:subject_id/attendance",
            get(teacher::list_attendance).post(teacher::record_attendance),
        )
        .route(
            "/subjects/:subject_id/grades",
            get(teacher::list_grades).put(teacher::upsert_grades),
        )
        .route("/subjects/:subject_id/grades/import", post(teacher::import_grades))
        .route("/subjects/:subject_id/grades/export", post(teacher::export_grades))
        .route("/rooms/:room_id/attendance", get(teacher::room_attendance_report))
        .route(
            "/students/:student_id/health",
            get(teacher::list_health_records).post(teacher::create_health_record),
        )
        .route("/students/:student_id/visits", get(teacher::list_student_visits))
        .route("/students/:student_id/report", get(teacher::student_report))
        .route("/visits", get(teacher::my_visits).post(teacher::create_visit))
        .route_layer(middleware::from_fn(auth::middleware::require_teacher));

    let student_routes = Router::new()
        .route("/profile", get(student::my_profile))
        .route("/subjects", get(student::my_subjects))
        .route("/grades", get(student::my_grades))
        .route("/attendance", get(student::my_attendance))
        .route("/health", get(student::my_health_records))
        .route_layer(middleware::from_fn(auth::middleware::require_student));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes)
        .nest("/teacher", teacher_routes)
        .nest("/student", student_routes);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        // Applied outside the nest so the middleware sees full paths
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::authenticate_middleware,
        ))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::api::auth::helpers::create_access_token;
    use crate::api::auth::otp::MockOtpSender;
    use crate::api::common::ErrorResponse;
    use crate::config::AppConfig;
    use crate::db::Role;
    use crate::Database;

    /// State whose database points at a closed port, so every query fails fast.
    fn state(sender: MockOtpSender) -> Arc<AppState> {
        let vars = [
            ("DB_HOST", "127.0.0.1"),
            ("DB_PORT", "1"),
            ("DB_CONNECTION_TIMEOUT_MS", "2000"),
            ("DB_QUERY_RETRIES", "0"),
            ("JWT_SECRET", "router-secret"),
        ];
        let config = AppConfig::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        let db = Database::connect(&config.database, config.pool.clone()).unwrap();
        Arc::new(AppState::new(db, config, Arc::new(sender)))
    }

    fn token(state: &AppState, role: Role) -> String {
        create_access_token(&state.config.auth, &Uuid::new_v4(), role).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Option<ErrorResponse>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).ok())
    }

    fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_unavailable_without_database() {
        let state = state(MockOtpSender::new());
        let (status, _) = send(router(state), get("/health", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn protected_route_requires_token() {
        let state = state(MockOtpSender::new());
        let (status, body) = send(router(state), get("/api/auth/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.unwrap().error_type, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let state = state(MockOtpSender::new());
        let (status, _) = send(router(state), get("/api/auth/me", Some("not-a-jwt"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn role_guards_reject_other_roles() {
        let state = state(MockOtpSender::new());
        let student = token(&state, Role::Student);
        let teacher = token(&state, Role::Teacher);

        let cases = [
            ("/api/admin/users", &student),
            ("/api/admin/users", &teacher),
            ("/api/teacher/subjects", &student),
            ("/api/student/profile", &teacher),
        ];
        for (uri, token) in cases {
            let (status, body) = send(router(state.clone()), get(uri, Some(token))).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
            assert_eq!(body.unwrap().error_type, "FORBIDDEN");
        }
    }

    #[tokio::test]
    async fn admin_passes_teacher_guard() {
        let state = state(MockOtpSender::new());
        let admin = token(&state, Role::Admin);
        // Guard lets the request through; the handler then fails on the database
        let (status, _) = send(router(state), get("/api/teacher/subjects", Some(&admin))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn cookie_token_is_accepted() {
        let state = state(MockOtpSender::new());
        let student = token(&state, Role::Student);
        let request = Request::builder()
            .uri("/api/admin/users")
            .header(header::COOKIE, format!("auth_token={}", student))
            .body(Body::empty())
            .unwrap();
        // Authenticated as a student, so the admin guard answers rather than the token check
        let (status, _) = send(router(state), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn otp_request_with_bad_email_sends_nothing() {
        let mut sender = MockOtpSender::new();
        sender.expect_send().times(0);
        let state = state(sender);

        let (status, body) = send(
            router(state),
            post_json("/api/auth/otp", r#"{"email":"not-an-email"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.unwrap().error_type, "BAD_REQUEST");
    }

    #[tokio::test]
    async fn otp_request_fails_before_sending_when_database_is_down() {
        let mut sender = MockOtpSender::new();
        sender.expect_send().times(0);
        let state = state(sender);

        let (status, _) = send(
            router(state.clone()),
            post_json("/api/auth/otp", r#"{"email":"new@school.test"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.otp.pending(), 0);
    }
}
