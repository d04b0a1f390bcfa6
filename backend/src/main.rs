use axum::http::{header, HeaderValue, Method};
use sqlx::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use school_backend::api::{self, auth::LogOtpSender};
use school_backend::config::AppConfig;
use school_backend::db::core::PgManager;
use school_backend::{AppState, Database};

/// School Management API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "School Management API",
        version = "1.0.0",
        description = "Rooms, subjects, attendance, grades and student welfare records"
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    paths(
        // Health
        api::health::health,
        // Auth
        api::auth::handlers::request_otp,
        api::auth::handlers::register,
        api::auth::handlers::login,
        api::auth::handlers::logout,
        api::auth::handlers::me,
        api::auth::handlers::update_me,
        api::auth::handlers::change_password,
        // Admin
        api::admin::handlers::list_users,
        api::admin::handlers::create_user,
        api::admin::handlers::get_user,
        api::admin::handlers::update_user_role,
        api::admin::handlers::delete_user,
        api::admin::handlers::list_rooms,
        api::admin::handlers::create_room,
        api::admin::handlers::get_room,
        api::admin::handlers::update_room,
        api::admin::handlers::delete_room,
        api::admin::handlers::list_room_students,
        api::admin::handlers::list_subjects,
        api::admin::handlers::create_subject,
        api::admin::handlers::update_subject,
        api::admin::handlers::delete_subject,
        api::admin::handlers::get_student,
        api::admin::handlers::upsert_student,
        api::admin::handlers::assign_room,
        api::admin::handlers::pool_stats,
        // Teacher
        api::teacher::handlers::my_subjects,
        api::teacher::handlers::subject_roster,
        api::teacher::handlers::record_attendance,
        api::teacher::handlers::list_attendance,
        api::teacher::handlers::room_attendance_report,
        api::teacher::handlers::list_grades,
        api::teacher::handlers::upsert_grades,
        api::teacher::handlers::import_grades,
        api::teacher::handlers::export_grades,
        api::teacher::handlers::list_health_records,
        api::teacher::handlers::create_health_record,
        api::teacher::handlers::list_student_visits,
        api::teacher::handlers::my_visits,
        api::teacher::handlers::create_visit,
        api::teacher::handlers::student_report,
        // Student
        api::student::handlers::my_profile,
        api::student::handlers::my_subjects,
        api::student::handlers::my_grades,
        api::student::handlers::my_attendance,
        api::student::handlers::my_health_records,
    ),
    components(
        schemas(
            // Common
            api::common::ErrorResponse,
            // Auth
            api::auth::handlers::OtpRequest,
            api::auth::handlers::OtpResponse,
            api::auth::handlers::RegisterRequest,
            api::auth::handlers::LoginRequest,
            api::auth::handlers::AuthResponse,
            api::auth::handlers::MessageResponse,
            api::auth::handlers::UpdateProfileRequest,
            api::auth::handlers::ChangePasswordRequest,
            // Admin
            api::admin::handlers::CreateUserRequest,
            api::admin::handlers::UpdateRoleRequest,
            api::admin::handlers::AssignRoomRequest,
            // Teacher
            api::teacher::handlers::RecordAttendanceRequest,
            api::teacher::handlers::UpsertGradesRequest,
            api::teacher::handlers::CountResponse,
            api::teacher::handlers::SheetRangeRequest,
            api::teacher::handlers::ImportGradesResponse,
            api::teacher::handlers::ExportGradesResponse,
            api::teacher::handlers::StudentReport,
            // Student
            api::student::handlers::MyGradesResponse,
            // Records
            school_backend::db::Role,
            school_backend::db::User,
            school_backend::db::Room,
            school_backend::db::RoomInput,
            school_backend::db::StudentProfile,
            school_backend::db::StudentProfileInput,
            school_backend::db::Subject,
            school_backend::db::SubjectInput,
            school_backend::db::AttendanceStatus,
            school_backend::db::AttendanceEntry,
            school_backend::db::AttendanceRecord,
            school_backend::db::AttendanceSummary,
            school_backend::db::RoomAttendanceRow,
            school_backend::db::Grade,
            school_backend::db::GradeEntry,
            school_backend::db::StudentGrade,
            school_backend::db::HealthRecord,
            school_backend::db::HealthRecordInput,
            school_backend::db::HomeVisit,
            school_backend::db::HomeVisitInput,
            school_backend::sheets::SkippedRow,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Registration, sign-in and the current user"),
        (name = "Admin", description = "Users, rooms, subjects and student profiles"),
        (name = "Teacher", description = "Attendance, grades, health records and home visits"),
        (name = "Student", description = "A student's own records"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
            components.add_security_scheme(
                "cookie_auth",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Cookie(
                        utoipa::openapi::security::ApiKeyValue::new("auth_token"),
                    ),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AppConfig::from_env()?;

    // Run migrations on a dedicated connection before the pool opens
    let manager = PgManager::new(&config.database, config.pool.statement_timeout.as_millis() as u64)?;
    let mut migration_conn = manager.connect_raw().await?;
    sqlx::migrate!("./migrations").run(&mut migration_conn).await?;
    migration_conn.close().await?;
    tracing::info!("Migrations complete");

    let db = Database::connect(&config.database, config.pool.clone())?;
    db.core().warm_up().await;
    db.core().spawn_monitor();
    db.core().spawn_reaper();

    tracing::info!(
        max = config.pool.max,
        min = config.pool.min,
        query_timeout_ms = config.pool.query_timeout.as_millis() as u64,
        retries = config.pool.max_retries,
        "Database pool ready"
    );

    let otp_sender = Arc::new(LogOtpSender::new(!config.env.is_production()));
    let state = Arc::new(AppState::new(db.clone(), config.clone(), otp_sender));

    if state.sheets.is_none() {
        tracing::info!("GOOGLE_SHEETS_ACCESS_TOKEN not set; sheet import/export disabled");
    }

    // Background task to drop expired one-time codes
    let otp_state = state.clone();
    let otp_token = db.core().coordinator().token();
    let otp_purge = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = otp_token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    let purged = otp_state.otp.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired one-time codes");
                    }
                }
            }
        }
    });
    db.core().coordinator().track(otp_purge);

    let app = api::router(state)
        // OpenAPI documentation
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(config.cors_origin.as_deref()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("School backend listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("HTTP server stopped; shutting down database");
    db.shutdown().await;

    served?;
    Ok(())
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .expose_headers([header::CONTENT_TYPE]);

    let origin = origin.unwrap_or("http://localhost:5173");
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS_ORIGIN {:?}: {}", origin, e);
            layer
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
