mod bookings;
mod db;
mod error;
mod models;
mod notifications;
mod payments;
mod reminders;
mod service_area;
mod validation;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bookings::{BookingService, BookingsRepository, CatalogRepository};
use error::ApiError;
use models::{CreateOffering, ServiceOffering, UpdateOffering, VehicleType};
use notifications::{MailgunNotifier, Notifier, NullNotifier};
use payments::{
    AuthorizationMode, PaymentService, PaymentsRepository, PaymentsStore, StripeGateway,
    WebhookContext, WebhookVerifier,
};
use reminders::ReminderScheduler;
use service_area::{NominatimGeocoder, ServiceArea};
use validator::Validate;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        create_offering,
        get_offerings,
        get_offering_by_id,
        update_offering,
        delete_offering,
        get_vehicle_types,
    ),
    components(
        schemas(ServiceOffering, CreateOffering, UpdateOffering, VehicleType)
    ),
    tags(
        (name = "catalog", description = "Service catalog management endpoints")
    ),
    info(
        title = "Detailing API",
        version = "1.0.0",
        description = "RESTful API for mobile detailing appointments and payments",
        contact(
            name = "API Support",
            email = "support@detailingapi.com"
        )
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
}

/// Handler for POST /api/offerings
/// Creates a new service offering
#[utoipa::path(
    post,
    path = "/api/offerings",
    request_body = CreateOffering,
    responses(
        (status = 201, description = "Offering created successfully", body = ServiceOffering),
        (status = 400, description = "Invalid input data", body = String, example = json!({"error": "Duration must be 15-480 minutes"})),
        (status = 409, description = "Offering name already exists", body = String),
        (status = 500, description = "Internal server error", body = String, example = json!({"error": "Database error"}))
    ),
    tag = "catalog"
)]
async fn create_offering(
    State(state): State<AppState>,
    Json(payload): Json<CreateOffering>,
) -> Result<(StatusCode, Json<ServiceOffering>), ApiError> {
    tracing::debug!("Creating offering: {}", payload.name);

    // Validate request
    payload.validate()?;

    // Duplicate names confuse the booking flow; reject them up front
    if db::check_duplicate_offering(&state.db, &payload.name).await? {
        return Err(ApiError::Conflict {
            message: format!("An offering named '{}' already exists", payload.name),
        });
    }

    let offering = sqlx::query_as::<_, ServiceOffering>(
        r#"
        INSERT INTO service_offerings
            (name, tier, description, price, deposit_amount, duration_minutes,
             display_order, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, name, tier, description, price, deposit_amount, duration_minutes,
                  display_order, is_active, created_at, updated_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.tier)
    .bind(&payload.description)
    .bind(payload.price)
    .bind(payload.deposit_amount)
    .bind(payload.duration_minutes)
    .bind(payload.display_order)
    .bind(payload.is_active)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("Successfully created offering with id: {}", offering.id);
    Ok((StatusCode::CREATED, Json(offering)))
}

/// Handler for GET /api/offerings
/// Retrieves all active offerings in display order
#[utoipa::path(
    get,
    path = "/api/offerings",
    responses(
        (status = 200, description = "List of active offerings", body = [ServiceOffering]),
        (status = 500, description = "Internal server error", body = String)
    ),
    tag = "catalog"
)]
async fn get_offerings(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceOffering>>, ApiError> {
    tracing::debug!("Fetching all active offerings");

    let offerings = sqlx::query_as::<_, ServiceOffering>(
        "SELECT id, name, tier, description, price, deposit_amount, duration_minutes, \
         display_order, is_active, created_at, updated_at \
         FROM service_offerings WHERE is_active = TRUE \
         ORDER BY display_order, id",
    )
    .fetch_all(&state.db)
    .await?;

    tracing::debug!("Found {} active offerings", offerings.len());
    Ok(Json(offerings))
}

/// Handler for GET /api/offerings/{id}
#[utoipa::path(
    get,
    path = "/api/offerings/{id}",
    params(
        ("id" = i32, Path, description = "Offering ID")
    ),
    responses(
        (status = 200, description = "Offering found", body = ServiceOffering),
        (status = 404, description = "Offering not found", body = String),
        (status = 500, description = "Internal server error", body = String)
    ),
    tag = "catalog"
)]
async fn get_offering_by_id(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ServiceOffering>, ApiError> {
    tracing::debug!("Fetching offering with id: {}", id);

    let offering = sqlx::query_as::<_, ServiceOffering>(
        "SELECT id, name, tier, description, price, deposit_amount, duration_minutes, \
         display_order, is_active, created_at, updated_at \
         FROM service_offerings WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound {
        resource: "Offering".to_string(),
        id: id.to_string(),
    })?;

    Ok(Json(offering))
}

/// Handler for PUT /api/offerings/{id}
/// Partially updates an offering; existing bookings keep their snapshots
#[utoipa::path(
    put,
    path = "/api/offerings/{id}",
    params(
        ("id" = i32, Path, description = "Offering ID")
    ),
    request_body = UpdateOffering,
    responses(
        (status = 200, description = "Offering updated successfully", body = ServiceOffering),
        (status = 400, description = "Invalid input data", body = String),
        (status = 404, description = "Offering not found", body = String),
        (status = 409, description = "Offering name already exists", body = String),
        (status = 500, description = "Internal server error", body = String)
    ),
    tag = "catalog"
)]
async fn update_offering(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOffering>,
) -> Result<Json<ServiceOffering>, ApiError> {
    tracing::debug!("Updating offering with id: {}", id);

    // Validate request
    payload.validate()?;

    if let Some(tier) = &payload.tier {
        if let Err(e) = crate::validation::validate_tier(tier) {
            let mut errors = validator::ValidationErrors::new();
            errors.add("tier", e);
            return Err(ApiError::ValidationError(errors));
        }
    }

    if let Some(name) = &payload.name {
        if db::check_duplicate_offering_excluding_id(&state.db, name, id).await? {
            return Err(ApiError::Conflict {
                message: format!("An offering named '{}' already exists", name),
            });
        }
    }

    let offering = sqlx::query_as::<_, ServiceOffering>(
        r#"
        UPDATE service_offerings
        SET name = COALESCE($2, name),
            tier = COALESCE($3, tier),
            description = COALESCE($4, description),
            price = COALESCE($5, price),
            deposit_amount = COALESCE($6, deposit_amount),
            duration_minutes = COALESCE($7, duration_minutes),
            display_order = COALESCE($8, display_order),
            is_active = COALESCE($9, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, tier, description, price, deposit_amount, duration_minutes,
                  display_order, is_active, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(payload.name)
    .bind(payload.tier)
    .bind(payload.description)
    .bind(payload.price)
    .bind(payload.deposit_amount)
    .bind(payload.duration_minutes)
    .bind(payload.display_order)
    .bind(payload.is_active)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound {
        resource: "Offering".to_string(),
        id: id.to_string(),
    })?;

    tracing::info!("Successfully updated offering with id: {}", id);
    Ok(Json(offering))
}

/// Handler for DELETE /api/offerings/{id}
/// Deletes an offering; offerings referenced by bookings must be
/// deactivated instead
#[utoipa::path(
    delete,
    path = "/api/offerings/{id}",
    params(
        ("id" = i32, Path, description = "Offering ID")
    ),
    responses(
        (status = 204, description = "Offering deleted successfully"),
        (status = 404, description = "Offering not found", body = String),
        (status = 409, description = "Offering is referenced by bookings", body = String),
        (status = 500, description = "Internal server error", body = String)
    ),
    tag = "catalog"
)]
async fn delete_offering(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    tracing::debug!("Deleting offering with id: {}", id);

    if db::offering_is_referenced(&state.db, id).await? {
        return Err(ApiError::Conflict {
            message: "Offering has bookings; set is_active to false instead of deleting"
                .to_string(),
        });
    }

    let result = sqlx::query("DELETE FROM service_offerings WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        tracing::debug!("Offering with id {} not found for deletion", id);
        return Err(ApiError::NotFound {
            resource: "Offering".to_string(),
            id: id.to_string(),
        });
    }

    tracing::info!("Successfully deleted offering with id: {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/vehicle-types
#[utoipa::path(
    get,
    path = "/api/vehicle-types",
    responses(
        (status = 200, description = "List of vehicle types", body = [VehicleType]),
        (status = 500, description = "Internal server error", body = String)
    ),
    tag = "catalog"
)]
async fn get_vehicle_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<VehicleType>>, ApiError> {
    let vehicle_types = sqlx::query_as::<_, VehicleType>(
        "SELECT id, name, price_multiplier, surcharge_note, display_order \
         FROM vehicle_types ORDER BY display_order, id",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(vehicle_types))
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS middleware
fn create_router(state: AppState, webhook_ctx: Arc<WebhookContext>) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The webhook endpoint authenticates by signature, not by state shared
    // with the rest of the API, so it carries its own router state.
    let webhook_routes = Router::new()
        .route("/api/webhooks/gateway", post(payments::gateway_webhook))
        .with_state(webhook_ctx);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Catalog routes
        .route("/api/offerings", post(create_offering))
        .route("/api/offerings", get(get_offerings))
        .route("/api/offerings/:id", get(get_offering_by_id))
        .route("/api/offerings/:id", put(update_offering))
        .route("/api/offerings/:id", delete(delete_offering))
        .route("/api/vehicle-types", get(get_vehicle_types))
        // Booking routes
        .route("/api/availability", get(bookings::availability_handler))
        .route("/api/bookings", post(bookings::create_booking_handler))
        .route("/api/bookings", get(bookings::list_bookings_handler))
        .route("/api/bookings/:id", get(bookings::get_booking_handler))
        .route("/api/bookings/:id/payment", get(bookings::get_booking_payment_handler))
        .route("/api/bookings/:id/confirm", post(bookings::confirm_booking_handler))
        .route("/api/bookings/:id/complete", post(bookings::complete_booking_handler))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking_handler))
        .route("/api/bookings/:id/no-show", post(bookings::no_show_booking_handler))
        .with_state(state)
        .merge(webhook_routes)
        .layer(cors)
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Detailing API - Starting...");

    // Get configuration from environment variables
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set in environment");
    let gateway_key = std::env::var("GATEWAY_SECRET_KEY")
        .expect("GATEWAY_SECRET_KEY must be set in environment");
    let webhook_secret = std::env::var("GATEWAY_WEBHOOK_SECRET")
        .expect("GATEWAY_WEBHOOK_SECRET must be set in environment");
    let authorization_mode = std::env::var("AUTHORIZATION_MODE")
        .ok()
        .map(|raw| {
            AuthorizationMode::from_str(&raw).expect("AUTHORIZATION_MODE must be deposit_hold or full_hold")
        })
        .unwrap_or_default();
    let host = std::env::var("HOST")
        .unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string());

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    // Run SQLx migrations on startup
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    // Mailgun is optional in development; without it, sends are logged and
    // reported as failures so reminder retries keep working.
    let notifier: Arc<dyn Notifier> = match (
        std::env::var("MAILGUN_DOMAIN"),
        std::env::var("MAILGUN_API_KEY"),
        std::env::var("MAILGUN_FROM"),
    ) {
        (Ok(domain), Ok(api_key), Ok(from)) => {
            Arc::new(MailgunNotifier::new(domain, api_key, from))
        }
        _ => {
            tracing::warn!("Mailgun not configured; customer notifications disabled");
            Arc::new(NullNotifier)
        }
    };

    let payments_repo: Arc<dyn PaymentsStore> = Arc::new(PaymentsRepository::new(db_pool.clone()));
    let gateway = Arc::new(
        StripeGateway::new(gateway_key).expect("Failed to build gateway HTTP client"),
    );
    let payment_service = Arc::new(PaymentService::new(
        payments_repo.clone(),
        gateway,
        notifier.clone(),
        authorization_mode,
    ));

    let bookings_repo = BookingsRepository::new(db_pool.clone());
    let booking_service = Arc::new(BookingService::new(
        CatalogRepository::new(db_pool.clone()),
        bookings_repo.clone(),
        payment_service.clone(),
        notifier.clone(),
        ServiceArea::new(Box::new(NominatimGeocoder::new())),
    ));

    let webhook_ctx = Arc::new(WebhookContext {
        verifier: WebhookVerifier::new(webhook_secret),
        repo: payments_repo,
    });

    // Background reminder sweep
    let scheduler = ReminderScheduler::new(Arc::new(bookings_repo), notifier);
    tokio::spawn(scheduler.run());

    let state = AppState {
        db: db_pool,
        booking_service,
        payment_service,
    };

    // Create the application router
    let app = create_router(state, webhook_ctx);

    // Start the Axum server
    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Detailing API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
