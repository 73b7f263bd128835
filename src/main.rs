use std::net::SocketAddr;

use anyhow::Context;
use portal_admin::config::Config;
use portal_admin::db::create_pool;
use portal_admin::middleware::AuthLayer;
use portal_admin::proto::archive::archive_service_server::ArchiveServiceServer;
use portal_admin::proto::carousel::carousel_service_server::CarouselServiceServer;
use portal_admin::proto::contacts::emergency_contact_service_server::EmergencyContactServiceServer;
use portal_admin::proto::health::health_server::HealthServer;
use portal_admin::proto::locations::location_service_server::LocationServiceServer;
use portal_admin::proto::ouvidoria::ouvidoria_service_server::OuvidoriaServiceServer;
use portal_admin::proto::registrations::interest_registration_service_server::InterestRegistrationServiceServer;
use portal_admin::proto::users::user_service_server::UserServiceServer;
use portal_admin::proto::FILE_DESCRIPTOR_SET;
use portal_admin::services::{
    ArchiveServiceImpl, CarouselServiceImpl, EmergencyContactServiceImpl, HealthServiceImpl,
    InterestRegistrationServiceImpl, LocationServiceImpl, OuvidoriaServiceImpl, ServiceSettings,
    UserServiceImpl,
};
use portal_admin::storage::Buckets;

use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_admin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting portal-admin gRPC server...");
    tracing::info!("Connecting to database...");

    // Create database pool
    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    // Object storage buckets
    let buckets = Buckets::connect(&config.storage)
        .await
        .context("Failed to initialise object storage")?;

    let settings = ServiceSettings::from_config(&config);
    tracing::info!(
        "Search policy: {:?}, upload limit: {} bytes",
        settings.text_match,
        settings.max_upload_bytes
    );

    // Create services
    let archive_service =
        ArchiveServiceImpl::new(pool.clone(), buckets.archive.clone(), settings.clone());
    let carousel_service =
        CarouselServiceImpl::new(pool.clone(), buckets.carousel.clone(), settings.clone());
    let contacts_service = EmergencyContactServiceImpl::new(pool.clone(), settings.clone());
    let locations_service = LocationServiceImpl::new(pool.clone(), settings.clone());
    let users_service = UserServiceImpl::new(pool.clone(), settings.clone());
    let ouvidoria_service = OuvidoriaServiceImpl::new(pool.clone(), settings.clone());
    let registrations_service = InterestRegistrationServiceImpl::new(pool.clone(), settings);
    let health_service = HealthServiceImpl::new(pool.clone());

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    let auth = AuthLayer::new(pool, config.jwt_secret.clone(), config.jwt_audience.clone());

    // Build reflection service
    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    // Parse server address
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_addr()))?;
    tracing::info!("Listening on {}", addr);

    // Build and run server with gRPC-Web support
    Server::builder()
        .accept_http1(true) // Required for gRPC-Web
        .layer(TraceLayer::new_for_grpc())
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new()) // Enable gRPC-Web
        .layer(auth)
        .add_service(reflection_service)
        .add_service(HealthServer::new(health_service))
        .add_service(ArchiveServiceServer::new(archive_service))
        .add_service(CarouselServiceServer::new(carousel_service))
        .add_service(EmergencyContactServiceServer::new(contacts_service))
        .add_service(LocationServiceServer::new(locations_service))
        .add_service(UserServiceServer::new(users_service))
        .add_service(OuvidoriaServiceServer::new(ouvidoria_service))
        .add_service(InterestRegistrationServiceServer::new(registrations_service))
        .serve(addr)
        .await?;

    Ok(())
}
