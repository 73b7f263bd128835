use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::proto::health::{
    health_check_response::ServingStatus, health_server::Health, HealthCheckRequest,
    HealthCheckResponse,
};

/// Service names this server answers for; the empty name means the whole server.
const KNOWN_SERVICES: &[&str] = &[
    "",
    "portal.archive.ArchiveService",
    "portal.carousel.CarouselService",
    "portal.contacts.EmergencyContactService",
    "portal.locations.LocationService",
    "portal.users.UserService",
    "portal.ouvidoria.OuvidoriaService",
    "portal.registrations.InterestRegistrationService",
];

pub struct HealthServiceImpl {
    pool: PgPool,
}

impl HealthServiceImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Serving while the database answers.
    async fn current_status(&self) -> ServingStatus {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => ServingStatus::Serving,
            Err(e) => {
                tracing::warn!("Health check: database unavailable: {}", e);
                ServingStatus::NotServing
            }
        }
    }
}

fn check_service_name(service: &str) -> Result<(), Status> {
    if KNOWN_SERVICES.contains(&service) {
        Ok(())
    } else {
        Err(Status::not_found(format!("unknown service {}", service)))
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        check_service_name(&request.get_ref().service)?;

        Ok(Response::new(HealthCheckResponse {
            status: self.current_status().await.into(),
        }))
    }

    type WatchStream = tokio_stream::wrappers::ReceiverStream<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        check_service_name(&request.get_ref().service)?;
        let status = self.current_status().await;
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        tokio::spawn(async move {
            let _ = tx
                .send(Ok(HealthCheckResponse {
                    status: status.into(),
                }))
                .await;
        });

        Ok(Response::new(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}
