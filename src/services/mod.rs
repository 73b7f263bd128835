pub mod archive_service;
pub mod carousel_service;
pub mod common;
pub mod contacts_service;
pub mod health_service;
pub mod locations_service;
pub mod ouvidoria_service;
pub mod registrations_service;
pub mod users_service;

pub use archive_service::ArchiveServiceImpl;
pub use carousel_service::CarouselServiceImpl;
pub use common::ServiceSettings;
pub use contacts_service::EmergencyContactServiceImpl;
pub use health_service::HealthServiceImpl;
pub use locations_service::LocationServiceImpl;
pub use ouvidoria_service::OuvidoriaServiceImpl;
pub use registrations_service::InterestRegistrationServiceImpl;
pub use users_service::UserServiceImpl;
