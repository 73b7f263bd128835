pub mod archive_item;
pub mod carousel_image;
pub mod emergency_contact;
pub mod interest_registration;
pub mod location;
pub mod manifestacao;
pub mod profile;

pub use archive_item::ArchiveItemModel;
pub use carousel_image::CarouselImageModel;
pub use emergency_contact::EmergencyContactModel;
pub use interest_registration::InterestRegistrationModel;
pub use location::LocationModel;
pub use manifestacao::ManifestacaoModel;
pub use profile::ProfileModel;
