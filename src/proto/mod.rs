// Generated by tonic-build from proto/*.proto

pub mod common {
    tonic::include_proto!("portal.common");
}

pub mod health {
    tonic::include_proto!("grpc.health.v1");
}

pub mod archive {
    tonic::include_proto!("portal.archive");
}

pub mod carousel {
    tonic::include_proto!("portal.carousel");
}

pub mod contacts {
    tonic::include_proto!("portal.contacts");
}

pub mod locations {
    tonic::include_proto!("portal.locations");
}

pub mod users {
    tonic::include_proto!("portal.users");
}

pub mod ouvidoria {
    tonic::include_proto!("portal.ouvidoria");
}

pub mod registrations {
    tonic::include_proto!("portal.registrations");
}

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("portal_descriptor");
