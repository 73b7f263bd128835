fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);

    // Use the vendored protoc unless one is provided explicitly
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Compile proto files with file descriptor for reflection
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("portal_descriptor.bin"))
        .compile_protos(
            &[
                "proto/common.proto",
                "proto/health.proto",
                "proto/archive.proto",
                "proto/carousel.proto",
                "proto/contacts.proto",
                "proto/locations.proto",
                "proto/users.proto",
                "proto/ouvidoria.proto",
                "proto/registrations.proto",
            ],
            &["proto"],
        )?;

    // Rerun if proto files change
    println!("cargo:rerun-if-changed=proto/");

    Ok(())
}
