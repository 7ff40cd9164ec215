// Code generation for the metrics gRPC service

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/metrics.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/metrics.proto"], &["proto"])?;
    Ok(())
}
