fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=proto/discovery.proto");
    println!("cargo:rerun-if-changed=proto/imgateway.proto");
    println!("cargo:rerun-if-changed=proto/apigateway.proto");

    tonic_prost_build::configure().build_client(true).build_server(true).compile_protos(
        &[
            "proto/discovery.proto",
            "proto/imgateway.proto",
            "proto/apigateway.proto",
        ],
        &["proto/"],
    )
}
