fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=proto/frame.proto");
    prost_build::compile_protos(&["proto/frame.proto"], &["proto/"])
}
