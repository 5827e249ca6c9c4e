fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    if std::env::var_os("CARGO_FEATURE_SOCKETCAN").is_none() {
        return Ok(());
    }
    match std::env::var("CARGO_CFG_TARGET_OS") {
        Ok(val) if val == "linux" => Ok(()),
        _ => Err("The 'socketcan' feature is only supported on Linux. \
                  Build with --no-default-features on other targets."
            .into()),
    }
}
