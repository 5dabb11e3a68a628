#[tokio::main]
async fn main() {
    tenmon_ark_lib::init_tracing();
    if let Err(e) = tenmon_ark_lib::run().await {
        tracing::error!(error = %e, "TENMON-ARK failed");
        std::process::exit(1);
    }
}
