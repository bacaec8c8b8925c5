#[tokio::main]
async fn main() {
    if let Err(e) = medibox_monitor_lib::run().await {
        eprintln!("medibox-monitor: {e}");
        std::process::exit(1);
    }
}
