// src/main.rs

use lazydag::{cli, logging};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("lazydag error: {err:?}");
        std::process::exit(1);
    }
    match lazydag::run(args).await {
        Ok(summary) if summary.failed == 0 => {}
        Ok(_) => std::process::exit(1),
        Err(err) => {
            tracing::error!("failed: {err}");
            std::process::exit(1);
        }
    }
}
