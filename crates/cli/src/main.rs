use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    carline_cli::run().await
}
