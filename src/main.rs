use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    aeh::run().await
}
