use clap::Parser;
use rwapi_cli::Rwapi;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Rwapi::parse();
    match args.run(true).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}
