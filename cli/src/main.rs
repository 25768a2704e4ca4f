//! unirun - run unikernel project targets to completion

use clap::Parser;
use unirun::cli::Cli;
use unirun::domain::RunError;
use unirun::output::json;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = cli.run().await {
        let run_error = e.downcast_ref::<RunError>();
        let code = run_error.map_or(1, RunError::exit_code);
        let rendered = json_mode
            .then(|| json::format_error(&format!("{e:#}"), run_error.map_or("error", RunError::code)))
            .and_then(Result::ok);
        match rendered {
            Some(obj) => println!("{obj}"),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(code);
    }
}
