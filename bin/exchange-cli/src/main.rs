use clap::Parser;
use common::init_logger;
use exchange_cli::{run, Args, LoggerSnafu};
use snafu::ResultExt;

#[tokio::main]
async fn main() -> exchange_cli::Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level).context(LoggerSnafu)?;

    run(args).await
}
