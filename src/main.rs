use clap::Parser;

use mvc_core::cli::Args;
use mvc_core::commands::CommandContext;
use mvc_core::logging;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let ctx = CommandContext::new(&args.config);

    // --log-level wins over the configuration file
    let level = args
        .log_level
        .clone()
        .or_else(|| ctx.app_config().ok().and_then(|c| c.file().log_level.clone()));
    logging::init(level.as_deref());

    let output = args.command.run(&ctx, args.format)?;
    println!("{}", output);
    Ok(())
}
