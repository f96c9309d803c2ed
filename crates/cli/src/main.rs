// CLI modules
mod cli;
mod process;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Chat, Get, Init, Listen, SendMessage, Version};

command_enum! {
    (Send, SendMessage),
    (Get, Get),
    (Listen, Listen),
    (Chat, Chat),
    (Init, Init),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let guards = process::init_logging(args.verbose, args.log_dir.as_deref());

    let ctx = cli::op::OpContext::new(args.config_path, args.verbose);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            let output = output.to_string();
            if !output.is_empty() {
                println!("{}", output);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
