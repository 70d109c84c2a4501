//! scmp-dump: print the frames of a captured SCMP stream

mod cli;
mod dump;

use clap::Parser;
use cli::Cli;
use luadbg_protocol::ScmpCodec;
use luadbg_utils::{init_logging_with_config, LogConfig};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging_with_config(LogConfig::tool()) {
        eprintln!("{}", e);
    }

    let cli = Cli::parse();
    let codec = ScmpCodec::new(cli.plugin_id).with_max_frame_size(cli.max_frame_size);

    let exit_code = match tokio::fs::File::open(&cli.file).await {
        Ok(file) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            match dump::dump(file, codec, cli.brief, &mut out).await {
                Ok(_) => 0,
                Err(e) => {
                    error!(error = %e, "dump stopped");
                    eprintln!("{}", e);
                    1
                }
            }
        }
        Err(e) => {
            eprintln!("{}: {}", cli.file.display(), e);
            2
        }
    };

    std::process::exit(exit_code);
}
