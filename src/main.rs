//! minibgpd entry point

// SPDX-License-Identifier: AGPL-3.0-or-later

mod arg;
mod server;

use clap::Parser;
use server::Server;

fn setup_logger(verbose: bool) {
    let config = simplelog::ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();
    let level = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Failed to initialize logger");
}

#[tokio::main]
async fn main() {
    let args = arg::MiniBgpd::parse();
    setup_logger(args.verbose);
    let config = args.session_config();
    let server = match Server::bind(args.listen_addr, args.listen_port, config).await {
        Ok(server) => server,
        Err(err) => {
            log::error!(
                "Failed to bind {}:{}: {err}",
                args.listen_addr,
                args.listen_port
            );
            std::process::exit(1);
        }
    };
    let session = tokio::spawn(server.serve());
    // The process runs until its controlling input reaches EOF
    let stdin_eof = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });
    tokio::select! {
        result = session => match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::error!("Session failed: {err}");
                std::process::exit(1);
            }
            Err(err) => {
                log::error!("Session task failed: {err}");
                std::process::exit(1);
            }
        },
        _ = stdin_eof => log::info!("Input closed; shutting down"),
    }
}
