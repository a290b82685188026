use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::{io::Write, str::FromStr};
use tokio::io::BufReader;
use tokio::sync::broadcast;

use natty::config::{STUN_SERVERS_ENV, resolve_stun_servers};
use natty::{Exit, NattyConfig, Role, session};

#[derive(Parser)]
#[command(name = "natty")]
#[command(version)]
#[command(
    about = "Opens a WebRTC data channel to a remote peer using JSON signaling over stdio",
    long_about = None
)]
struct Cli {
    /// Create the offer instead of waiting for one
    #[arg(long)]
    offer: bool,
    /// Write signaling output to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
    /// Comma separated ICE server URLs; falls back to $WEBRTC_CONNECT, then
    /// the public Google STUN server. An empty value gathers host candidates only
    #[arg(long, value_delimiter = ',')]
    stuns: Option<Vec<String>>,
    /// Gather loopback candidates too (both peers on one host)
    #[arg(long)]
    loopback: bool,
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = log::LevelFilter::from_str(&cli.log_level)?;
    if cli.debug {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }

    let env_stuns = std::env::var(STUN_SERVERS_ENV).ok();
    let stuns = resolve_stun_servers(cli.stuns, env_stuns.as_deref());
    let config = NattyConfig::new(Role::from_offer_flag(cli.offer))
        .with_out(cli.out)
        .with_stun_servers(stuns)
        .with_loopback(cli.loopback);

    let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        if let Some(stop_tx) = stop_tx.take() {
            let _ = stop_tx.send(());
        }
    })?;

    let writer = config.open_writer().await?;
    let input = BufReader::new(tokio::io::stdin());

    info!("Starting natty as {}", config.role);
    let code = match session::run(&config, input, writer, stop_rx).await {
        Ok(Exit::IceFailed) => 1,
        Ok(exit) => {
            info!("natty exited: {exit:?}");
            0
        }
        Err(err) => {
            error!("run got error: {err}");
            1
        }
    };

    // the stdin reader thread may still be parked in a blocking read
    std::process::exit(code);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cli_stuns() {
        let tests: Vec<(Vec<&str>, Option<Vec<&str>>)> = vec![
            (vec!["natty"], None),
            (vec!["natty", "--stuns", ""], Some(vec![""])),
            (
                vec!["natty", "--stuns", "a.example:3478,stun:b.example:19302"],
                Some(vec!["a.example:3478", "stun:b.example:19302"]),
            ),
        ];

        for (args, expected) in tests {
            let cli = Cli::try_parse_from(args.clone()).expect("args should parse");
            let expected =
                expected.map(|urls| urls.into_iter().map(str::to_owned).collect::<Vec<_>>());
            assert_eq!(cli.stuns, expected, "args: {args:?}");
        }
    }
}
