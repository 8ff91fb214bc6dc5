use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use raop_rtsp::crypto::DefaultCryptoProvider;
use raop_rtsp::mdns::NullMdnsAdvertiser;
use raop_rtsp::player::NullPlayer;
use raop_rtsp::rtp::NullRtpEndpoint;
use raop_rtsp::server::Collaborators;
use raop_rtsp::{Config, Server};

#[derive(Parser)]
#[command(
    name = "raop-rtsp-server",
    about = "Standalone RTSP control-plane server for AirPlay v1 (RAOP) receivers"
)]
struct Args {
    /// Path to a YAML config file (see `Config` for recognized keys).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// PKCS#1 PEM RSA private key used for Apple-Challenge and key exchange.
    #[arg(long)]
    key: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    eprintln!("failed to read config file {}: {err}", path.display());
                    std::process::exit(1);
                }
            };
            match Config::from_yaml(&text) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("failed to parse config file {}: {err}", path.display());
                    std::process::exit(1);
                }
            }
        }
        None => Config::default(),
    };

    let key_pem = match std::fs::read_to_string(&args.key) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("failed to read key file {}: {err}", args.key.display());
            std::process::exit(1);
        }
    };
    let crypto = match DefaultCryptoProvider::from_pkcs1_pem(&key_pem) {
        Ok(crypto) => crypto,
        Err(err) => {
            eprintln!("failed to load RSA private key: {err}");
            std::process::exit(1);
        }
    };

    let mut server = Server::new(
        config,
        Collaborators {
            crypto: Arc::new(crypto),
            player: Arc::new(NullPlayer::default()),
            rtp: Arc::new(NullRtpEndpoint),
            mdns: Arc::new(NullMdnsAdvertiser),
        },
    );

    if let Err(err) = server.start() {
        eprintln!("failed to start server: {err}");
        std::process::exit(1);
    }

    println!(
        "raop-rtsp-server listening on port {} — press Enter to stop",
        server.config().port
    );
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input);

    let _ = server.stop();
}
