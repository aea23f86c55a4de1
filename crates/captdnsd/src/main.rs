use clap::Parser;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use captdns::responder::CaptiveDns;
use captdns::scope::InterfaceInfo;
use captdns::settings::{self, Settings};

fn begin_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match env::var("RUST_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        Ok("pretty") => builder.pretty().init(),
        Ok("compact") => builder.compact().init(),
        _ => builder.init(),
    }
}

fn parse_duration_ms(s: &str) -> Result<Duration, String> {
    s.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|error| format!("'{s}' is not a number of milliseconds: {error}"))
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
/// A captive portal DNS server.
///
/// Every A query from a client on the interface's subnet is answered
/// with the interface's address, so that whatever a newly joined
/// device looks up, it ends up at the portal.  Queries from anywhere
/// else are ignored.
///
/// Runs until interrupted.
struct Args {
    /// Address to hand out in answers, normally the address of the
    /// interface clients join
    #[clap(short, long, env = "CAPTDNS_ADDRESS")]
    address: Ipv4Addr,

    /// Netmask of the interface: only clients on this subnet get answers
    #[clap(short, long, env = "CAPTDNS_NETMASK", default_value_t = Ipv4Addr::new(255, 255, 255, 0))]
    netmask: Ipv4Addr,

    /// Local address to listen on
    #[clap(short, long, env = "CAPTDNS_BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind_address: IpAddr,

    /// Port to listen on
    #[clap(short, long, env = "CAPTDNS_PORT", default_value_t = settings::DEFAULT_PORT)]
    port: u16,

    /// How often, in milliseconds, the listener checks whether it has
    /// been asked to stop
    #[clap(long, value_parser = parse_duration_ms, default_value = "200")]
    poll_interval_ms: Duration,

    /// How long, in milliseconds, to wait between attempts to bind the
    /// socket
    #[clap(long, value_parser = parse_duration_ms, default_value = "1000")]
    bind_retry_interval_ms: Duration,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let interface = InterfaceInfo::new(args.address, args.netmask);
    let dns = CaptiveDns::new(Settings {
        bind_address: args.bind_address,
        port: args.port,
        poll_interval: args.poll_interval_ms,
        bind_retry_interval: args.bind_retry_interval_ms,
    });

    match dns.start(interface).await {
        Ok(local) => tracing::info!(%local, %interface, "ready"),
        Err(error) => {
            tracing::error!(%error, "could not start");
            process::exit(1);
        }
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(?error, "could not listen for shutdown signal");
    }

    dns.stop().await;
}
