use anyhow::Context;
use clap::Parser;
use log::info;
use luadbg::config::{self, Config};
use luadbg::frame::FrameSession;
use luadbg::remote::{Peer, RemoteEngine};
use luadbg::ui::console::AppBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Console frame of the remote Lua debugger.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on, or to connect to with --client.
    #[clap(short, long, env = "LDB_PORT")]
    port: Option<u16>,

    /// Host of the debuggee with --client, the address to listen on otherwise.
    #[clap(long)]
    host: Option<String>,

    /// Connect to a listening debuggee instead of waiting for one.
    #[clap(long)]
    client: bool,

    /// Seconds to wait for the other side to show up.
    #[clap(short, long)]
    wait: Option<u64>,

    /// Path to a config file (default: ~/.config/ldb/config.toml).
    #[clap(long)]
    config: Option<PathBuf>,

    /// Do not save command history.
    #[clap(long)]
    no_history: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(secs) = self.wait {
            config.connect_wait = Duration::from_secs(secs);
        }
        if self.no_history {
            config.save_history = false;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut cfg = Config::load(args.config.as_deref());
    args.apply(&mut cfg);
    config::set(cfg);
    let cfg = config::current();

    let engine = Arc::new(RemoteEngine::new(Peer::Frame));
    if args.client {
        println!("Connecting to {}:{}", cfg.host, cfg.port);
        engine
            .start_as_client(&cfg.host, cfg.port, cfg.connect_wait)
            .with_context(|| format!("connect to {}:{}", cfg.host, cfg.port))?;
    } else {
        println!("Waiting for debuggee on {}:{}", cfg.host, cfg.port);
        engine
            .start_as_server(&cfg.host, cfg.port, cfg.connect_wait)
            .with_context(|| format!("listen on {}:{}", cfg.host, cfg.port))?;
    }
    info!(target: "frame", "debuggee connected");

    let session = FrameSession::new(engine, cfg.request_timeout);
    let app = AppBuilder::new().build(session)?;
    app.run()
}
