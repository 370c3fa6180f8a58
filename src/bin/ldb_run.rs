//! Runs a Lua script under the debuggee engine.
//!
//! The runner connects to a waiting `ldb` (or waits for one with `--listen`) and stops the
//! script at its first line. When the frame can't be reached the script runs without
//! debugging.

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use luadbg::config::{self, Config};
use luadbg::debuggee::lua::new_interpreter;
use luadbg::debuggee::{RuntimeContext, Session};
use luadbg::remote::{Peer, RemoteEngine};
use mlua::Lua;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host of the frame, or the address to listen on with --listen.
    #[clap(long)]
    host: Option<String>,

    /// Port of the frame, or the port to listen on with --listen.
    #[clap(short, long, env = "LDB_PORT")]
    port: Option<u16>,

    /// Wait for the frame to connect instead of connecting to it.
    #[clap(long)]
    listen: bool,

    /// Seconds to wait for the frame.
    #[clap(short, long)]
    wait: Option<u64>,

    /// Path to a config file (default: ~/.config/ldb/config.toml).
    #[clap(long)]
    config: Option<PathBuf>,

    /// Lua script to run.
    script: PathBuf,

    /// Arguments passed to the script in the `arg` table.
    #[clap(trailing_var_arg = true)]
    script_args: Vec<String>,
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
    }
}

/// Global `arg` table the way the standalone interpreter fills it.
fn set_script_args(lua: &Lua, script: &str, args: &[String]) -> mlua::Result<()> {
    let table = lua.create_table()?;
    table.raw_set(0, script)?;
    for (idx, arg) in args.iter().enumerate() {
        table.raw_set(idx + 1, arg.as_str())?;
    }
    lua.globals().set("arg", table)
}

/// Script text without a leading `#` line. The line is kept empty so line numbers stay.
fn strip_shebang(code: &str) -> &str {
    if !code.starts_with('#') {
        return code;
    }
    match code.find('\n') {
        Some(pos) => &code[pos..],
        None => "",
    }
}

fn connect(args: &Args, cfg: &Config) -> luadbg::remote::error::Result<Arc<RemoteEngine>> {
    let engine = Arc::new(RemoteEngine::new(Peer::Debuggee));
    if args.listen {
        engine.start_as_server(&cfg.host, cfg.port, cfg.connect_wait)?;
    } else {
        engine.start_as_client(&cfg.host, cfg.port, cfg.connect_wait)?;
    }
    Ok(engine)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut cfg = Config::load(args.config.as_deref());
    args.apply(&mut cfg);
    config::set(cfg);
    let cfg = config::current();

    let script = args.script.to_string_lossy().to_string();
    let code = std::fs::read_to_string(&args.script)
        .with_context(|| format!("read script {script}"))?;

    let lua = new_interpreter();
    set_script_args(&lua, &script, &args.script_args)
        .map_err(|e| anyhow::anyhow!("set script arguments: {e}"))?;

    let context = RuntimeContext::new();
    let engine = match connect(&args, cfg) {
        Ok(engine) => {
            info!(target: "debuggee", "frame connected");
            let session = Arc::new(Session::new(engine.clone(), cfg.poll_interval));
            context
                .attach(&lua, session.clone())
                .map_err(|e| anyhow::anyhow!("attach debugger: {e}"))?;
            session.begin();
            Some(engine)
        }
        Err(e) => {
            warn!(target: "debuggee", "frame is unreachable ({e:#}), run without debugging");
            luadbg::log::disable();
            None
        }
    };

    let result = lua
        .load(strip_shebang(&code))
        .set_name(format!("@{script}"))
        .exec();
    if let Err(err) = &result {
        eprintln!("{err}");
        if engine.is_some() {
            context.report_error(&lua, err);
        }
    }

    context.detach(&lua);
    if let Some(engine) = engine {
        engine.shutdown();
    }

    result.map_err(|e| anyhow::anyhow!("script failed: {e}"))
}
