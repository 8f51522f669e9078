//! `rtgate`: run the gateway, connect to one, or run a session on the console.
//!
//! ```text
//! rtgate serve --bind 0.0.0.0:8080 --cycles 20
//! rtgate connect --server 127.0.0.1 --identity admin
//! rtgate local --cycles 10
//! ```

use std::io::{self, BufRead, Write};
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use rt_gatekeeper::config::GatewayConfig;
use rt_gatekeeper::core::{
    lock_process_memory, unlock_process_memory, AppResult, Gateway, ShutdownSignal,
};
use rt_gatekeeper::infra::ConsoleConnection;
use rt_gatekeeper::runtime::{run_server, run_session, shutdown_signal, ClientOutcome};
use rt_gatekeeper::util::init_tracing_with_default;

#[derive(Parser, Debug)]
#[command(name = "rtgate", version, about = "Authorized access to a periodic real-time task")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept TCP clients and run a real-time session for each authorized one.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Connect to a gateway and print everything it sends.
    Connect {
        /// Gateway host address.
        #[arg(long, default_value = "127.0.0.1")]
        server: IpAddr,
        /// Gateway port.
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Identity to present; read from stdin when omitted.
        #[arg(long)]
        identity: Option<String>,
    },
    /// Run one session on this terminal, authorized by a local interface address.
    Local {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Allowed origin address; repeat for several. Defaults to the built-in list.
    #[arg(long = "allow")]
    allow: Vec<IpAddr>,
    /// Identity that is granted access.
    #[arg(long)]
    identity: Option<String>,
    /// Cycle period in milliseconds.
    #[arg(long)]
    period_ms: Option<u64>,
    /// Cycles per session.
    #[arg(long)]
    cycles: Option<u32>,
    /// SCHED_FIFO priority requested by session threads.
    #[arg(long)]
    priority: Option<i32>,
    /// Full configuration as JSON; individual flags override it.
    #[arg(long)]
    config_json: Option<String>,
}

impl SessionArgs {
    fn into_config(self, base: GatewayConfig) -> AppResult<GatewayConfig> {
        let mut config = match &self.config_json {
            Some(json) => GatewayConfig::from_json_str(json)
                .map_err(anyhow::Error::msg)
                .context("parsing --config-json")?,
            None => base,
        };
        if !self.allow.is_empty() {
            config = config.with_allowed_origins(self.allow);
        }
        if let Some(identity) = self.identity {
            config = config.with_authorized_identity(identity);
        }
        if let Some(period_ms) = self.period_ms {
            config = config.with_period_ms(period_ms);
        }
        if let Some(cycles) = self.cycles {
            config = config.with_cycle_bound(cycles);
        }
        if let Some(priority) = self.priority {
            config = config.with_rt_priority(priority);
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    init_tracing_with_default("info");
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { bind, session } => serve(bind, session),
        Command::Connect {
            server,
            port,
            identity,
        } => connect(SocketAddr::new(server, port), identity),
        Command::Local { session } => local(session),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("rtgate: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn serve(bind: SocketAddr, args: SessionArgs) -> AppResult<ExitCode> {
    let config = args.into_config(GatewayConfig::default())?.with_bind_addr(bind);
    let gateway = Arc::new(Gateway::new(config, ShutdownSignal::new())?);

    let memory = lock_process_memory();
    if !memory.is_elevated() {
        warn!(%memory, "Continuing without locked memory");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rtgate-io")
        .build()
        .context("building tokio runtime")?;
    let report = runtime.block_on(run_server(Arc::clone(&gateway), shutdown_signal()));

    unlock_process_memory();
    let report = report.context("serving")?;
    info!(?report, "Server exited");
    Ok(ExitCode::SUCCESS)
}

fn connect(addr: SocketAddr, identity: Option<String>) -> AppResult<ExitCode> {
    let identity = match identity {
        Some(identity) => identity,
        None => read_identity()?,
    };
    let transcript = run_session(addr, &identity, |line| println!("{line}"))
        .with_context(|| format!("session with {addr}"))?;

    match transcript.outcome {
        ClientOutcome::Completed { cycles } => {
            println!("Session completed after {cycles} cycles");
            Ok(ExitCode::SUCCESS)
        }
        ClientOutcome::Truncated { cycles_seen } => {
            println!("Connection closed after {cycles_seen} cycles");
            Ok(ExitCode::FAILURE)
        }
        ClientOutcome::OriginRejected | ClientOutcome::AuthenticationFailed => {
            Ok(ExitCode::FAILURE)
        }
    }
}

fn local(args: SessionArgs) -> AppResult<ExitCode> {
    let config = args.into_config(GatewayConfig::default().with_cycle_bound(10))?;
    let gateway = Gateway::new(config, ShutdownSignal::new())?;

    let Some(origin) = gateway.pipeline().origin_gate().check_local_interfaces()? else {
        bail!("no local interface address is on the allow-list");
    };
    println!("Origin {origin} authorized");

    let memory = lock_process_memory();
    if !memory.is_elevated() {
        warn!(%memory, "Continuing without locked memory");
    }
    let summary = gateway.handle(ConsoleConnection::new(), origin);
    unlock_process_memory();

    let code = match summary.run {
        Some(report) if report.outcome.sends_completion() => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    };
    Ok(code)
}

fn read_identity() -> AppResult<String> {
    print!("Username: ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("no identity given");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
