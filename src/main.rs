//! Runner Bridge CLI - watch and drive an audio runner from the terminal.
//!
//! This is the main binary entry point. See the `runner_bridge` library
//! for the core functionality.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use runner_bridge::constants::COMMAND_CONFIRM_TIMEOUT;
use runner_bridge::model::{ParameterKey, RunnerInfoKey};
use runner_bridge::osc::{self, DecodeOptions};
use runner_bridge::{AppStatus, Bridge, BridgeEvent, Config, GraphModel};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "runner-bridge")]
#[command(version)]
#[command(about = "Mirror and control an audio runner over OSC/OSCQuery")]
struct Cli {
    /// Runner host (overrides config and RUNNER_BRIDGE_HOST)
    #[arg(long, global = true)]
    host: Option<String>,
    /// Runner WebSocket port
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Connection attempts per reconnect cycle
    #[arg(long, global = true)]
    max_retries: Option<u32>,
    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, sync, and log every change until Ctrl-C
    Watch,
    /// Load a graph set
    LoadSet {
        /// Set name
        name: String,
    },
    /// Save the current graph as a set
    SaveSet {
        /// Set name
        name: String,
    },
    /// Set a parameter on an instance
    SetParam {
        /// Instance index
        instance: u32,
        /// Parameter index
        index: u32,
        /// New value
        value: f64,
        /// Treat the value as normalized `[0, 1]`
        #[arg(long)]
        normalized: bool,
    },
    /// Connect two ports, by port id or full port name
    Connect {
        /// Source port
        source: String,
        /// Sink port
        sink: String,
    },
    /// Map a file to an instance buffer
    MapBuffer {
        /// Instance index
        instance: u32,
        /// Buffer name
        name: String,
        /// File name on the runner; omit to unmap
        #[arg(default_value = "")]
        file: String,
    },
    /// Start or stop the stream recorder
    Record {
        /// Stop instead of start
        #[arg(long)]
        stop: bool,
    },
    /// Connect, sync, and print the mirrored state as JSON
    Dump,
    /// Decode a hex-encoded OSC frame and print it as JSON
    Decode {
        /// Frame bytes as hex
        hex: String,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the config directory
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("RUNNER_BRIDGE_LOG", "info")
        .write_style("RUNNER_BRIDGE_LOG_STYLE");
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_secs();

    if let Some(path) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn summarize(model: &GraphModel) -> String {
    let graph = model.graph();
    format!(
        "{} instances, {} nodes, {} ports, {} connections, {} parameters, set {:?}, cpu {:.1}%",
        model.instances().count(),
        graph.node_count(),
        graph.port_count(),
        graph.connection_count(),
        model.parameters().count(),
        model.current_graph_set_id().unwrap_or("-"),
        model.runner().info(RunnerInfoKey::CpuLoad).map_or(0.0, |i| i.value),
    )
}

/// Connect and wait until the initial state is in.
async fn open_bridge(config: &Config) -> Result<Bridge> {
    let mut bridge = Bridge::new(config)?;
    bridge
        .connect()
        .await
        .with_context(|| format!("connecting to {}", bridge.endpoint()))?;

    match bridge.wait_ready().await {
        AppStatus::Ready => Ok(bridge),
        other => bail!("runner not ready: {other}"),
    }
}

/// Pump events until `confirmed` holds or the confirmation window closes.
async fn wait_for(bridge: &mut Bridge, confirmed: impl Fn(&GraphModel) -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + COMMAND_CONFIRM_TIMEOUT;
    loop {
        if confirmed(bridge.model()) {
            return true;
        }
        match tokio::time::timeout_at(deadline, bridge.next_event()).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => return confirmed(bridge.model()),
        }
    }
}

async fn watch(config: &Config) -> Result<()> {
    let mut bridge = Bridge::new(config)?;
    bridge
        .connect()
        .await
        .with_context(|| format!("connecting to {}", bridge.endpoint()))?;
    println!("Connected to {}", bridge.endpoint());

    loop {
        tokio::select! {
            event = bridge.next_event() => match event {
                Some(BridgeEvent::StatusChanged(status)) => {
                    println!("[{status}] {}", summarize(bridge.model()));
                }
                Some(BridgeEvent::ModelUpdated) => {
                    log::debug!("{}", summarize(bridge.model()));
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                bridge.close();
                break;
            }
        }
    }
    Ok(())
}

fn model_json(model: &GraphModel) -> serde_json::Value {
    let graph = model.graph();
    serde_json::json!({
        "nodes": graph.nodes().collect::<Vec<_>>(),
        "ports": graph.ports().collect::<Vec<_>>(),
        "connections": graph.connections().collect::<Vec<_>>(),
        "patchers": model.patchers().collect::<Vec<_>>(),
        "instances": model.instances().collect::<Vec<_>>(),
        "parameters": model.parameters().collect::<Vec<_>>(),
        "sets": model.sets(),
        "transport": model.transport(),
        "runner": model.runner(),
    })
}

fn resolve_port(model: &GraphModel, name: &str) -> String {
    if model.graph().port(name).is_some() {
        return name.to_string();
    }
    model.port_id_for(name).unwrap_or_else(|| name.to_string())
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    data_encoding::HEXLOWER_PERMISSIVE
        .decode(digits.as_bytes())
        .context("invalid hex frame")
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Watch => watch(&config).await?,
        Commands::LoadSet { name } => {
            let mut bridge = open_bridge(&config).await?;
            bridge.load_set(&name)?;
            if wait_for(&mut bridge, |m| m.current_graph_set_id() == Some(name.as_str())).await {
                println!("Loaded set {name}");
            } else {
                println!("Sent load for {name}; no confirmation yet");
            }
            bridge.close();
        }
        Commands::SaveSet { name } => {
            let mut bridge = open_bridge(&config).await?;
            bridge.save_set(&name)?;
            if wait_for(&mut bridge, |m| m.sets().get(&name).is_some()).await {
                println!("Saved set {name}");
            } else {
                println!("Sent save for {name}; no confirmation yet");
            }
            bridge.close();
        }
        Commands::SetParam {
            instance,
            index,
            value,
            normalized,
        } => {
            let mut bridge = open_bridge(&config).await?;
            let key = ParameterKey::new(instance, index);
            if normalized {
                bridge.set_parameter_normalized(key, value)?;
            } else {
                bridge.set_parameter_value(key, value)?;
            }
            let confirmed =
                wait_for(&mut bridge, |m| m.parameter(key).is_some_and(|p| !p.provisional)).await;
            if let Some(param) = bridge.model().parameter(key) {
                let note = if confirmed { "" } else { " (unconfirmed)" };
                println!("{} = {}{note}", param.label(), param.value_label());
            }
            bridge.close();
        }
        Commands::Connect { source, sink } => {
            let mut bridge = open_bridge(&config).await?;
            let source = resolve_port(bridge.model(), &source);
            let sink = resolve_port(bridge.model(), &sink);
            bridge.connect_ports(&source, &sink)?;
            if wait_for(&mut bridge, |m| m.graph().connection(&source, &sink).is_some()).await {
                println!("Connected {source} -> {sink}");
            } else {
                println!("Sent connect {source} -> {sink}; no confirmation yet");
            }
            bridge.close();
        }
        Commands::MapBuffer {
            instance,
            name,
            file,
        } => {
            let mut bridge = open_bridge(&config).await?;
            bridge.set_data_ref(instance, &name, &file)?;
            let mapped = |m: &GraphModel| {
                m.instance(instance)
                    .and_then(|i| i.data_refs.get(&name))
                    .is_some_and(|r| r.file_name == file)
            };
            if wait_for(&mut bridge, mapped).await {
                println!("Buffer {name} on instance {instance} -> {file:?}");
            } else {
                println!("Sent mapping for {name}; no confirmation yet");
            }
            bridge.close();
        }
        Commands::Record { stop } => {
            let mut bridge = open_bridge(&config).await?;
            bridge.set_recording(!stop)?;
            if wait_for(&mut bridge, |m| m.runner().recording.active != stop).await {
                println!("Recording {}", if stop { "stopped" } else { "started" });
            } else {
                println!("Sent recorder toggle; no confirmation yet");
            }
            bridge.close();
        }
        Commands::Dump => {
            let mut bridge = open_bridge(&config).await?;
            println!("{}", serde_json::to_string_pretty(&model_json(bridge.model()))?);
            bridge.close();
        }
        Commands::Decode { hex } => {
            let bytes = parse_hex(&hex)?;
            let value = osc::decode_value(
                &bytes,
                DecodeOptions {
                    metadata: true,
                    unpack_single_args: false,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save()?;
                println!("Saved to {}", path.display());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);
    init_logging(&config)?;

    // Give an in-flight close a moment to reach the runner.
    let result = run(cli, config).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("2f 61 00 00").unwrap(), vec![0x2f, 0x61, 0, 0]);
        assert!(parse_hex("2f6").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_hex_rejects_signs_and_accepts_uppercase() {
        assert!(parse_hex("+f").is_err());
        assert!(parse_hex("-1").is_err());
        assert_eq!(parse_hex("2F 6A").unwrap(), vec![0x2f, 0x6a]);
    }

    #[test]
    fn test_empty_model_json() {
        let value = model_json(&GraphModel::default());
        assert_eq!(value["nodes"], serde_json::json!([]));
        assert_eq!(value["sets"]["view_order"], serde_json::json!([]));
    }

    #[test]
    fn test_map_buffer_defaults_to_unmap() {
        let cli = Cli::parse_from(["runner-bridge", "map-buffer", "0", "samples"]);
        match cli.command {
            Commands::MapBuffer { instance, name, file } => {
                assert_eq!((instance, name.as_str(), file.as_str()), (0, "samples", ""));
            }
            _ => panic!("expected map-buffer"),
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["runner-bridge", "--host", "c74rpi.local", "--port", "9000", "config"]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.host, "c74rpi.local");
        assert_eq!(config.port, 9000);
    }
}
