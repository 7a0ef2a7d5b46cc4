use anyhow::{anyhow, bail, Context};
use crabstream::probe::{NetworkClassifier, StaticCapabilities, ThresholdClassifier};
use crabstream::testing::{ScriptStep, ScriptedTransport};
use crabstream::{
    CancellationToken, Capability, CapabilitySet, DeliveryEngine, EngineConfig, NetworkCondition,
    NetworkSample,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "Usage: crabstream-cli <command> [args]

Commands:
  default-config                 Print the default configuration as TOML
  check-config <path>            Validate a configuration file (with CRABSTREAM_* overrides)
  plan [options]                 Print the execution plan for an environment
  simulate --script <s> [options]
                                 Run deliveries against a scripted transport

Options:
  --config <path>                Configuration file (default: crabstream.toml)
  --caps <list|all>              Comma-separated capabilities (default: all)
  --network <condition>          Force slow|medium|fast|unknown
  --label <class>                Connection class label, e.g. 4g
  --downlink <mbps>              Measured downlink
  --probe-kbps <kbps>            Bandwidth estimate
  --runs <n>                     Deliveries to simulate (default: 1)
  --json                         JSON output

Script format: <strategy>=<step>,<step>;<strategy>=...
  steps: ok | fail | hang | late | coop, optionally @<ms>";

fn main() -> anyhow::Result<()> {
    crabstream::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "default-config" => cmd_default_config(),
        "check-config" => cmd_check_config(&args),
        "plan" => cmd_plan(&args),
        "simulate" => cmd_simulate(&args),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    caps: Option<String>,
    network: Option<NetworkCondition>,
    sample: NetworkSample,
    script: Option<String>,
    runs: u32,
    json: bool,
}

fn parse_options(args: &[String]) -> anyhow::Result<Options> {
    let mut opts = Options {
        runs: 1,
        ..Options::default()
    };

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> anyhow::Result<String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match flag {
            "--config" => opts.config = Some(PathBuf::from(value()?)),
            "--caps" => opts.caps = Some(value()?),
            "--network" => {
                let condition = value()?;
                opts.network = Some(condition.parse::<NetworkCondition>().map_err(|e| anyhow!(e))?);
            }
            "--label" => opts.sample.connection_class = Some(value()?),
            "--downlink" => opts.sample.downlink_mbps = Some(value()?.parse()?),
            "--probe-kbps" => opts.sample.bandwidth_estimate_kbps = Some(value()?.parse()?),
            "--script" => opts.script = Some(value()?),
            "--runs" => opts.runs = value()?.parse()?,
            "--json" => opts.json = true,
            other => bail!("Unknown option: {}", other),
        }
        i += 1;
    }
    Ok(opts)
}

fn parse_caps(arg: Option<&str>) -> anyhow::Result<CapabilitySet> {
    match arg {
        None | Some("all") => Ok(CapabilitySet::all()),
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<Capability>().map_err(|e| anyhow!(e)))
            .collect(),
    }
}

fn parse_script(script: &str) -> anyhow::Result<ScriptedTransport> {
    let transport = ScriptedTransport::new();
    for part in script.split(';').filter(|p| !p.trim().is_empty()) {
        let (strategy, steps) = part
            .split_once('=')
            .ok_or_else(|| anyhow!("script entry '{}' must be <strategy>=<steps>", part))?;
        let steps = steps
            .split(',')
            .map(|s| s.parse::<ScriptStep>().map_err(|e| anyhow!(e)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        transport.push_steps(strategy.trim(), steps);
    }
    Ok(transport)
}

fn load_config(opts: &Options) -> anyhow::Result<EngineConfig> {
    let path = opts.config.clone().unwrap_or_else(EngineConfig::default_path);
    EngineConfig::load_layered(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))
}

fn build_engine(opts: &Options) -> anyhow::Result<DeliveryEngine> {
    let config = load_config(opts)?;
    let caps = parse_caps(opts.caps.as_deref())?;
    let classifier: Arc<dyn NetworkClassifier> = match opts.network {
        Some(forced) => Arc::new(move |_: &NetworkSample| forced),
        None => Arc::new(ThresholdClassifier::new(config.network.thresholds.clone())),
    };
    Ok(DeliveryEngine::new(
        config,
        Arc::new(StaticCapabilities(caps)),
        classifier,
    )?)
}

fn cmd_default_config() -> anyhow::Result<()> {
    print!("{}", EngineConfig::default().to_toml_string()?);
    Ok(())
}

fn cmd_check_config(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: crabstream-cli check-config <path>"))?;
    let config = EngineConfig::load_layered(path)?;
    config.validate().map_err(|e| anyhow!(e))?;
    println!(
        "OK: {} strategies, history {}, alpha {}",
        config.strategies.len(),
        config.metrics.history_size,
        config.metrics.alpha
    );
    Ok(())
}

fn cmd_plan(args: &[String]) -> anyhow::Result<()> {
    let opts = parse_options(args)?;
    let engine = build_engine(&opts)?;
    let plan = engine.plan(&opts.sample)?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("Network: {}", plan.network);
        for (i, entry) in plan.iter().enumerate() {
            println!(
                "{}. {} (priority {}, timeout {}ms, attempts {})",
                i + 1,
                entry.strategy.name,
                entry.strategy.priority,
                entry.effective_timeout_ms,
                entry.effective_retries
            );
        }
    }
    Ok(())
}

fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    let opts = parse_options(args)?;
    let script = opts
        .script
        .as_deref()
        .ok_or_else(|| anyhow!("simulate requires --script"))?;
    let transport = parse_script(script)?;
    let engine = build_engine(&opts)?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("Cancelling...");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        for run in 1..=opts.runs {
            let result = engine
                .deliver_with_cancel(&opts.sample, &cancel, |strategy, ctx| {
                    transport.operation(strategy, ctx)
                })
                .await;
            match result {
                Ok(success) => println!(
                    "run {}: delivered '{}' via {} (attempt {}, {} total)",
                    run, success.value, success.strategy, success.attempt, success.total_attempts
                ),
                Err(e) => println!("run {}: {}", run, e),
            }
            if cancel.is_cancelled() {
                break;
            }
        }
    });

    let snapshot = engine.metrics_snapshot();
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("Success rates:");
        for (name, rate) in &snapshot.success_rates {
            let totals = &snapshot.totals[name];
            println!(
                "  {}: {:.3} ({} ok / {} failed, {} timeouts)",
                name, rate, totals.successes, totals.failures, totals.timeouts
            );
        }
        println!("Recent error rate: {:.2}", engine.recent_error_rate());
    }
    Ok(())
}
