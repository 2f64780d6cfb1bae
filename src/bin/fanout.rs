//! fanout – run a publisher, a subscriber, or the whole demo.
//
//  $ fanout publish --rounds 3 Technology Weather
//  $ fanout subscribe C2 Technology Weather
//  $ fanout demo --config fanout.toml
use std::process::ExitStatus;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tokio::process::{Child, Command as ChildCommand};
use tracing::{info, warn};

use fanout::core::publisher::Publisher;
use fanout::core::subscriber::Subscriber;
use fanout::logging::init_logging;
use fanout::Config;

#[derive(Debug, Parser)]
#[command(name = "fanout", version, about = "Topic-based fan-out publisher and subscribers")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bind the publisher and emit every round.
    Publish {
        /// Path to config TOML (env FANOUT_CONFIG is used when absent)
        #[arg(short, long)]
        config: Option<String>,
        /// Listen address, e.g. tcp://*:56565 or inproc://news
        #[arg(short, long)]
        address: Option<String>,
        #[arg(short, long)]
        rounds: Option<usize>,
        /// Pause before each message
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Subscribers to wait for before publishing
        #[arg(long)]
        wait_for: Option<usize>,
        /// Topics to publish (defaults to the configured list)
        topics: Vec<String>,
    },
    /// Connect one subscriber and print what it receives.
    Subscribe {
        name: String,
        #[arg(required = true)]
        topics: Vec<String>,
        #[arg(short, long)]
        config: Option<String>,
        /// Publisher address
        #[arg(short, long)]
        address: Option<String>,
        /// Messages to receive before exiting
        #[arg(short, long)]
        expected: Option<usize>,
        /// Receive timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Publisher plus one subscriber process per configured demo subscriber.
    Demo {
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Publish {
            config,
            address,
            rounds,
            interval_ms,
            wait_for,
            topics,
        } => {
            let mut cfg = Config::load(config.as_deref()).context("loading configuration")?;
            if let Some(address) = address {
                cfg.publisher.address = address;
            }
            if let Some(rounds) = rounds {
                cfg.publisher.rounds = rounds;
            }
            if let Some(interval_ms) = interval_ms {
                cfg.publisher.interval_ms = interval_ms;
            }
            if let Some(wait_for) = wait_for {
                cfg.publisher.wait_for_peers = wait_for;
            }
            if !topics.is_empty() {
                cfg.publisher.topics = topics;
            }
            cfg.validate()?;
            publish(&cfg).await?;
        }
        Command::Subscribe {
            name,
            topics,
            config,
            address,
            expected,
            timeout_ms,
        } => {
            let mut cfg = Config::load(config.as_deref()).context("loading configuration")?;
            if let Some(address) = address {
                cfg.publisher.address = address;
            }
            if let Some(expected) = expected {
                cfg.subscriber.expected_messages = Some(expected);
            }
            if let Some(timeout_ms) = timeout_ms {
                cfg.subscriber.receive_timeout_ms = timeout_ms;
            }
            subscribe(&cfg, name, topics).await?;
        }
        Command::Demo { config } => {
            let cfg = Config::load(config.as_deref()).context("loading configuration")?;
            demo(&cfg, config.as_deref()).await?;
        }
    }
    Ok(())
}

async fn publish(cfg: &Config) -> anyhow::Result<()> {
    let publisher = Publisher::bind(cfg.publisher_config()).await?;
    println!("Publisher bound to {}", publisher.endpoint().local_address());

    if cfg.publisher.wait_for_peers > 0 {
        publisher
            .endpoint()
            .wait_for_peers(cfg.publisher.wait_for_peers, cfg.wait_timeout())
            .await
            .context("waiting for subscribers")?;
    }

    let report = publisher.publish_rounds().await;
    let drained = publisher.shutdown().await;
    let report = report?;
    drained.context("flushing subscribers")?;
    println!(
        "Published {} messages over {} rounds",
        report.messages_sent, report.rounds
    );
    Ok(())
}

async fn subscribe(cfg: &Config, name: String, topics: Vec<String>) -> anyhow::Result<()> {
    println!("{name} is starting.");
    let config = cfg.subscriber_config(name.as_str(), topics);
    let report = Subscriber::run_with(config, |client, message| {
        println!("Client {client} received: {message}");
    })
    .await
    .with_context(|| format!("subscriber {name}"))?;

    info!(received = report.received, dropped = report.dropped, "subscriber finished");
    println!("Client {name} ends.");
    Ok(())
}

// ───────────────────────────────────────────────────────────
// Demo orchestration
// ───────────────────────────────────────────────────────────
async fn demo(cfg: &Config, config_path: Option<&str>) -> anyhow::Result<()> {
    // Bound before any subscriber dials so none of them races the listener.
    let publisher = Publisher::bind(cfg.publisher_config()).await?;
    let bound = publisher.endpoint().local_address();
    if bound.scheme() == "inproc" {
        bail!("demo subscribers are separate processes and cannot dial {bound}");
    }
    let address = bound.to_string();
    info!(%address, "demo publisher bound");

    let exe = std::env::current_exe().context("locating the fanout executable")?;
    let mut children = Vec::with_capacity(cfg.demo.subscribers.len());
    for sub in &cfg.demo.subscribers {
        let mut cmd = ChildCommand::new(&exe);
        cmd.arg("subscribe")
            .arg(&sub.name)
            .args(&sub.topics)
            .arg("--address")
            .arg(dial_address(&address))
            .kill_on_drop(true);
        if let Some(path) = config_path {
            cmd.arg("--config").arg(path);
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("spawning subscriber {}", sub.name))?;
        children.push((sub.name.clone(), child));
    }

    let attached = publisher
        .endpoint()
        .wait_for_peers(children.len(), cfg.wait_timeout())
        .await;
    if let Err(err) = attached {
        warn!(error = %err, "publishing before every subscriber attached");
    }

    // On failure the children are dropped, which kills them.
    let report = match publisher.publish_rounds().await {
        Ok(report) => report,
        Err(err) => {
            publisher.close();
            return Err(err.into());
        }
    };
    if let Err(err) = publisher.shutdown().await {
        warn!(error = %err, "some subscriber was not fully flushed");
    }
    let statuses = wait_children(children).await;
    info!(messages = report.messages_sent, "demo publisher finished");

    let mut failed = 0;
    for (name, status) in statuses {
        match status {
            Ok(status) if status.success() => info!(subscriber = %name, "exited cleanly"),
            Ok(status) => {
                failed += 1;
                warn!(subscriber = %name, %status, "exited with failure");
            }
            Err(err) => {
                failed += 1;
                warn!(subscriber = %name, error = %err, "could not be awaited");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} subscriber(s) failed");
    }
    Ok(())
}

/// Children must dial a concrete host even when the publisher binds `*`.
fn dial_address(bound: &str) -> String {
    bound
        .replacen("tcp://*:", "tcp://127.0.0.1:", 1)
        .replacen("tcp://0.0.0.0:", "tcp://127.0.0.1:", 1)
}

async fn wait_children(children: Vec<(String, Child)>) -> Vec<(String, std::io::Result<ExitStatus>)> {
    join_all(children.into_iter().map(|(name, mut child)| async move {
        let status = child.wait().await;
        (name, status)
    }))
    .await
}
