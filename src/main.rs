use anyhow::{Context, Result};
use tokio::sync::mpsc;

use soundbox::announce::Announcer;
use soundbox::audio::{ClipDevice, LogDevice, PlaybackDevice, Player};
use soundbox::chain::{ChainWatcher, RateProvider};
use soundbox::config::{Config, DeviceKind, RateMode};
use soundbox::ledger::FileLedger;
use soundbox::soundbox::{Outcome, Soundbox};
use soundbox::telemetry;

/// Transaction events buffered while an announcement is playing
const EVENT_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded");

    telemetry::init(&config.telemetry)?;
    tracing::info!("soundbox starting");
    println!("✓ Telemetry initialized");

    let announcer = Announcer::new(config.audio.pacing()?);

    match config.audio.device {
        DeviceKind::Log => run(&config, Player::new(announcer, LogDevice::new())).await,
        DeviceKind::Clips => {
            let clips_dir = Config::expand_path(&config.audio.clips_dir)?;
            let device = ClipDevice::open(&clips_dir)?;
            println!("✓ Clip playback ready: {}", clips_dir.display());
            run(&config, Player::new(announcer, device)).await
        }
    }
}

async fn run<D: PlaybackDevice>(config: &Config, player: Player<D>) -> Result<()> {
    let ledger_path = Config::expand_path(&config.ledger.path)?;
    let ledger = FileLedger::open(&ledger_path).context("failed to open ledger")?;

    let rates = match config.exchange.mode {
        RateMode::Live => RateProvider::live(&config.exchange.url, config.exchange.fallback_rate)
            .context("failed to build HTTP client")?,
        RateMode::Fixed => RateProvider::Fixed(config.exchange.fallback_rate),
    };

    let mut soundbox = Soundbox::new(&config.merchant.address, player, ledger);

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE);
    let mut watcher = tokio::spawn(ChainWatcher::new(config.watcher()).run(events_tx));

    tracing::info!(merchant = %config.merchant.address, "listening for transactions");
    println!("\nSoundbox is running. Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => {
                if let Some(reason) = soundbox.screen(&event) {
                    tracing::debug!(hash = %event.hash, reason = ?reason, "transaction ignored");
                    continue;
                }

                let rate = rates.current().await;
                match soundbox.handle(&event, rate).await {
                    Ok(Outcome::Announced { amount, report }) => {
                        tracing::info!(
                            hash = %event.hash,
                            amount = %amount,
                            played = report.played,
                            skipped = report.skipped,
                            "transaction announced"
                        );
                    }
                    Ok(Outcome::Ignored(reason)) => {
                        tracing::debug!(hash = %event.hash, reason = ?reason, "transaction ignored");
                    }
                    Err(e) => {
                        tracing::error!(hash = %event.hash, error = %e, "failed to announce transaction");
                    }
                }
            }

            result = &mut watcher => {
                result.context("chain watcher task failed")??;
                tracing::info!("chain watcher stopped");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                println!("\nShutting down...");
                break;
            }
        }
    }

    watcher.abort();
    Ok(())
}
