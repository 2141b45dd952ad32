use clap::{Parser, Subcommand};
use invest_alert_core::alert::{runner, AlertSystem};
use invest_alert_core::domain::alert::AlertKind;
use invest_alert_core::storage::preferences;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "invest_alert_worker", about = "Morning picks / evening volume alerts")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the clock and fire alerts at the configured times.
    Run {
        /// Polling period in seconds. Defaults to ALERT_POLL_SECS (60).
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Fire one alert now, regardless of the schedule and toggles.
    Fire {
        kind: AlertKind,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the current local time and the alert schedule.
    Status,
    /// Show or change the morning/evening toggles.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Debug, Subcommand)]
enum PrefsAction {
    Show,
    Set {
        kind: AlertKind,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = invest_alert_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(args.command, &settings).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker command failed");
    }
    res
}

async fn run(command: Command, settings: &invest_alert_core::config::Settings) -> anyhow::Result<()> {
    let system = Arc::new(AlertSystem::from_settings(settings).await?);

    match command {
        Command::Run { interval_secs } => {
            let secs = interval_secs.unwrap_or(settings.poll_secs);
            anyhow::ensure!(secs >= 1, "--interval-secs must be >= 1");
            runner::run_polling(
                system,
                Duration::from_secs(secs),
                chrono::Utc::now,
                shutdown_signal(),
            )
            .await;
        }
        Command::Fire { kind, json } => {
            let outcome = system.fire(kind, chrono::Utc::now()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{} 알림 테스트 완료!\n{}", kind_label(kind), outcome.message);
                print!("{}", system.panel().render().await.to_text());
            }
        }
        Command::Status => {
            let status = system.status(chrono::Utc::now()).await;
            println!("현재 시간: {}", status.now);
            println!();
            println!("자동 알림 시간:");
            println!("• {} (추천종목)", status.morning);
            println!("• {} (거래대금)", status.evening);
            println!();
            println!(
                "마지막 알림: 오전 {}, 저녁 {}",
                fired_label(status.morning_last_fired),
                fired_label(status.evening_last_fired)
            );
        }
        Command::Prefs { action } => match action {
            PrefsAction::Show => {
                let prefs = preferences::load(system.store()).await?;
                println!("morning: {}", on_off(prefs.morning_enabled));
                println!("evening: {}", on_off(prefs.evening_enabled));
            }
            PrefsAction::Set { kind, enabled } => {
                preferences::set_enabled(system.store(), kind, enabled).await?;
                println!("{}: {}", kind, on_off(enabled));
            }
        },
    }

    Ok(())
}

fn fired_label(date: Option<chrono::NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn kind_label(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Morning => "오전",
        AlertKind::Evening => "저녁",
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(
    settings: &invest_alert_core::config::Settings,
) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
