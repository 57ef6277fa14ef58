use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use market_pulse::report::render_status_table;
use market_pulse::utils::now_timestamp_ms;
use market_pulse::{BinanceProvider, Cli, MarketEngine};

fn init_log(verbose: bool) {
    let (global_level, my_code_level) = if cfg!(debug_assertions) || verbose {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Error, log::LevelFilter::Warn)
    };

    let mut builder = env_logger::Builder::new();

    builder
        .filter(None, global_level)
        .filter(Some("market_pulse"), my_code_level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));

    let args = Cli::parse();
    init_log(args.verbose);

    let config = args.engine_config().context("loading configuration")?;
    let provider = BinanceProvider::new().context("building Binance client")?;
    let engine = MarketEngine::start(config, Arc::new(provider))?;

    let _signals = engine.on_signal(|signal| {
        println!(
            "[SIGNAL] {} {} strength={:+.2} consistency={:.0}% volatility={:?} timeframes={}",
            signal.symbol,
            signal.overall_trend,
            signal.overall_strength,
            signal.trend_consistency * 100.0,
            signal.volatility_profile,
            signal.signals.len()
        );
    });
    let _breakouts = engine.on_breakout(|alert| {
        println!(
            "[BREAKOUT] {} {} {} on {}: {:.6} -> {:.6} ({:+.2}%)",
            alert.symbol,
            alert.breakout_type,
            alert.direction,
            alert.timeframe,
            alert.price_at_breakout,
            alert.current_price,
            alert.percentage_move
        );
    });

    let mut status_tick = (args.status_every > 0)
        .then(|| tokio::time::interval(Duration::from_secs(args.status_every)));

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("listening for ctrl-c")?;
                log::warn!("Ctrl-C received, shutting down...");
                break;
            }
            _ = async {
                match status_tick.as_mut() {
                    Some(tick) => { tick.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                let states = engine.market_states();
                println!("{}", engine.status().await);
                println!(
                    "{}",
                    render_status_table(states.iter().map(|s| s.as_ref()), now_timestamp_ms())
                );
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}
