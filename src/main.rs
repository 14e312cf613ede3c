use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::io::Write;
use std::process::ExitCode;

mod api;
mod cli;
mod error;
mod metrics;
mod models;
mod services;
mod state;

use api::{control_bot, get_bot_status, get_logs, get_metrics, get_portfolio, get_trading_pairs, health};
use cli::{CommandArgs, Commands, LogCategory, Settings};
use error::SupervisorError;
use models::status::format_uptime;
use models::HealthAction;
use services::health_monitor::last_result;
use services::service_installer::InstallOutcome;
use services::{log_manager, RotatingWriter, ServiceDescriptor, ServiceInstaller, Systemctl};
use state::new_state;

/// LSB 约定：status 在服务未运行时返回 3
const EXIT_NOT_RUNNING: u8 = 3;

fn main() -> ExitCode {
    let args = CommandArgs::parse();
    let settings = Settings::from_args(&args);

    init_logging(&settings, matches!(args.command, Commands::Serve { .. }));

    match run(args.command, settings) {
        Ok(code) => code,
        Err(e) => {
            log::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(settings: &Settings, foreground: bool) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&settings.log_filter);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - DAEMON - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    match RotatingWriter::open(settings.daemon_log()) {
        Ok(writer) => {
            let writer = if foreground { writer.mirror_stderr(true) } else { writer };
            builder.target(env_logger::Target::Pipe(Box::new(writer)));
        }
        Err(e) => {
            eprintln!(
                "⚠️  Cannot open {}: {}, logging to stderr",
                settings.daemon_log().path.display(),
                e
            );
        }
    }
    builder.init();
}

fn run(command: Commands, settings: Settings) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Start { respect_halt } => {
            let controller = settings.controller();
            let outcome = if respect_halt {
                controller.start_unattended()?
            } else {
                controller.start()?
            };
            println!("✅ {}", outcome);
        }
        Commands::Stop => {
            let outcome = settings.controller().stop()?;
            println!("✅ {}", outcome);
        }
        Commands::Restart => {
            let outcome = settings.controller().restart()?;
            println!("✅ {}", outcome);
        }
        Commands::Status => return Ok(print_status(&settings)),
        Commands::Logs { category, lines } => {
            let path = match category {
                LogCategory::Daemon => settings.daemon_log().path,
                LogCategory::Engine => settings.engine_log().path,
                LogCategory::System => settings.health_log_path(),
            };
            let tail = log_manager::tail(&path, lines);
            if tail.is_empty() {
                println!("📭 {} is empty or missing", path.display());
            }
            for line in tail {
                println!("{}", line);
            }
        }
        Commands::Backup => {
            let target = settings
                .backup_manager()
                .backup(&settings.backup_sources())?;
            println!("💾 Backup written to {}", target.display());
        }
        Commands::Check => {
            let monitor = settings.monitor();
            let result = monitor.run_cycle()?;
            let detail = result.detail.clone().unwrap_or_default();
            println!(
                "🔍 alive={} action={:?} {}",
                result.alive, result.action, detail
            );
            if result.action == HealthAction::Halted {
                let ledger = monitor.ledger();
                return Err(SupervisorError::CrashLoopHalted {
                    restarts: ledger.count(),
                    window: monitor.policy().window,
                }
                .into());
            }
        }
        Commands::InstallService { unit_dir } => {
            let exe = std::env::current_exe()?;
            let home = std::fs::canonicalize(&settings.home)?;
            let descriptor = ServiceDescriptor::for_executable(&exe, &home, settings.stop_timeout);
            let installer = ServiceInstaller::new(Systemctl, unit_dir);
            match installer.install(&descriptor)? {
                InstallOutcome::Installed => {
                    println!("✅ Installed {}", installer.unit_path().display())
                }
                InstallOutcome::Unchanged => {
                    println!("ℹ️  {} already up to date", installer.unit_path().display())
                }
            }
        }
        Commands::UninstallService { unit_dir } => {
            let installer = ServiceInstaller::new(Systemctl, unit_dir);
            if installer.uninstall()? {
                println!("🗑️  Removed {}", installer.unit_path().display());
            } else {
                println!("ℹ️  Service is not installed");
            }
        }
        Commands::RelayLog => {
            let mut writer = RotatingWriter::open(settings.engine_log())?;
            let bytes = log_manager::relay(std::io::stdin().lock(), &mut writer)?;
            log::debug!("Engine log relay finished after {} bytes", bytes);
        }
        Commands::Serve { port, address } => serve(settings, address, port)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn print_status(settings: &Settings) -> ExitCode {
    let report = settings.supervisor().status();
    let mut ledger = settings.monitor().ledger();
    ledger.evict(chrono::Utc::now(), settings.restart_policy.window);

    println!("📊 Trading bot status");
    let code = match &report.record {
        Some(record) => {
            println!("  State:      RUNNING");
            println!("  PID:        {}", record.pid);
            println!("  Started at: {}", record.started_at.to_rfc3339());
            println!("  Uptime:     {}", format_uptime(report.stats.uptime_secs));
            println!("  CPU:        {:.1}%", report.stats.cpu_usage);
            println!("  Memory:     {:.1} MB", report.stats.memory_mb());
            ExitCode::SUCCESS
        }
        None => {
            println!("  State:      STOPPED");
            ExitCode::from(EXIT_NOT_RUNNING)
        }
    };
    println!("  Restarts:   {} in window{}", ledger.count(), if ledger.halted { " (HALTED, manual start required)" } else { "" });
    match last_result(&settings.health_log_path()) {
        Some(check) => println!(
            "  Last check: {} alive={} action={:?}",
            check.timestamp.to_rfc3339(),
            check.alive,
            check.action
        ),
        None => println!("  Last check: never"),
    }
    code
}

fn serve(settings: Settings, address: String, port: u16) -> anyhow::Result<()> {
    let bind_address = format!("{}:{}", address, port);
    let health_interval = settings.health_interval;
    let monitor = settings.monitor();
    let state = new_state(settings);

    print_banner(&bind_address);

    actix_rt::System::new().block_on(async move {
        actix_rt::spawn(monitor.run_periodic(health_interval));

        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/bot/status", web::get().to(get_bot_status))
                .route("/api/bot/{action}", web::post().to(control_bot))
                .route("/api/trading/pairs", web::get().to(get_trading_pairs))
                .route("/api/portfolio", web::get().to(get_portfolio))
                .route("/api/logs", web::get().to(get_logs))
                .route("/metrics", web::get().to(get_metrics))
                .route("/health", web::get().to(health))
        })
        .bind(&bind_address)?
        .run()
        .await
    })?;
    Ok(())
}

fn print_banner(bind_address: &str) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      Bot Supervisor v{:<37}║", env!("CARGO_PKG_VERSION"));
    println!("║      Trading engine watchdog & status API                 ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Server starting on http://{}", bind_address);
    println!();
    println!("📋 Available endpoints:");
    println!("  GET    /api/bot/status         - Engine process status");
    println!("  POST   /api/bot/{{action}}       - start | stop | restart");
    println!("  GET    /api/trading/pairs      - Engine-reported trading pairs");
    println!("  GET    /api/portfolio          - Engine-reported portfolio");
    println!("  GET    /api/logs?limit=N       - Recent engine and daemon log entries");
    println!("  GET    /metrics                - Prometheus metrics");
    println!("  GET    /health                 - Health check");
    println!("═══════════════════════════════════════════════════════════");
}
