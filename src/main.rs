use clap::{Parser, Subcommand};
use gtk4::glib;
use gtk4::prelude::*;
use gtk4::{Application, ApplicationWindow, Orientation};
use log::{debug, error, info, warn};
use rg_bar::config::AppConfig;
use rg_bar::ipc::{self, IpcServer};
use rg_bar::ui::{apply_stylesheet, compose_stylesheet, GtkRenderer};
use rg_bar::Bar;
use rg_bar_core::ui_channel;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

const APP_ID: &str = "com.github.hilgardt_collab.rg_bar";

/// rg-bar - A modular status bar for Linux
#[derive(Parser, Debug, Clone)]
#[command(name = "rg-bar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the default location
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Send a message to the running bar (e.g. `rg-bar msg "text:hello"`)
    Msg {
        message: String,
    },
    /// List the built-in module types
    Modules,
}

fn main() {
    let cli = Cli::parse();

    // Level 0 (default): warn only
    // Level 1: info
    // Level 2: debug
    // Level 3+: trace
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Allow RUST_LOG to override CLI setting
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = load_config(&cli);

    match cli.command {
        Some(Command::Msg { message }) => send_message(&config, &message),
        Some(Command::Modules) => {
            for name in rg_bar_modules::BUILTIN_MODULES {
                println!("{}", name);
            }
        }
        None => run_bar(config),
    }
}

/// Load the config from `--config` or the default location, falling back to
/// defaults on error
fn load_config(cli: &Cli) -> AppConfig {
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using defaults: {:#}", e);
            AppConfig::default()
        }
    }
}

fn send_message(config: &AppConfig, message: &str) {
    let path = config.ipc.socket_path();
    match ipc::send_message(&path, message) {
        Ok(reply) => {
            println!("{}", reply);
            if reply != ipc::REPLY_OK {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_bar(config: AppConfig) {
    warn!("Starting rg-bar v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rg-bar-worker")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let app = Application::builder().application_id(APP_ID).build();
    let handle = runtime.handle().clone();
    app.connect_activate(move |app| build_ui(app, &handle, &config));

    // Pass empty args since we already parsed them
    app.run_with_args(&["rg-bar"]);

    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("rg-bar exited");
}

fn build_ui(app: &Application, handle: &Handle, config: &AppConfig) {
    info!("Building UI");

    let window = ApplicationWindow::builder()
        .application(app)
        .title("rg-bar")
        .default_height(config.bar.height)
        .decorated(false)
        .build();
    window.add_css_class("rg-bar");

    let container = gtk4::Box::new(Orientation::Horizontal, config.bar.spacing);
    window.set_child(Some(&container));

    let base_provider = apply_stylesheet(
        &compose_stylesheet(config.bar.css.as_deref(), std::iter::empty()),
        None,
    );

    // UI task queue, drained by the GTK main context
    let (ui, ui_loop) = ui_channel();
    let bar = Arc::new(Bar::new(
        ui,
        handle.clone(),
        config.scheduler.sweep_interval(),
    ));
    if let Err(e) = bar.register_builtin_factories() {
        error!("{:#}", e);
    }

    let scheduler = Arc::clone(bar.scheduler());
    let renderer = GtkRenderer::new(
        container,
        Rc::new(move |name: &str| {
            if !scheduler.handle_click(name) {
                debug!("Click on {} ignored", name);
            }
        }),
    );
    glib::MainContext::default().spawn_local(ui_loop.with_renderer(Box::new(renderer)).run());

    // Modules load on the worker runtime; their widgets are realized through
    // the UI queue as they come up
    let entries = config.modules.clone();
    let bar_for_load = Arc::clone(&bar);
    let load = handle.spawn(async move {
        let added = bar_for_load.load_modules(&entries).await;
        info!("Loaded {} of {} module(s)", added, entries.len());
        bar_for_load.module_styles()
    });
    let user_css = config.bar.css.clone();
    glib::MainContext::default().spawn_local(async move {
        match load.await {
            Ok(styles) if !styles.is_empty() => {
                let css = compose_stylesheet(
                    user_css.as_deref(),
                    styles.iter().map(String::as_str),
                );
                apply_stylesheet(&css, base_provider.as_ref());
            }
            Ok(_) => {}
            Err(e) => error!("Module loading task failed: {}", e),
        }
    });

    let ipc_token = CancellationToken::new();
    start_ipc_server(config, handle, &bar, &ipc_token);

    window.connect_close_request(move |_| {
        ipc_token.cancel();
        bar.shutdown();
        glib::Propagation::Proceed
    });

    window.present();
}

fn start_ipc_server(
    config: &AppConfig,
    handle: &Handle,
    bar: &Arc<Bar>,
    token: &CancellationToken,
) {
    let path = config.ipc.socket_path();
    let server = {
        let _guard = handle.enter();
        IpcServer::bind(&path)
    };
    match server {
        Ok(server) => {
            handle.spawn(server.serve(Arc::clone(bar.scheduler()), token.clone()));
        }
        Err(e) => warn!("Message socket disabled: {:#}", e),
    }
}
