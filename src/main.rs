use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use eframe::egui;

use chat_canvas::gui::frontend::CanvasApp;
use chat_canvas::persistence::persist;
use chat_canvas::persistence::settings::AppSettings;

fn main() -> eframe::Result {
    env_logger::init();

    let matches = Command::new("Chat-Canvas")
        .about("Infinite canvas for branching AI chat conversations")
        .arg(Arg::new("import").long("import").value_name("FILE").help("Load a session file at startup"))
        .arg(Arg::new("no_autosave").long("no-autosave").action(ArgAction::SetTrue).help("Disable the periodic autosave"))
        .arg(Arg::new("autosave_dir").long("autosave-dir").value_name("DIR").help("Autosave directory for this run"))
        .get_matches();

    let settings = AppSettings::load().unwrap_or_else(|e| {
        log::warn!("settings unreadable, using defaults: {}", e);
        AppSettings::default()
    });
    let autosave_dir = matches.get_one::<String>("autosave_dir").map(PathBuf::from);
    let autosave_enabled = !matches.get_flag("no_autosave");
    // The app keeps (and may save) the persisted settings; the CLI dir only
    // reaches the persistence layer.
    persist::set_settings_override(settings.for_run(autosave_dir));

    let records = match matches.get_one::<String>("import") {
        Some(path) => match persist::read_session_file(&PathBuf::from(path)) {
            Ok(records) => records,
            Err(e) => {
                log::error!("could not import {}: {}", path, e);
                None
            }
        },
        None if autosave_enabled => persist::load_active().unwrap_or_else(|e| {
            log::error!("could not read autosave: {}", e);
            None
        }),
        None => None,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1300.0, 710.0])
            // Provide sensible bounds so the UI stays usable on small screens
            .with_min_inner_size([700.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Chat-Canvas",
        options,
        Box::new(move |_cc| Ok(Box::new(CanvasApp::from_records(settings, autosave_enabled, records)) as Box<dyn eframe::App>)),
    )
}
