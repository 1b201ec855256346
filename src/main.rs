#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() -> eframe::Result {
    env_logger::init();

    // Fail fast on missing credentials instead of surfacing an opaque network
    // error after the window is already up.
    let config = match mathink::SessionConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title("MathInk"),
        ..Default::default()
    };
    eframe::run_native(
        "mathink",
        native_options,
        Box::new(|cc| Ok(Box::new(mathink::MathInkApp::new(cc, config)))),
    )
}
