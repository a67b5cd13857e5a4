// UI module - Slint windows and the glue between them and the services
//
// This module contains:
// - EventLoopBridge: Coordinates between tokio async runtime and Slint event loop
// - forms: the app.conf and modpack.conf input windows
// - GuiController: progress window driving a modpack sync

// Include the generated Slint code (AppConfigWindow, ModpackConfigWindow, MainWindow)
slint::include_modules!();

pub mod bridge;
pub mod controller;
pub mod forms;

pub use bridge::{EventLoopBridge, EventLoopBridgeHandle};
pub use controller::GuiController;
pub use forms::{run_app_config_form, run_modpack_config_form};
