// Learn more about Tauri commands at https://tauri.app/develop/calling-rust/
#[cfg_attr(not(feature = "app"), allow(dead_code))]
mod commands;
pub mod events;
pub mod logging;
pub mod models;
pub mod projection;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod store;
pub mod tasks;
pub mod transfer;

pub use commands::CommandResult;
pub use state::{AppState, MountOptions};

#[cfg(all(feature = "app", not(test)))]
use std::sync::Arc;
#[cfg(all(feature = "app", not(test)))]
use tauri::{Manager, WindowEvent};

#[cfg(all(feature = "app", not(test)))]
use crate::commands::*;
#[cfg(all(feature = "app", not(test)))]
use crate::logging::init_logging;
#[cfg(all(feature = "app", not(test)))]
use crate::scheduler::Scheduler;
#[cfg(all(feature = "app", not(test)))]
use crate::storage::Storage;
#[cfg(all(feature = "app", not(test)))]
use crate::store::{load_settings, FileStore};

#[cfg(all(feature = "app", not(test)))]
fn to_theme(theme: tauri::Theme) -> Option<models::Theme> {
    match theme {
        tauri::Theme::Light => Some(models::Theme::Light),
        tauri::Theme::Dark => Some(models::Theme::Dark),
        _ => None,
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
#[cfg(all(feature = "app", not(test)))]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let root = app.path().app_data_dir()?;
            if let Err(err) = init_logging(&root) {
                eprintln!("failed to initialize logging: {err}");
            }

            let store = FileStore::new(root.clone());
            store.ensure_dirs()?;
            let settings = load_settings(&root);

            let system_theme = app
                .get_webview_window("main")
                .and_then(|window| window.theme().ok())
                .and_then(to_theme);
            let handle =
                tauri::async_runtime::block_on(async { tokio::runtime::Handle::current() });

            let state = AppState::mount(
                Storage::new(Arc::new(store)),
                settings,
                MountOptions {
                    sink: Arc::new(TauriEventSink::new(app.handle().clone())),
                    scheduler: Scheduler::from_handle(handle),
                    system_theme,
                },
            );
            app.manage(state);

            Ok(())
        })
        .on_window_event(|window, event| {
            if window.label() != "main" {
                return;
            }
            match event {
                WindowEvent::ThemeChanged(theme) => {
                    if let Some(theme) = to_theme(*theme) {
                        window
                            .app_handle()
                            .state::<AppState>()
                            .system_theme_changed(theme);
                    }
                }
                WindowEvent::Destroyed => {
                    window.app_handle().state::<AppState>().shutdown();
                }
                _ => {}
            }
        })
        .invoke_handler(tauri::generate_handler![
            load_state,
            set_filter,
            set_search,
            set_sort,
            set_theme,
            toggle_theme,
            follow_system_theme,
            set_draft_text,
            set_draft_priority,
            submit_draft,
            add_task,
            toggle_task,
            toggle_all,
            clear_completed,
            start_edit,
            update_edit_draft,
            cancel_edit,
            save_edit,
            delete_task,
            undo_delete,
            reorder_task,
            start_drag,
            drop_on,
            end_drag,
            import_tasks,
            import_tasks_from_path,
            export_tasks,
            export_tasks_to_dir,
            dismiss_notification,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
