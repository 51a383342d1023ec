pub mod settings_persistence;
pub mod time;

pub use settings_persistence::{
    auto_save_app_settings, get_settings_file_path, load_app_settings, save_app_settings,
};
pub use time::{LogClock, format_duration, parse_time_of_day};
