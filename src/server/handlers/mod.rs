// API处理器模块

pub mod explorer;
pub mod info;

pub use explorer::{download_file, download_folder, get_tree, search};
pub use info::{get_info, health_check};
