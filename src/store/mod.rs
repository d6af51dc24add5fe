//! 持久化层：受管阈值的单文件存储

pub mod persistence;

pub use persistence::{install_dir, ConfigStore, CONFIG_FILE_NAME};
