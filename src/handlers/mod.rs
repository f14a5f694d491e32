pub mod files;
pub mod health;
pub mod threads;

pub use files::{delete_file, list_files, upload_file};
pub use health::health_check;
pub use threads::create_message;
