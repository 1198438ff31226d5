mod loader;
mod ping;
mod root;
mod scan;
mod telemetry;

pub use loader::load_from_path;
pub use ping::PingConfig;
pub use root::Config;
pub use scan::ScanConfig;
pub use telemetry::LoggingConfig;
