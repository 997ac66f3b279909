pub mod configuration;
pub use configuration::Config;

pub mod error_handling;
pub use error_handling::{ConfigError, StorageError, WebError};

pub mod ingestion;
pub use ingestion::{Dispatcher, IngestRule};

pub mod storage;
pub use storage::{Backend, Data, Storer};

pub mod web_interface;
pub use web_interface::WebServer;
