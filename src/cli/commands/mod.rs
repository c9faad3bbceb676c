mod ask;
mod config;
mod health;
mod index;
mod ingest;
mod search;
mod serve;
mod status;

pub use ask::AskArgs;
pub use config::ConfigCommand;
pub use index::IndexCommand;
pub use ingest::IngestArgs;
pub use search::SearchArgs;
pub use serve::{ServeArgs, ServeCommand};

pub use ask::handle_ask;
pub use config::handle_config;
pub use health::handle_health;
pub use index::handle_index;
pub use ingest::handle_ingest;
pub use search::handle_search;
pub use serve::handle_serve;
pub use status::handle_status;
