mod requests_logging;
pub mod server;
pub mod state;

pub use requests_logging::RequestsLoggingLevel;
pub use server::{make_app, run_server};
pub use state::ServerState;
