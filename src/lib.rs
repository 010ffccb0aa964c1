#[macro_use]
extern crate tracing;

mod app;
mod errors;
mod logging;
pub mod output;
mod progress;

pub use app::App;
pub use bpfstat_config::Args;
pub use errors::init_errors;
pub use logging::init_logging;
