//! Renders a finished [`Parameter`] for humans or machines.

mod json;
mod text;

use bpfstat_collector::Parameter;
pub use bpfstat_config::OutputFormat;
use std::io::{
    self,
    Write,
};
pub(crate) use text::format_nanos;

pub fn render<W: Write>(parameter: &Parameter, format: OutputFormat, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Text => text::render(parameter, out),
        OutputFormat::Json { pretty } => json::render(parameter, pretty, out),
    }
}
