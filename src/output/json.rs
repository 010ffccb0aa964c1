use bpfstat_collector::Parameter;
use std::io::{
    self,
    Write,
};

pub(super) fn render<W: Write>(parameter: &Parameter, pretty: bool, out: &mut W) -> io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, parameter)?;
    } else {
        serde_json::to_writer(&mut *out, parameter)?;
    }
    writeln!(out)
}
