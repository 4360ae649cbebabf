use std::path::Path;

use tpsbench_report::{inclusion::read_rows, TpsReport};
use tracing::{info, warn};

use crate::error::CliError;

pub fn tps(file: &Path) -> Result<(), CliError> {
    let rows = read_rows(file)?;
    info!("loaded {} rows from {file:?}", rows.len());
    match TpsReport::compute(&rows) {
        Some(report) => print!("{report}"),
        None => warn!("no included transactions in {file:?}"),
    }
    Ok(())
}
