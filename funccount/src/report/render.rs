//! Text rendering of one interval's counts

use std::io::{self, Write};

use crate::instrumentation::CountSnapshot;
use crate::probe::MatchTable;

/// Width of the `FUNC` column
pub const NAME_WIDTH: usize = 36;
/// Width of the `COUNT` column
pub const COUNT_WIDTH: usize = 8;

/// Write one report: blank line, optional timestamp, header, then the
/// non-zero locations in ascending count order.
///
/// Locations the table does not know are skipped.
///
/// # Errors
/// Returns an error if writing to `out` fails
pub fn render_report<W: Write>(
    out: &mut W,
    table: &MatchTable,
    snapshot: &CountSnapshot,
    timestamp: Option<&str>,
) -> io::Result<()> {
    writeln!(out)?;
    if let Some(timestamp) = timestamp {
        writeln!(out, "{timestamp:<8}")?;
    }
    writeln!(out, "{:<NAME_WIDTH$} {:>COUNT_WIDTH$}", "FUNC", "COUNT")?;
    for (location, count) in snapshot.nonzero_ascending() {
        if let Some(name) = table.name(location) {
            writeln!(out, "{name:<NAME_WIDTH$} {count:>COUNT_WIDTH$}")?;
        }
    }
    out.flush()
}
