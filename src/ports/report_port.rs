//! Weekly report generation port.

use crate::domain::error::TraderError;
use crate::domain::report::WeeklyReport;

/// Port for writing weekly rebalance reports.
pub trait ReportPort {
    fn render(&self, report: &WeeklyReport) -> String;

    /// Default implementation: writes the rendered text to `output_path`.
    fn write(&self, report: &WeeklyReport, output_path: &str) -> Result<(), TraderError> {
        std::fs::write(output_path, self.render(report))?;
        Ok(())
    }
}
