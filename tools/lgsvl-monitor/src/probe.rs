use crate::errors::MonitorError;
use crate::runtime::{ProcessEntry, ProcessTable};

#[derive(Clone, Copy)]
pub struct ProcessProbe<'a> {
    table: &'a dyn ProcessTable,
}

impl<'a> ProcessProbe<'a> {
    pub fn new(table: &'a dyn ProcessTable) -> Self {
        Self { table }
    }

    pub fn is_running(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        self.table
            .snapshot()
            .iter()
            .any(|entry| name_matches(entry, &needle))
    }

    /// Signals the first matching process only; later matches are left alone.
    pub fn kill(&self, name: &str) -> Result<Option<u32>, MonitorError> {
        let needle = name.to_lowercase();
        let Some(target) = self
            .table
            .snapshot()
            .into_iter()
            .find(|entry| name_matches(entry, &needle))
        else {
            return Ok(None);
        };
        tracing::debug!(pid = target.pid, name = %target.name, "terminating process");
        self.table.terminate(target.pid)?;
        Ok(Some(target.pid))
    }
}

fn name_matches(entry: &ProcessEntry, needle: &str) -> bool {
    entry.name.to_lowercase().contains(needle)
}
