mod m0001_job_tables;
mod m0002_job_metrics;

use cetane::prelude::MigrationRegistry;

pub fn registry() -> MigrationRegistry {
    let mut reg = MigrationRegistry::new();
    reg.register(m0001_job_tables::migration());
    reg.register(m0002_job_metrics::migration());
    reg
}
