//! Tumor/normal input pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One row of the inputs table: a tumor/normal pair to call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairInput {
    pub id: String,
    pub case_id: String,
    pub tumor_id: String,
    pub normal_id: String,
    pub tumor_url: String,
    pub normal_url: String,
}

impl PairInput {
    /// Source identifiers recorded on the job record.
    pub fn identifiers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("input_id".to_string(), self.id.clone()),
            ("case_id".to_string(), self.case_id.clone()),
            ("tumor_id".to_string(), self.tumor_id.clone()),
            ("normal_id".to_string(), self.normal_id.clone()),
        ])
    }
}
