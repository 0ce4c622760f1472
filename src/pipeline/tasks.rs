//! Per-block input documents and compute tasks.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use super::JobContext;
use crate::config::{ReferenceSettings, WorkflowSettings};
use crate::executor::Task;
use crate::genome::Block;

/// Name of the input document written into each block directory.
pub const INPUT_DOCUMENT: &str = "inputs.json";

fn file_ref(path: &Path) -> Value {
    json!({ "class": "File", "path": path.display().to_string() })
}

/// Path a block's tool writes for `stream`: `<block dir>/<prefix>.<stream>.vcf`.
pub fn stream_output(block_dir: &Path, block: &Block, stream: &str) -> PathBuf {
    block_dir.join(format!("{}.{}.vcf", block.prefix(), stream))
}

/// Build the input document for one block.
///
/// Configured tool parameters come first; the per-block keys are written
/// last so a parameter can never shadow them.
pub fn input_document(
    block: &Block,
    tumor: &Path,
    normal: &Path,
    reference: &ReferenceSettings,
    workflow: &WorkflowSettings,
) -> Value {
    let mut doc: Map<String, Value> = workflow
        .parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    doc.insert("region".into(), Value::String(block.region()));
    doc.insert("prefix".into(), Value::String(block.prefix()));
    doc.insert("tumor_bam".into(), file_ref(tumor));
    doc.insert("normal_bam".into(), file_ref(normal));
    if let Some(fasta) = &reference.fasta {
        doc.insert("ref".into(), file_ref(fasta));
    }
    if let Some(index) = &reference.index {
        doc.insert("ref_index".into(), file_ref(index));
    }
    if let Some(dict) = &reference.dict {
        doc.insert("ref_dict".into(), file_ref(dict));
    }
    doc.insert("streams".into(), json!(workflow.streams));

    Value::Object(doc)
}

/// Full argv for one block: runner, runner args, workflow, input document.
pub fn block_argv(workflow: &WorkflowSettings, document: &Path) -> Vec<String> {
    let mut argv = Vec::with_capacity(workflow.runner_args.len() + 3);
    argv.push(workflow.runner.clone());
    argv.extend(workflow.runner_args.iter().cloned());
    if let Some(path) = &workflow.path {
        argv.push(path.display().to_string());
    }
    argv.push(document.display().to_string());
    argv
}

/// Create every block directory, write its input document and return one
/// task per block, in block order. Task ids are `<job_id>.<ordinal>`.
pub fn build_tasks(
    ctx: &JobContext,
    blocks: &[Block],
    tumor: &Path,
    normal: &Path,
    reference: &ReferenceSettings,
    workflow: &WorkflowSettings,
) -> std::io::Result<Vec<Task>> {
    let primary = workflow
        .streams
        .first()
        .map(String::as_str)
        .unwrap_or("vcf");

    let mut tasks = Vec::with_capacity(blocks.len());
    for (ordinal, block) in blocks.iter().enumerate() {
        let dir = ctx.block_dir(ordinal, block);
        std::fs::create_dir_all(&dir)?;

        let document = dir.join(INPUT_DOCUMENT);
        let body = serde_json::to_vec_pretty(&input_document(
            block, tumor, normal, reference, workflow,
        ))?;
        std::fs::write(&document, body)?;
        debug!("Wrote {}", document.display());

        tasks.push(
            Task::new(
                format!("{}.{}", ctx.job_id, ordinal),
                block_argv(workflow, &document),
                stream_output(&dir, block, primary),
            )
            .with_inputs(vec![tumor.to_path_buf(), normal.to_path_buf(), document])
            .with_workdir(dir),
        );
    }

    Ok(tasks)
}
