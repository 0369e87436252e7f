// Scorer eligibility listing

use std::path::Path;

use promptlab_core::evaluators::EvaluatorRegistry;

use crate::output::{print_table_header, print_table_row, OutputFormat};
use crate::run_file::RunFile;

pub fn run(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let run_file = RunFile::load(file)?;
    let registry: EvaluatorRegistry = run_file.scorers.iter().cloned().collect();
    let eligible = registry.eligible(run_file.run.mode, run_file.run.backend.backend);

    if format.is_text() {
        if eligible.is_empty() {
            println!("No eligible scorers.");
            return Ok(());
        }
        print_table_header(&[("NAME", 30), ("API TYPE", 16)]);
        for scorer in eligible {
            print_table_row(&[(scorer.name.as_str(), 30), (scorer.api_type.as_str(), 16)]);
        }
        Ok(())
    } else {
        format.print_value(&eligible)
    }
}
