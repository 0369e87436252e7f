// CLI commands

pub mod run;
pub mod scorers;
