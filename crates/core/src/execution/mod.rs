//! Script execution: strategies, SSH command construction and output types.

pub mod output;
pub mod ssh;
pub mod strategy;

pub use output::{
    BufferedOutput, DiscardOutput, ExecutionResult, OutputLine, OutputSink, RedactingSink,
};
pub use strategy::{ExecutionJob, ExecutionStrategy, COPY_FAILED_EXIT_CODE};
