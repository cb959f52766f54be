use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    DownloadResult, ListResult, MergeAllResult, ProgressEvent, ProgressSink, UploadResult,
};
use crate::generator::GeneratedDescriptor;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_upload(result: &UploadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_merge(result: &MergeAllResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_generate(result: &GeneratedDescriptor) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to `tracing` for interactive runs.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_upload(result: &UploadResult) {
        let branch = if result.branch_created {
            "created branch"
        } else {
            "existing branch"
        };
        println!("{} ({branch})", result.name);
        if !result.copied {
            println!("  folder already present in working tree, not copied");
        }
        if !result.committed {
            println!("  nothing new to commit");
        }
        if result.pushed {
            println!("  pushed to remote");
        }
    }

    pub fn print_list(result: &ListResult) {
        if result.descriptors.is_empty() {
            println!("no descriptors (trunk: {})", result.trunk);
            return;
        }
        for name in &result.descriptors {
            println!("{name}");
        }
    }

    pub fn print_download(result: &DownloadResult) {
        let source = if result.fetched { " (fetched)" } else { "" };
        println!("{}{source}: {} -> {}", result.name, result.action, result.path);
    }

    pub fn print_merge(result: &MergeAllResult) {
        for merge in &result.merges {
            let status = if merge.committed {
                "merged"
            } else {
                "already up to date"
            };
            println!("{} -> {}: {status}", merge.branch, merge.trunk);
        }
        if result.pushed {
            println!("pushed trunk to remote");
        }
    }

    pub fn print_generate(result: &GeneratedDescriptor) {
        println!("Created {}", result.descriptor_file);
        if result.pipeline_created {
            println!("Created {}", crate::generator::PIPELINE_FILE);
        }
    }
}
