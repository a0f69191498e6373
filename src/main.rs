//! gummy 命令行工具：检查或还原保存下来的 HTML 快照

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use translationgummy::logging;
use translationgummy::translation::{revert_html, status_of_html, TranslationError, TranslationResult};

#[derive(Parser)]
#[command(name = "gummy", version, about = "Inspect and strip bilingual translation overlays in saved HTML")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the page translation status as JSON
    Status {
        /// Saved HTML file
        file: PathBuf,
    },
    /// Remove every overlay and write the restored HTML
    Revert {
        /// Saved HTML file
        file: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn read_html(path: &Path) -> TranslationResult<String> {
    let bytes = fs::read(path)
        .map_err(|e| TranslationError::InvalidInput(format!("无法读取 {}: {}", path.display(), e)))?;
    // 带 BOM 时按 BOM 解码，否则按 UTF-8
    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(&bytes);
    if had_errors {
        tracing::warn!("{} 含有无效的 {} 字节，已替换", path.display(), encoding.name());
    }
    Ok(text.into_owned())
}

fn run(args: Args) -> TranslationResult<()> {
    match args.command {
        Command::Status { file } => {
            let status = status_of_html(&read_html(&file)?);
            println!("{}", serde_json::to_string(&status)?);
        }
        Command::Revert { file, output } => {
            let (restored, report) = revert_html(&read_html(&file)?)?;
            tracing::info!(
                "已还原 {} 处（块 {}，行内 {}，旧版容器 {}）",
                report.total(),
                report.blocks,
                report.inlines,
                report.legacy_containers
            );
            match output {
                Some(path) => fs::write(&path, restored.as_bytes())?,
                None => io::stdout().write_all(restored.as_bytes())?,
            }
        }
    }
    Ok(())
}

fn main() {
    logging::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
