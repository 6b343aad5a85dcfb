//! tome - ebook metadata extractor

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tome::EbookDriver;

#[derive(Parser)]
#[command(name = "tome")]
#[command(version, about = "Extract ebook metadata and structure", long_about = None)]
#[command(after_help = "EXAMPLES:
    tome book.epub              Show metadata as JSON
    tome --chapters book.fb2    Include per-chapter entries
    tome --cover book.mobi      Include cover MIME type and size")]
struct Cli {
    /// Input file (EPUB, MOBI, FB2, or TXT; FB2/TXT may be zipped)
    #[arg(value_name = "INPUT")]
    input: String,

    /// List the chapters too
    #[arg(short = 'c', long)]
    chapters: bool,

    /// Report the cover image too
    #[arg(long)]
    cover: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> tome::Result<()> {
    let mut driver = tome::open(&cli.input)?;

    let mut output = json!({ "meta": driver.meta()? });

    if cli.chapters {
        let chapters: Vec<_> = driver
            .data()?
            .iter()
            .map(|entry| {
                json!({
                    "title": entry.title,
                    "navigation": entry.navigation,
                    "styles": entry.styles.len(),
                    "length": entry.text.len(),
                })
            })
            .collect();
        output["chapters"] = json!(chapters);
    }

    if cli.cover {
        output["cover"] = match driver.cover()? {
            Some(cover) => json!({ "mime": cover.mime, "bytes": cover.data.len() }),
            None => json!(null),
        };
    }

    println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
    Ok(())
}
