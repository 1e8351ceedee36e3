use clap::Parser;
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};

use formstamp::{DataRecord, FillConfig, FontProvisioner, FormFiller};

/// Stamp a data record onto a PDF form template and flatten it
#[derive(Parser, Debug)]
#[command(name = "formstamp", about = "Fill a PDF form template and flatten it")]
struct Args {
    /// Fillable PDF template
    #[arg(long)]
    template: PathBuf,
    /// JSON object of field name -> value
    #[arg(long, conflicts_with = "records", required_unless_present = "records")]
    data: Option<PathBuf>,
    /// Output PDF (with --data)
    #[arg(long, requires = "data")]
    output: Option<PathBuf>,
    /// Glob of JSON records; one PDF per record is written to --out-dir
    #[arg(long)]
    records: Option<String>,
    /// Directory for batch output (default: current directory)
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// JSON fill configuration (font size, offsets, selection marks, font source)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stamp text only, no selection marks
    #[arg(long, default_value_t = false)]
    text_only: bool,
    /// Remote font to fetch when the cache is empty
    #[arg(long)]
    font_url: Option<String>,
    /// Local font cache path
    #[arg(long)]
    font_cache: Option<PathBuf>,
    /// Never fetch the font; fall back to Helvetica if it is not cached
    #[arg(long, default_value_t = false)]
    offline: bool,
}

impl Args {
    fn fill_config(&self) -> Result<FillConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => FillConfig::from_json_file(path)?,
            None => FillConfig::registration_form(),
        };
        if self.text_only {
            config.selection = None;
        }
        if let Some(url) = &self.font_url {
            config.font.url = url.clone();
        }
        if let Some(cache) = &self.font_cache {
            config.font.cache_path = cache.clone();
        }
        config.font.offline |= self.offline;
        Ok(config)
    }
}

/// Fill one record; the output file is only created once the PDF is complete.
fn fill_one(
    filler: &FormFiller,
    template: &Path,
    data: &Path,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = DataRecord::from_json_file(data)?;
    let mut pdf = Vec::new();
    let report = filler.fill_to(template, &record, &mut pdf)?;
    fs::write(out, &pdf)?;
    println!(
        "{} -> {} ({} field(s), {} page(s){})",
        data.display(),
        out.display(),
        report.stamped_count(),
        report.pages,
        report
            .selected
            .map(|s| format!(", marked {s}"))
            .unwrap_or_default()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = args.fill_config()?;

    let font = FontProvisioner::new(config.font.clone()).provision();
    let filler = FormFiller::new(font, config);
    if let Some(warning) = filler.font().warning() {
        eprintln!("warning: {warning}; non-Latin text may not render");
    }

    if let Some(data) = &args.data {
        let out = args
            .output
            .clone()
            .unwrap_or_else(|| data.with_extension("pdf"));
        fill_one(&filler, &args.template, data, &out)?;
        return Ok(());
    }

    let pattern = args.records.as_deref().unwrap_or_default();
    let mut records: Vec<PathBuf> = glob(pattern)?.filter_map(|e| e.ok()).collect();
    records.sort();
    if records.is_empty() {
        return Err(format!("no records match {pattern}").into());
    }
    fs::create_dir_all(&args.out_dir)?;

    let mut failed = 0;
    for data in &records {
        let stem = data.file_stem().unwrap_or_default().to_string_lossy();
        let out = args.out_dir.join(format!("{stem}.pdf"));
        if let Err(e) = fill_one(&filler, &args.template, data, &out) {
            eprintln!("{}: {e}", data.display());
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} record(s) failed", records.len()).into());
    }
    println!("Done.");
    Ok(())
}
