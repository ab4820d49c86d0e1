use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use crate::checks::{self, CheckContext, CheckId, CheckOutcome};
use crate::cli::{Cli, OutputFormat};
use crate::error::QcError;
use crate::report::ReportDocument;
use crate::utils;

/// One executed check of one file, for the JSON dump.
#[derive(Debug, Serialize)]
struct RunRecord {
    file: PathBuf,
    check: CheckId,
    #[serde(flatten)]
    outcome: CheckOutcome,
}

/// Run the requested QC battery over every input file and assemble the
/// per-file reports plus the master index.
pub fn run_qc(cli: Cli) -> Result<()> {
    let files = resolve_inputs(&cli)?;
    let requested = validate_configuration(&cli)?;
    let html = !cli.no_html;

    info!(
        "number of input files: {}, survey: {}, checks: {}, output: {}",
        files.len(),
        cli.survey,
        requested.len(),
        cli.output.display()
    );
    utils::makedir(&cli.output, cli.overwrite)?;

    let mut master = if html {
        Some(master_page(&cli)?)
    } else {
        None
    };

    let mut records: Vec<RunRecord> = Vec::new();
    let mut processed = 0usize;
    for (index, path) in files.iter().enumerate() {
        info!(
            "checking {} {} out of {}",
            cli.qcmode,
            index + 1,
            files.len()
        );
        match process_file(&cli, path, index, &requested, html, &mut records) {
            Ok(reference) => {
                processed += 1;
                if let (Some(master), Some((href, title))) = (&mut master, reference) {
                    master.add_reference(&href, &title);
                }
            }
            // One broken file must not sink the batch.
            Err(err) => error!("skipping {}: {:#}", path.display(), err),
        }
    }

    if let Some(master) = &master {
        master
            .save(&cli.output.join("index.html"))
            .context("failed to save master index")?;
    }

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!(
            "Processed {} of {} file(s); output in {}",
            processed,
            files.len(),
            cli.output.display()
        );
    }

    // A run that produced nothing should not leave an empty directory.
    if fs::read_dir(&cli.output)
        .map(|mut d| d.next().is_none())
        .unwrap_or(false)
    {
        info!("no product was made, removing output directory");
        fs::remove_dir(&cli.output)?;
    }
    Ok(())
}

fn resolve_inputs(cli: &Cli) -> Result<Vec<PathBuf>> {
    if cli.search_in {
        if cli.file_path.len() != 1 {
            return Err(QcError::Configuration(
                "--search-in takes exactly one directory".to_string(),
            )
            .into());
        }
        let dir = &cli.file_path[0];
        info!("searching for files within {}", dir.display());
        let files = utils::find_fits_files(dir)?;
        info!("number of files found: {}", files.len());
        Ok(files)
    } else {
        Ok(cli.file_path.clone())
    }
}

/// Resolve survey, mode and check names before touching any file, so bad
/// configuration fails the run immediately.
fn validate_configuration(cli: &Cli) -> Result<Vec<CheckId>> {
    let available = checks::supported_checks(&cli.survey, cli.qcmode)?;
    let mut requested = Vec::with_capacity(cli.qctest.len());
    for name in &cli.qctest {
        let id: CheckId = name.parse()?;
        if !available.contains(&id) {
            return Err(QcError::Configuration(format!(
                "check '{}' is not available for survey '{}' at level '{}'",
                id, cli.survey, cli.qcmode
            ))
            .into());
        }
        requested.push(id);
    }
    if requested.is_empty() {
        return Err(QcError::Configuration("no QC checks requested".to_string()).into());
    }
    Ok(requested)
}

/// Reuse the master index from a previous run unless overwriting.
fn master_page(cli: &Cli) -> Result<ReportDocument> {
    match utils::existing_index(&cli.output) {
        Some(page) if !cli.overwrite => {
            info!("using existing master index {}", page.display());
            Ok(ReportDocument::load(&page)?)
        }
        _ => {
            info!("initialising master index");
            Ok(ReportDocument::new("QC reports"))
        }
    }
}

/// Process one input file to completion. The check set owns the FITS
/// handle, so it is released on every exit path when the set drops.
/// Returns the master-index reference for the saved per-file report.
fn process_file(
    cli: &Cli,
    path: &Path,
    index: usize,
    requested: &[CheckId],
    html: bool,
    records: &mut Vec<RunRecord>,
) -> Result<Option<(String, String)>> {
    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    let subdir_name = format!("{}_{}", basename, index);
    let outdir = cli.output.join(&subdir_name);
    utils::makedir(&outdir, cli.overwrite)?;

    let ctx = CheckContext {
        outdir: outdir.clone(),
        html,
        params_dir: cli.params.clone(),
    };
    let mut set = checks::build_check_set(&cli.survey, cli.qcmode, path, ctx)?;
    for &check in requested {
        info!("applying {}", check);
        let outcome = set.run(check).with_context(|| format!("{} failed", check))?;
        records.push(RunRecord {
            file: path.to_path_buf(),
            check,
            outcome,
        });
        info!("...check completed...");
    }

    let title = set.title();
    match set.into_report() {
        Some(report) => {
            let file_name = format!("index_{}.html", cli.qcmode);
            report
                .save(&outdir.join(&file_name))
                .with_context(|| format!("failed to save report for {}", path.display()))?;
            Ok(Some((format!("{}/{}", subdir_name, file_name), title)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn write_fits(path: &Path) {
        let data: Vec<i32> = (0..12).collect();
        let mut hdu = fitrs::Hdu::new(&[4, 3], data);
        hdu.insert("DETECTOR", "RED");
        fitrs::Fits::create(path, hdu).unwrap();
    }

    #[test]
    fn test_broken_file_does_not_sink_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.fit");
        let good = dir.path().join("good.fit");
        write_fits(&good);
        let output = dir.path().join("out");

        let cli = Cli::try_parse_from([
            "ifu-qc",
            broken.to_str().unwrap(),
            good.to_str().unwrap(),
            "--survey",
            "weave",
            "--qctest",
            "check_primary",
            "--qcmode",
            "raw",
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        run_qc(cli).unwrap();

        // the unreadable first file is skipped, the second still completes
        assert!(output.join("good.fit_1").join("index_raw.html").is_file());
        let master = std::fs::read_to_string(output.join("index.html")).unwrap();
        assert!(master.contains("good.fit_1/index_raw.html"));
        assert!(!master.contains("broken.fit_0"));
    }

    #[test]
    fn test_unknown_check_fails_before_any_file_is_touched() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.fit");
        write_fits(&good);
        let output = dir.path().join("out");

        let cli = Cli::try_parse_from([
            "ifu-qc",
            good.to_str().unwrap(),
            "--survey",
            "weave",
            "--qctest",
            "check_bogus",
            "--qcmode",
            "raw",
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        assert!(run_qc(cli).is_err());
        assert!(!output.exists());
    }
}
