use annual_report_reconciler::llm::{GeminiOracle, DEFAULT_MODEL};
use annual_report_reconciler::{
    dedupe_years, implied_share_summary, FinancialsReport, ReconcileConfig, Reconciler,
    SourcedYear, TextDocument,
};
use anyhow::Context;
use dotenv::dotenv;
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    println!("🚀 Reconciling annual report metrics...\n");

    let doc_dir = Path::new("demos").join("documents");
    if !doc_dir.exists() {
        std::fs::create_dir_all(&doc_dir)?;
        println!("⚠️  Created 'demos/documents'. Place annual report PDFs there.");
        return Ok(());
    }

    let mut pdf_paths: Vec<PathBuf> = std::fs::read_dir(&doc_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "pdf"))
        .collect();
    pdf_paths.sort();

    if pdf_paths.is_empty() {
        println!("⚠️  No PDF files found in {:?}.", doc_dir);
        return Ok(());
    }

    let config = match std::env::var("RECONCILE_CONFIG") {
        Ok(path) => ReconcileConfig::from_json_file(Path::new(&path))
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => ReconcileConfig::default(),
    };

    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let oracle = GeminiOracle::from_env(model)?;
    println!("🤖 Using model {}", oracle.model());

    let reconciler = Reconciler::new(oracle, config)?;

    println!("📄 Processing {} reports:", pdf_paths.len());
    let results = reconciler.process_batch(&pdf_paths, |path| TextDocument::from_pdf(path));

    let mut years = Vec::new();
    for (path, outcome) in results {
        match outcome {
            Ok(outcome) => {
                let mut annotated = TextDocument::from_pdf(&path)?;
                for year in outcome.years {
                    println!(
                        "   ✅ {:?}: {} ({} rescaled, {} citations repaired, {} unresolved, {} re-extractions accepted)",
                        path.file_name().unwrap_or_default(),
                        year.record.year_label,
                        year.rescaled.len(),
                        year.repairs
                            .iter()
                            .filter(|r| r.resolution.is_resolved())
                            .count(),
                        year.unresolved().count(),
                        year.accepted_reextractions().count()
                    );
                    for reextraction in &year.reextractions {
                        println!("      {}: {:?}", reextraction.target, reextraction.outcome);
                    }

                    let failures = reconciler.highlight(&mut annotated, &year.record);
                    for failure in &failures {
                        println!("      ⚠️  highlight {}", failure);
                    }

                    years.push(SourcedYear {
                        source_document: path.clone(),
                        record: year.record,
                    });
                }
                let out = path.with_extension("highlights.json");
                annotated.save_annotations(&out)?;
            }
            Err(e) => println!("   ❌ {:?}: {}", path.file_name().unwrap_or_default(), e),
        }
    }

    let years: Vec<_> = dedupe_years(years).into_iter().map(|y| y.record).collect();
    let company = std::env::var("COMPANY_NAME").unwrap_or_default();
    let report = FinancialsReport::new(company, "INR crore", years);

    println!("\n📊 Reconciled metrics:\n{}", report.table_text(1.0));

    println!("\n🔍 Cross-year validation:");
    let validation = reconciler.validate(&report.years);
    for finding in &validation.findings {
        println!("   {}", finding);
    }

    println!("\n🧮 Implied share counts:");
    for line in implied_share_summary(&report.years, &reconciler.config().scale) {
        println!("   {}", line);
    }

    let out = doc_dir.join("financials.json");
    std::fs::write(&out, report.to_json_pretty()?)?;
    println!("\n💾 Saved {}", out.display());

    Ok(())
}
