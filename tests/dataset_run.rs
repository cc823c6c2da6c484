// tests/dataset_run.rs
//! A run from dataset files to the next snapshot version.

mod common;

use common::{hits, product_page, Harness};
use pretty_assertions::assert_eq;
use sitecurator::{
    load_categories, parse_csv, plan_run, read_journal, run_cleaning, DatasetSource,
    DatasetWriter, JournalWriter, RunOptions, RunPlan, RunReport, SnapshotDelivery,
    SNAPSHOT_COLUMNS,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

fn plan_headphones(root: &Path) -> RunPlan {
    let categories = load_categories(&root.join("categories.md"), 0, None).unwrap();
    plan_run(&DatasetSource::new(root), &categories)
}

/// Runs every planned job, journaling as the binary does.
async fn clean(h: &Harness, plan: &mut RunPlan, options: RunOptions) -> RunReport {
    let (pipeline, cache) = h.pipeline().await;
    let mut journal = JournalWriter::new(plan.journal_paths());
    let jobs = std::mem::take(&mut plan.jobs);
    run_cleaning(pipeline, cache, jobs, options, &mut journal)
        .await
        .unwrap()
}

#[tokio::test]
async fn cleans_a_category_into_the_next_minor_version() {
    let dataset = tempfile::tempdir().unwrap();
    let root = dataset.path();
    fs::write(root.join("categories.md"), "# Audio\n- Headphones: 2\n- Speakers\n").unwrap();
    fs::create_dir_all(root.join("headphones")).unwrap();
    fs::write(
        root.join("headphones/products_v1.0.csv"),
        "Product,Brand,Model,URL\n\
         headphones,Acme,\"Studio, Pro\",https://acme.com/studio-pro\n\
         headphones,Beta,Buds,https://beta.com/buds\n",
    )
    .unwrap();

    let h = Harness::new();
    h.search
        .answer("Acme Studio, Pro", hits(&["https://acme.com/studio-pro"]));
    h.renderer.serve(
        "https://acme.com/studio-pro",
        product_page("Acme Studio Pro"),
    );

    let categories = load_categories(&root.join("categories.md"), 0, None).unwrap();
    let mut plan = plan_run(&DatasetSource::new(root), &categories);
    assert_eq!(plan.jobs.len(), 2);
    assert_eq!(plan.skipped.len(), 1, "speakers has no snapshot");

    let (pipeline, cache) = h.pipeline().await;
    let mut journal = JournalWriter::new(plan.journal_paths());
    let jobs = std::mem::take(&mut plan.jobs);
    let report = run_cleaning(pipeline, cache, jobs, RunOptions::default(), &mut journal)
        .await
        .unwrap();
    assert_eq!(journal.records_written(), 2);

    let delivery = DatasetWriter::new(plan.snapshot_targets())
        .deliver(&report.records)
        .unwrap();
    assert!(delivery.is_success());

    let snapshot = fs::read_to_string(root.join("headphones/products_v1.1.csv")).unwrap();
    let latest = fs::read_to_string(root.join("headphones/latest.csv")).unwrap();
    assert_eq!(snapshot, latest);

    let rows = parse_csv(&snapshot).unwrap();
    assert_eq!(rows[0], SNAPSHOT_COLUMNS.to_vec());
    assert_eq!(rows.len(), 3);
    // Sorted by brand within the category.
    assert_eq!(rows[1][1], "Acme");
    assert_eq!(rows[1][2], "Studio, Pro");
    assert_eq!(rows[1][3], "https://acme.com/studio-pro");
    assert_eq!(rows[1][4], "Exact");
    assert_eq!(rows[1][6], "v1.1");
    assert_eq!(rows[2][1], "Beta");
    assert_eq!(rows[2][3], "");
    assert_eq!(rows[2][4], "Unresolved");

    let journaled = read_journal(&root.join("headphones/.journal_v1.1.jsonl")).unwrap();
    assert_eq!(journaled.len(), 2);
}

#[tokio::test]
async fn a_cleaned_snapshot_seeds_the_next_version() {
    let dataset = tempfile::tempdir().unwrap();
    let root = dataset.path();
    fs::write(root.join("categories.md"), "- Headphones\n").unwrap();
    fs::create_dir_all(root.join("headphones")).unwrap();
    fs::write(
        root.join("headphones/products_v1.0.csv"),
        "Product,Brand,Model,URL\n\
         headphones,Acme,Studio,https://acme.com/studio\n\
         headphones,Beta,Buds,https://beta.com/buds\n",
    )
    .unwrap();

    let h = Harness::new();
    h.search.answer("Acme Studio", hits(&["https://acme.com/studio"]));
    h.renderer
        .serve("https://acme.com/studio", product_page("Acme Studio"));

    let mut first = plan_headphones(root);
    let report = clean(&h, &mut first, RunOptions::default()).await;
    assert!(DatasetWriter::new(first.snapshot_targets())
        .deliver(&report.records)
        .unwrap()
        .is_success());
    let calls = h.total_calls();

    // The second run reads products_v1.1.csv, whose URL column is final_url.
    let mut second = plan_headphones(root);
    assert_eq!(second.jobs.len(), 1, "Beta was left without a URL");
    assert_eq!(second.jobs[0].candidate.brand, "Acme");
    assert_eq!(second.jobs[0].candidate.proposed_url, "https://acme.com/studio");

    let report = clean(&h, &mut second, RunOptions::default()).await;
    assert_eq!(h.total_calls(), calls, "everything was cached by the first run");
    assert!(DatasetWriter::new(second.snapshot_targets())
        .deliver(&report.records)
        .unwrap()
        .is_success());

    let rows = parse_csv(&fs::read_to_string(root.join("headphones/products_v1.2.csv")).unwrap())
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], "Acme");
    assert_eq!(rows[1][3], "https://acme.com/studio");
    assert_eq!(rows[1][4], "Exact");
    assert_eq!(rows[1][6], "v1.2");
}

#[tokio::test]
async fn rerun_after_an_abort_replaces_the_partial_journal() {
    let dataset = tempfile::tempdir().unwrap();
    let root = dataset.path();
    fs::write(root.join("categories.md"), "- Headphones\n").unwrap();
    fs::create_dir_all(root.join("headphones")).unwrap();
    fs::write(
        root.join("headphones/products_v1.0.csv"),
        "Product,Brand,Model,URL\n\
         headphones,Acme,Studio,https://acme.com/studio\n\
         headphones,Beta,Buds,https://beta.com/buds\n\
         headphones,Gamma,Cans,https://gamma.com/cans\n",
    )
    .unwrap();
    let journal = root.join("headphones/.journal_v1.1.jsonl");

    // Nothing is findable, so every candidate ends unresolved.
    let h = Harness::new();
    let mut aborted = plan_headphones(root);
    let report = clean(
        &h,
        &mut aborted,
        RunOptions {
            max_workers: 1,
            max_run_failures: Some(1),
        },
    )
    .await;
    assert!(report.is_aborted());
    assert!(!root.join("headphones/products_v1.1.csv").exists());
    assert_eq!(read_journal(&journal).unwrap().len(), 2);

    let mut rerun = plan_headphones(root);
    assert_eq!(rerun.jobs.len(), 3);
    let report = clean(&h, &mut rerun, RunOptions::default()).await;
    assert!(!report.is_aborted());

    let journaled = read_journal(&journal).unwrap();
    let keys: HashSet<_> = journaled.iter().map(|r| r.key()).collect();
    assert_eq!(journaled.len(), 3);
    assert_eq!(keys.len(), 3);
}

