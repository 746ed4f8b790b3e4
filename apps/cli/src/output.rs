//! Terminal rendering of service results.

use curator_core::PageState;
use curator_shared::{
    AnalysisResult, CleaningResult, Dataset, GenerationResult, QaItem, QaPage, StageOutput,
};

/// Questions longer than this are shortened in tables.
const QUESTION_WIDTH: usize = 72;

pub(crate) fn print_datasets(datasets: &[Dataset]) {
    if datasets.is_empty() {
        println!("No datasets found.");
        return;
    }

    let id_width = datasets
        .iter()
        .map(|d| d.id.as_str().len())
        .max()
        .unwrap_or(0)
        .max(2);
    let name_width = datasets.iter().map(|d| d.name.len()).max().unwrap_or(0).max(4);

    println!("{:<id_width$}  {:<name_width$}  {:>7}  CREATED", "ID", "NAME", "SOURCES");
    for d in datasets {
        println!(
            "{:<id_width$}  {:<name_width$}  {:>7}  {}",
            d.id.as_str(),
            d.name,
            d.qa_count.map_or_else(|| "-".to_string(), |n| n.to_string()),
            d.created_at.as_deref().unwrap_or("-"),
        );
    }
}

pub(crate) fn print_dataset(dataset: &Dataset) {
    println!();
    println!("  ID:          {}", dataset.id);
    println!("  Name:        {}", dataset.name);
    if let Some(description) = &dataset.description {
        println!("  Description: {description}");
    }
    if let Some(count) = dataset.qa_count {
        println!("  Sources:     {count}");
    }
    if let Some(created) = &dataset.created_at {
        println!("  Created:     {created}");
    }
    println!();
}

pub(crate) fn print_generation(result: &GenerationResult) {
    println!();
    println!("  Dataset generated!");
    println!("  ID:        {}", result.dataset_id);
    println!("  Name:      {}", result.dataset_name);
    println!("  Questions: {}", result.total_questions);
    if let Some(model) = &result.model_qa {
        println!("  Model:     {model}");
    }
    println!("  Time:      {:.1}s", result.processing_time);
    println!();
}

pub(crate) fn print_analysis(result: &AnalysisResult) {
    println!();
    println!(
        "  {} similar pairs in {} records (threshold {:.2})",
        result.similar_pairs_found, result.total_records, result.threshold
    );
    for pair in &result.similarities {
        println!();
        println!("  {:.3}  {}", pair.similarity, shorten(&pair.question1));
        println!("         {}", shorten(&pair.question2));
    }
    println!();
}

pub(crate) fn print_cleaning(result: &CleaningResult) {
    println!();
    println!(
        "  Removed {} of {} records (threshold {:.2})",
        result.removed_records, result.total_records, result.threshold
    );
    for removed in &result.removed_items {
        println!(
            "  - {} ({:.3}, kept {})",
            shorten(&removed.question),
            removed.similarity,
            removed.kept_id
        );
    }
    println!();
}

pub(crate) fn print_stage_output(output: &StageOutput) {
    match output {
        StageOutput::Generation(r) => print_generation(r),
        StageOutput::Analysis(r) => print_analysis(r),
        StageOutput::Cleaning(r) => print_cleaning(r),
    }
}

pub(crate) fn print_qa_page(page: &QaPage, state: &PageState) {
    print_qa_items(&page.qa_data);
    println!();
    println!(
        "  Page {}/{} of '{}' ({} of {} items)",
        state.current_page(),
        state.page_count().max(1),
        page.dataset_name,
        page.returned_count,
        page.total_count
    );
    if state.has_more_data() {
        println!("  Next: --page {}", state.current_page() + 1);
    }
    println!();
}

pub(crate) fn print_qa_items(items: &[QaItem]) {
    for item in items {
        println!();
        println!("  [{}] Q: {}", item.id, item.question);
        println!("  A: {}", item.answer);
        if let Some(confidence) = item.confidence {
            println!("  confidence {confidence:.2}");
        }
    }
}

fn shorten(text: &str) -> String {
    if text.chars().count() <= QUESTION_WIDTH {
        return text.to_string();
    }
    let cut: String = text.chars().take(QUESTION_WIDTH - 1).collect();
    format!("{cut}…")
}
