// ===== prefixforge/src/reports/mod.rs =====
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use prefixforge::fitness::AttackTemplate;
use prefixforge::optimizer::AttackOutcome;
use prefixforge::oracle::{Oracle, Verdict};
use prefixforge::tokenizer::Tokenizer;

fn verdict_cell(v: &Verdict, benign_label: &str) -> Cell {
    let text = format!("{} ({:.2}% benign)", v.label, v.benign_prob * 100.0);
    if v.label.eq_ignore_ascii_case(benign_label) {
        Cell::new(text).fg(Color::Green)
    } else {
        Cell::new(text).fg(Color::Red)
    }
}

pub fn print_verdict(title: &str, verdict: &Verdict, benign_label: &str) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new(title).add_attribute(Attribute::Bold),
            Cell::new("Value"),
        ]);
    table.add_row(vec![
        Cell::new("Predicted"),
        verdict_cell(verdict, benign_label),
    ]);
    for (i, p) in verdict.probs.iter().enumerate() {
        table.add_row(vec![
            Cell::new(format!("P(class {})", i)),
            Cell::new(format!("{:.4}", p)).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
}

/// The closing summary: payload classification with and without the
/// prefix, the winning prefix itself, and its token economics.
pub fn print_final_report(
    oracle: &Oracle,
    tokenizer: &dyn Tokenizer,
    template: &AttackTemplate,
    outcome: &AttackOutcome,
) {
    let prefix = &outcome.minimized_prefix;
    let full_text = template.wrap(prefix);
    let benign_label = oracle.benign_label().to_string();

    let bare = oracle.classify(&template.payload);
    let wrapped = oracle.classify(&full_text);

    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Final Result").add_attribute(Attribute::Bold),
            Cell::new(""),
        ]);

    table.add_row(vec![
        Cell::new("Stop reason"),
        Cell::new(outcome.stop_reason.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Iterations"),
        Cell::new(outcome.iterations.to_string()).set_alignment(CellAlignment::Right),
    ]);
    if let Ok(v) = &bare {
        table.add_row(vec![
            Cell::new("Payload alone"),
            verdict_cell(v, &benign_label),
        ]);
    }
    if let Ok(v) = &wrapped {
        table.add_row(vec![
            Cell::new("Payload with prefix"),
            verdict_cell(v, &benign_label),
        ]);
    }
    table.add_row(vec![Cell::new("Prefix"), Cell::new(prefix)]);
    table.add_row(vec![
        Cell::new("Prefix tokens"),
        Cell::new(tokenizer.count(prefix).to_string()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Total tokens"),
        Cell::new(tokenizer.count(&full_text).to_string()).set_alignment(CellAlignment::Right),
    ]);
    if let Some(best) = &outcome.best {
        table.add_row(vec![
            Cell::new("Best raw score"),
            Cell::new(format!("{:.4}", best.score)).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");

    println!("\nCOPY THIS:\n --- \n{}{}\n --- ", template.injection, prefix);
}
