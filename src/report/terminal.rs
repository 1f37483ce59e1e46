use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::Report;

/// Render a colored terminal report: one row per repository, one column per tracked package.
pub fn render(report: &Report, verbose: bool, quiet: bool) {
    let total = report.repositories.len();
    let errors = report.errors();

    if !quiet {
        println!(
            "\n {} v{}",
            "version-checkr".bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            " Repositories: {}  Packages: {}\n",
            total,
            report.packages.len()
        );
    }

    println!("{}", build_table(report));

    if !errors.is_empty() {
        println!(
            "\n {} {} of {} repositories could not be scanned:\n",
            "[ERROR]".red().bold(),
            errors.len(),
            total
        );
        for (slug, error) in &errors {
            println!("  {} {}: {}", "✗".red(), slug.bold(), error);
        }
    }

    if verbose {
        println!("\n {} Lock files analysed:\n", "[INFO]".cyan().bold());
        for repo in report.repositories.iter().filter(|r| r.error.is_none()) {
            println!("  {} @ {}", repo.slug().bold(), repo.git_ref);
            for file in &repo.files {
                println!("    {} {}", "→".cyan(), file);
            }
        }
    }

    println!();
}

fn build_table(report: &Report) -> Table {
    let mut header = vec![
        Cell::new("Repository").add_attribute(Attribute::Bold),
        Cell::new("Ref").add_attribute(Attribute::Bold),
    ];
    header.extend(
        report
            .packages
            .iter()
            .map(|p| Cell::new(p).add_attribute(Attribute::Bold)),
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for repo in &report.repositories {
        let name_color = if repo.error.is_some() {
            Color::Red
        } else {
            Color::Reset
        };
        let mut row = vec![
            Cell::new(format!("{} ({})", repo.slug(), repo.provider)).fg(name_color),
            Cell::new(&repo.git_ref),
        ];
        for package in &report.packages {
            let cell = match repo.dependencies.get(package) {
                Some(version) => Cell::new(version).fg(Color::Green),
                None => Cell::new("-").fg(Color::DarkGrey),
            };
            row.push(cell.set_alignment(CellAlignment::Center));
        }
        table.add_row(row);
    }

    table
}
