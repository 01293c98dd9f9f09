//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};
use macfetch_ops::{FileReport, OpsCtx, TaskReport};
use serde_json::json;
use std::io;
use std::path::Path;

/// Output renderer for CLI results (stdout)
#[derive(Clone, Copy)]
pub struct OutputRenderer {
    json_output: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    /// Render a finished download
    pub fn render_task_report(&self, report: &TaskReport) -> io::Result<()> {
        if self.json_output {
            return print_json(&json!(report));
        }

        println!("Image:     {}", report.image_path.display());
        if let Some(chunklist) = &report.chunklist_path {
            println!("Chunklist: {}", chunklist.display());
        }
        println!(
            "Product:   {} {} ({})",
            report.product.id, report.product.os_version, report.product.image_type
        );
        println!("Size:      {}", format_bytes(report.bytes));
        if report.resumed_from > 0 {
            println!("Resumed:   {}", format_bytes(report.resumed_from));
        }
        println!("Verified:  {}", verification_label(report.verified, report.key_id.as_deref()));
        Ok(())
    }

    /// Render an offline verification result
    pub fn render_file_report(&self, payload: &Path, report: &FileReport) -> io::Result<()> {
        if self.json_output {
            return print_json(&json!({
                "payload": payload,
                "key_id": report.key_id,
                "chunks_verified": report.chunks_verified,
                "bytes_verified": report.bytes_verified,
            }));
        }

        println!(
            "[OK] {}: {} chunks, {} ({})",
            payload.display(),
            report.chunks_verified,
            format_bytes(report.bytes_verified),
            verification_label(true, report.key_id.as_deref())
        );
        Ok(())
    }

    /// Render the board table, optionally for one board only
    pub fn render_boards(&self, ctx: &OpsCtx, board_filter: Option<&str>) -> io::Result<()> {
        let rows: Vec<_> = ctx
            .registry
            .boards()
            .filter(|board| board_filter.is_none_or(|wanted| wanted == *board))
            .flat_map(|board| {
                ctx.registry
                    .products_for(board)
                    .map(move |product| (board, product))
            })
            .collect();

        if self.json_output {
            let entries: Vec<_> = rows
                .iter()
                .map(|(board, product)| {
                    json!({
                        "board_id": board,
                        "product": product.id,
                        "os_version": product.os_version,
                        "image_type": product.image_type,
                    })
                })
                .collect();
            return print_json(&json!(entries));
        }

        if rows.is_empty() {
            match board_filter {
                Some(board) => println!("Board {board} is not in the dataset."),
                None => println!("The board dataset is empty."),
            }
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Board").add_attribute(Attribute::Bold),
            Cell::new("Product").add_attribute(Attribute::Bold),
            Cell::new("OS").add_attribute(Attribute::Bold),
            Cell::new("Image").add_attribute(Attribute::Bold),
        ]);
        for (board, product) in &rows {
            table.add_row(vec![
                Cell::new(board),
                Cell::new(&product.id),
                Cell::new(&product.os_version),
                Cell::new(product.image_type),
            ]);
        }
        println!("{table}");
        Ok(())
    }
}

fn verification_label(verified: bool, key_id: Option<&str>) -> String {
    match (verified, key_id) {
        (true, Some(key)) => format!("yes, signed by {key}"),
        (true, None) => "yes, unsigned chunklist".to_string(),
        (false, _) => "no".to_string(),
    }
}

fn print_json(value: &serde_json::Value) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{json}");
    Ok(())
}

/// Human-readable byte count
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
