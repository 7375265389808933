pub(crate) fn progress(message: &str) {
    eprintln!("==> {message}");
}

/// Clears the terminal and moves the cursor home before a redraw.
pub(crate) fn clear_screen() {
    print!("\x1B[2J\x1B[H");
}

/// Left-aligned fixed-width table; each column is as wide as its widest cell.
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|header| header.len()).collect::<Vec<_>>();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let separator = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>();
    let separator = separator.iter().map(String::as_str).collect::<Vec<_>>();
    let mut lines = vec![render_row(headers, &widths), render_row(&separator, &widths)];
    for row in rows {
        let cells = row.iter().map(String::as_str).collect::<Vec<_>>();
        lines.push(render_row(&cells, &widths));
    }
    lines.join("\n")
}

fn render_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}", width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

pub(crate) fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept = value
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    format!("{kept}...")
}
