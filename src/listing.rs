use std::fmt::Write as _;

use crate::assembler::{Assembly, CodeLine, HiField, LoField};
use crate::radix::to_hex3;

/// Symbol column bounds. Names longer than the cap are truncated for printing
/// only; the full name stays significant everywhere else.
const MIN_SYMBOL_COL: usize = 6;
const MAX_SYMBOL_COL: usize = 24;
/// References per listing row before wrapping onto a continuation line.
const REFS_PER_ROW: usize = 6;

/// Render the full assembly listing: one formatted row per source line with
/// its diagnostics, a success/failure trailer, and the symbol table.
///
/// The listing is a derived view over the assembled lines; it can always be
/// produced, errors or not.
pub fn listing(assembly: &Assembly, source_name: &str) -> String {
    let mut out = String::new();
    let width = symbol_col_width(assembly);

    let _ = writeln!(out, "     Assembly listing for: {source_name}");
    out.push('\n');

    for line in &assembly.lines {
        render_line(&mut out, line, width);
        for diag in &line.diags {
            let _ = writeln!(out, "   **** {diag}");
        }
    }

    out.push('\n');
    match assembly.error_count {
        0 => out.push_str("Assembly successful.\n"),
        1 => out.push_str("1 error found.  Assembly unsuccessful.\n"),
        n => {
            let _ = writeln!(out, "{n} errors found.  Assembly unsuccessful.");
        }
    }

    render_symbol_table(&mut out, assembly, width);
    out
}

/// Render the standalone symbol map, written as the `.map` artifact next to
/// a successful assembly.
pub fn symbol_map(assembly: &Assembly) -> String {
    let width = symbol_col_width(assembly);
    let mut out = String::new();
    let _ = writeln!(out, " {}", "-".repeat(width + 11));
    let _ = writeln!(out, " {} | Location", pad("Symbol", width));
    let _ = writeln!(out, " {}+---------", "-".repeat(width + 1));
    for (name, entry) in assembly.symbols.entries_sorted_by_name() {
        let _ = writeln!(
            out,
            " {} |   {}",
            pad(name, width),
            to_hex3(i32::from(entry.addr))
        );
    }
    let _ = writeln!(out, " {}", "-".repeat(width + 11));
    out
}

fn symbol_col_width(assembly: &Assembly) -> usize {
    assembly
        .symbols
        .longest_name()
        .clamp(MIN_SYMBOL_COL, MAX_SYMBOL_COL)
}

/// Pad or truncate to an exact column width.
fn pad(s: &str, width: usize) -> String {
    let mut padded: String = s.chars().take(width).collect();
    while padded.len() < width {
        padded.push(' ');
    }
    padded
}

fn render_line(out: &mut String, line: &CodeLine, width: usize) {
    let addr = match line.addr {
        Some(addr) => to_hex3(i32::from(addr)),
        None => "   ".to_string(),
    };
    let hi = match line.hi {
        Some(HiField::Code(nibble)) => format!("{nibble:X}"),
        Some(HiField::Invalid) => "?".to_string(),
        None => " ".to_string(),
    };
    let lo = match &line.lo {
        _ if line.addr.is_none() => "   ".to_string(),
        LoField::Addr(bits) => to_hex3(i32::from(*bits)),
        LoField::None => "000".to_string(),
        LoField::Sym(_) | LoField::Missing => "???".to_string(),
    };
    let mnemonic = line.mnemonic.as_deref().unwrap_or("");
    // Operand column stretches so comments line up across rows
    let operand_width = width + 9usize.saturating_sub(mnemonic.len());
    let row = format!(
        "{addr} {hi}{lo} |  {} {} {} {}",
        pad(line.label.as_deref().unwrap_or(""), width),
        mnemonic,
        pad(line.operand_token.as_deref().unwrap_or(""), operand_width),
        line.comment.as_deref().unwrap_or(""),
    );
    out.push_str(row.trim_end());
    out.push('\n');
}

fn render_symbol_table(out: &mut String, assembly: &Assembly, width: usize) {
    const INDENT: &str = "         ";
    if assembly.symbols.is_empty() {
        return;
    }
    out.push('\n');
    let _ = writeln!(out, "{INDENT}SYMBOL TABLE");
    let rule = format!("{INDENT}{}", "-".repeat(width + 36));
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{INDENT} {} | Defined | References", pad("Symbol", width));
    let _ = writeln!(out, "{INDENT}{}+---------+{}", "-".repeat(width + 2), "-".repeat(24));

    for (name, entry) in assembly.symbols.entries_sorted_by_name() {
        let _ = write!(
            out,
            "{INDENT} {} |   {}   | ",
            pad(name, width),
            to_hex3(i32::from(entry.addr))
        );
        for (i, addr) in entry.refs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
                if i % REFS_PER_ROW == 0 {
                    let _ = write!(out, "\n{INDENT} {} |         | ", pad("", width));
                }
            }
            out.push_str(&to_hex3(i32::from(*addr)));
        }
        out.push('\n');
    }
    let _ = writeln!(out, "{rule}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    #[test]
    fn lists_addresses_code_and_source_columns() {
        let assembly = assemble("start, LOAD X / grab it\n HALT\nX, DEC 5\n END\n");
        let text = listing(&assembly, "sample.mas");
        assert!(text.contains("Assembly listing for: sample.mas"));
        assert!(text.contains("000 1002 |  start  LOAD X"));
        assert!(text.contains("/ grab it"));
        assert!(text.contains("002 0005 |  X      DEC 5"));
        assert!(text.contains("Assembly successful."));
        assert!(text.contains("SYMBOL TABLE"));
    }

    #[test]
    fn error_lines_carry_their_diagnostics() {
        let assembly = assemble(" LOAD nowhere\n HALT\n END\n");
        let text = listing(&assembly, "broken.mas");
        assert!(text.contains("   **** operand undefined"));
        assert!(text.contains("1 error found.  Assembly unsuccessful."));
        assert!(text.contains("000 1??? |"));
    }

    #[test]
    fn symbol_table_reports_references_in_order() {
        let assembly = assemble(" LOAD X\n ADD X\n HALT\nX, DEC 1\n END\n");
        let text = listing(&assembly, "refs.mas");
        assert!(text.contains("X      |   003   | 000, 001"));
    }

    #[test]
    fn map_lists_locations() {
        let assembly = assemble(" HALT\nX, DEC 1\n END\n");
        let map = symbol_map(&assembly);
        assert!(map.contains("Symbol | Location"));
        assert!(map.contains("X      |   001"));
    }
}
