use miette::Report;

use crate::error::{asm_report, AsmErrorKind};
use crate::program::Program;
use crate::radix::{self, Radix, MAX_ADDR};
use crate::runtime::Opcode;
use crate::symbol::{Span, SymbolTable};

/// Punctuation that ends a label.
const LABEL_DELIM: char = ',';
/// Punctuation that starts an inline comment.
const COMMENT_DELIM: char = '/';

/// Statement kinds the assembler understands: the machine instructions plus
/// the assembly-time directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stmt {
    Instr(Opcode),
    Dec,
    Oct,
    Hex,
    Org,
    End,
}

impl Stmt {
    /// Mnemonic lookup is case insensitive; callers pass the uppercased token.
    fn lookup(mnemonic: &str) -> Option<Stmt> {
        if let Ok(op) = mnemonic.parse::<Opcode>() {
            return Some(Stmt::Instr(op));
        }
        match mnemonic {
            "DEC" => Some(Stmt::Dec),
            "OCT" => Some(Stmt::Oct),
            "HEX" => Some(Stmt::Hex),
            "ORG" => Some(Stmt::Org),
            "END" => Some(Stmt::End),
            _ => None,
        }
    }
}

/// Bits 15-12 of an emitted word: an opcode nibble, the high nibble of a data
/// word, or a placeholder for a statement that never produced one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HiField {
    Code(u8),
    Invalid,
}

/// Bits 11-0 of an emitted word.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LoField {
    /// Resolved 12-bit address or data bits.
    Addr(u16),
    /// Symbol reference awaiting the second pass.
    Sym(String),
    /// Required operand that was absent or unresolvable; listed as `???`.
    Missing,
    /// The statement takes no operand; the field assembles as zero.
    None,
}

/// One source line and everything assembly derived from it.
///
/// Created during pass 1; pass 2 only replaces a symbolic operand with its
/// resolved address. The listing is rendered from these after that.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CodeLine {
    pub source: String,
    /// 1-based line number in the source file.
    pub line_no: usize,
    /// Span of the code portion within the full source text.
    pub span: Span,
    /// Assigned address; `None` for blank, comment-only, ORG and END lines.
    pub addr: Option<u16>,
    pub label: Option<String>,
    pub mnemonic: Option<String>,
    pub operand_token: Option<String>,
    pub comment: Option<String>,
    pub hi: Option<HiField>,
    pub lo: LoField,
    pub diags: Vec<AsmErrorKind>,
}

impl CodeLine {
    fn blank(source: &str, line_no: usize, span: Span) -> Self {
        CodeLine {
            source: source.to_string(),
            line_no,
            span,
            addr: None,
            label: None,
            mnemonic: None,
            operand_token: None,
            comment: None,
            hi: None,
            lo: LoField::None,
            diags: Vec::new(),
        }
    }

    /// Whether this line occupies a memory cell.
    pub fn is_code(&self) -> bool {
        self.addr.is_some()
    }

    /// The assembled word, if every field of this line resolved.
    pub fn word(&self) -> Option<i16> {
        let hi = match self.hi {
            Some(HiField::Code(nibble)) => u16::from(nibble) << 12,
            _ => return None,
        };
        let lo = match self.lo {
            LoField::Addr(bits) => bits,
            LoField::None => 0,
            LoField::Sym(_) | LoField::Missing => return None,
        };
        Some((hi | lo) as i16)
    }
}

/// The result of assembling one source text: every line with its diagnostics,
/// the symbol table, and the total error count.
///
/// A listing can always be rendered from this. A loadable [`Program`] exists
/// only when the error count is zero, so callers must check the count rather
/// than the absence of a hard failure.
pub struct Assembly {
    pub lines: Vec<CodeLine>,
    pub symbols: SymbolTable,
    pub error_count: usize,
}

impl Assembly {
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }

    /// The loadable program, or `None` if any diagnostic was raised.
    pub fn program(&self) -> Option<Program> {
        if !self.is_clean() {
            return None;
        }
        let cells = self
            .lines
            .iter()
            .filter_map(|line| Some((line.addr?, line.word()?)))
            .collect();
        let symbols = self
            .symbols
            .entries_sorted_by_name()
            .into_iter()
            .map(|(name, entry)| (name.to_string(), entry.addr))
            .collect();
        Some(Program::new(cells, symbols))
    }

    /// Rendered diagnostics for every complaint, in source order.
    pub fn reports(&self, src: &str) -> Vec<Report> {
        self.lines
            .iter()
            .flat_map(|line| {
                line.diags
                    .iter()
                    .map(|&kind| asm_report(kind, line.span, src))
            })
            .collect()
    }
}

/// Two-pass assembler over line-oriented source text.
///
/// Pass 1 tokenizes each line, allocates addresses and records symbol
/// definitions; pass 2 resolves symbolic operands against the completed
/// table. Diagnostics are collected per line and never stop the pass, with
/// one exception: running the address counter past the end of memory aborts.
struct Assembler {
    lines: Vec<CodeLine>,
    symbols: SymbolTable,
    /// Running address counter. Starts one short of zero so the first code
    /// line lands on address zero.
    addr: i32,
    error_count: usize,
    done: bool,
}

/// Assemble source text in two passes.
pub fn assemble(src: &str) -> Assembly {
    let mut assembler = Assembler::new();
    assembler.first_pass(src);
    assembler.second_pass();
    assembler.finish()
}

impl Assembler {
    fn new() -> Self {
        Assembler {
            lines: Vec::new(),
            symbols: SymbolTable::new(),
            addr: -1,
            error_count: 0,
            done: false,
        }
    }

    fn first_pass(&mut self, src: &str) {
        let mut offs = 0;
        for (idx, raw) in src.lines().enumerate() {
            if self.done {
                break;
            }
            let line = self.parse_line(raw, idx + 1, offs);
            self.lines.push(line);
            offs += raw.len() + 1;
        }
    }

    fn second_pass(&mut self) {
        for line in &mut self.lines {
            if line.addr.is_none() {
                continue;
            }
            if let LoField::Sym(name) = &line.lo {
                match self.symbols.resolve(name, line.addr.unwrap_or(0)) {
                    Ok(addr) => line.lo = LoField::Addr(addr),
                    Err(_) => {
                        line.lo = LoField::Missing;
                        line.diags.push(AsmErrorKind::UndefinedSymbol);
                        self.error_count += 1;
                    }
                }
            }
        }
    }

    fn finish(self) -> Assembly {
        Assembly {
            lines: self.lines,
            symbols: self.symbols,
            error_count: self.error_count,
        }
    }

    fn diag(&mut self, line: &mut CodeLine, kind: AsmErrorKind) {
        line.diags.push(kind);
        self.error_count += 1;
    }

    /// Pass 1 treatment of a single source line.
    fn parse_line(&mut self, raw: &str, line_no: usize, offs: usize) -> CodeLine {
        // Consider the line only up to any comment
        let (code, comment) = match raw.find(COMMENT_DELIM) {
            Some(i) => (&raw[..i], Some(raw[i..].to_string())),
            None => (raw, None),
        };
        let span = Span::new(offs, code.trim_end().len().max(1));
        let mut line = CodeLine::blank(raw, line_no, span);

        let mut tokens = code.split_whitespace();
        let Some(first) = tokens.next() else {
            // Blank or comment-only: contributes no address
            line.comment = Some(raw.to_string());
            return line;
        };
        line.comment = comment;

        self.addr += 1;
        if self.addr > i32::from(MAX_ADDR) {
            self.diag(&mut line, AsmErrorKind::MaxAddressExceeded);
            self.done = true;
            return line;
        }
        let addr = self.addr as u16;
        line.addr = Some(addr);

        // Label, if any. Anything before the delimiter is the candidate name;
        // the rest of that token is discarded.
        let mut mnemonic_tok = first;
        if let Some(delim) = first.find(LABEL_DELIM) {
            if delim > 0 {
                let name = &first[..delim];
                if name.starts_with(|c: char| c.is_ascii_digit()) {
                    self.diag(&mut line, AsmErrorKind::InvalidLabelStart);
                } else if self.symbols.define(name, addr).is_err() {
                    self.diag(&mut line, AsmErrorKind::DuplicateSymbol);
                } else {
                    line.label = Some(name.to_string());
                }
            }
            match tokens.next() {
                Some(tok) => mnemonic_tok = tok,
                None => {
                    self.diag(&mut line, AsmErrorKind::MissingInstruction);
                    line.hi = Some(HiField::Invalid);
                    return line;
                }
            }
        }

        let mnemonic = mnemonic_tok.to_ascii_uppercase();
        let stmt = Stmt::lookup(&mnemonic);
        line.mnemonic = Some(mnemonic);

        match stmt {
            Some(Stmt::End) => {
                // The last legal statement: emits nothing, and anything after
                // it is never read
                line.addr = None;
                self.done = true;
            }
            Some(Stmt::Org) if self.addr == 0 => self.parse_origin(&mut line, tokens.next()),
            Some(Stmt::Org) => {
                self.diag(&mut line, AsmErrorKind::MisplacedOrigin);
                // Still consumes its address; assembles like an unknown
                // instruction with an operand
                line.hi = Some(HiField::Invalid);
                self.parse_operand(&mut line, tokens.next());
            }
            Some(Stmt::Dec) => self.parse_data(&mut line, Radix::Dec, tokens.next()),
            Some(Stmt::Oct) => self.parse_data(&mut line, Radix::Oct, tokens.next()),
            Some(Stmt::Hex) => self.parse_data(&mut line, Radix::Hex, tokens.next()),
            Some(Stmt::Instr(op)) => {
                line.hi = Some(HiField::Code(op.code()));
                if op.requires_operand() {
                    self.parse_operand(&mut line, tokens.next());
                } else {
                    line.lo = LoField::None;
                }
            }
            None => {
                self.diag(&mut line, AsmErrorKind::UnknownInstruction);
                line.hi = Some(HiField::Invalid);
                // Assume an operand was meant so a following token still
                // participates in symbol resolution
                self.parse_operand(&mut line, tokens.next());
            }
        }
        line
    }

    /// A valid-position ORG: set the counter so the next statement lands on
    /// the requested origin. No code word is emitted.
    fn parse_origin(&mut self, line: &mut CodeLine, token: Option<&str>) {
        let Some(token) = token else {
            self.diag(line, AsmErrorKind::MissingOperand);
            line.lo = LoField::Missing;
            return;
        };
        let token = token.to_ascii_uppercase();
        match radix::parse_literal(Radix::Hex, &token) {
            Ok(value) => {
                self.addr = i32::from(value) - 1;
                line.addr = None;
                line.operand_token = Some(token);
            }
            Err(_) => {
                // A malformed origin assembles as a zero data word so the
                // listing still shows the cell it would have occupied
                self.diag(line, AsmErrorKind::AddressOutOfRange);
                line.operand_token = Some(token);
                line.hi = Some(HiField::Code(0));
                line.lo = LoField::Addr(0);
            }
        }
    }

    /// DEC/OCT/HEX directives encode one data word: the value's high nibble
    /// occupies the opcode field and the low bits the operand field.
    fn parse_data(&mut self, line: &mut CodeLine, radix: Radix, token: Option<&str>) {
        let Some(token) = token else {
            self.diag(line, AsmErrorKind::MissingOperand);
            line.lo = LoField::Missing;
            return;
        };
        let token = token.to_ascii_uppercase();
        let value = match radix::parse_literal(radix, &token) {
            Ok(value) => value,
            Err(_) => {
                self.diag(line, AsmErrorKind::InvalidLiteral(radix));
                0
            }
        };
        line.operand_token = Some(token);
        line.hi = Some(HiField::Code(((value as u16) >> 12) as u8));
        line.lo = LoField::Addr((value as u16) & MAX_ADDR);
    }

    /// The operand of an imperative statement: a 12-bit hex address literal,
    /// or a symbol reference left for the second pass.
    fn parse_operand(&mut self, line: &mut CodeLine, token: Option<&str>) {
        let Some(token) = token else {
            self.diag(line, AsmErrorKind::MissingOperand);
            line.lo = LoField::Missing;
            return;
        };
        if radix::is_literal_token(token) {
            let addr = match radix::parse_address(token) {
                Ok(addr) => addr,
                Err(_) => {
                    self.diag(line, AsmErrorKind::AddressOutOfRange);
                    0
                }
            };
            // Literal operands normalize to their 3-digit hex form
            line.operand_token = Some(radix::to_hex3(i32::from(addr)));
            line.lo = LoField::Addr(addr);
        } else {
            line.operand_token = Some(token.to_string());
            line.lo = LoField::Sym(token.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(assembly: &Assembly) -> Vec<(u16, i16)> {
        assembly.program().expect("expected a clean assembly").cells().to_vec()
    }

    #[test]
    fn assembles_straight_line_program() {
        let assembly = assemble(
            "     LOAD X\n     ADD Y\n     STORE Z\n     HALT\nX,   DEC 5\nY,   DEC 7\nZ,   DEC 0\n     END\n",
        );
        assert_eq!(assembly.error_count, 0);
        assert_eq!(
            words(&assembly),
            vec![
                (0, 0x1004),
                (1, 0x3005),
                (2, 0x2006),
                (3, 0x7000),
                (4, 5),
                (5, 7),
                (6, 0),
            ]
        );
        assert_eq!(assembly.symbols.get("X").unwrap().addr, 4);
        assert_eq!(assembly.symbols.get("X").unwrap().refs, vec![0]);
    }

    #[test]
    fn duplicate_label_reports_once_and_first_wins() {
        let assembly = assemble("X, DEC 1\nX, DEC 2\n JUMP X\n END\n");
        let dups: Vec<_> = assembly
            .lines
            .iter()
            .flat_map(|l| &l.diags)
            .filter(|&&d| d == AsmErrorKind::DuplicateSymbol)
            .collect();
        assert_eq!(dups.len(), 1);
        // All references resolve to the first definition
        assert_eq!(assembly.symbols.get("X").unwrap().addr, 0);
        assert_eq!(assembly.lines[2].lo, LoField::Addr(0));
        assert!(assembly.program().is_none());
    }

    #[test]
    fn origin_offsets_following_statements() {
        let assembly = assemble(" ORG 100\n CLEAR\n END\n");
        assert_eq!(assembly.error_count, 0);
        assert_eq!(words(&assembly), vec![(0x100, 0xA000u16 as i16)]);
    }

    #[test]
    fn origin_after_code_is_rejected_without_moving_counter() {
        let assembly = assemble(" CLEAR\n ORG 100\n CLEAR\n END\n");
        assert_eq!(assembly.error_count, 1);
        assert!(assembly.lines[1]
            .diags
            .contains(&AsmErrorKind::MisplacedOrigin));
        // The offending line consumed address 1; the counter was not retargeted
        assert_eq!(assembly.lines[1].addr, Some(1));
        assert_eq!(assembly.lines[2].addr, Some(2));
    }

    #[test]
    fn undefined_symbol_blocks_program() {
        let assembly = assemble(" JUMP nowhere\n HALT\n END\n");
        assert_eq!(assembly.error_count, 1);
        assert!(assembly.lines[0]
            .diags
            .contains(&AsmErrorKind::UndefinedSymbol));
        assert_eq!(assembly.lines[0].lo, LoField::Missing);
        assert!(assembly.program().is_none());
    }

    #[test]
    fn data_directives_encode_raw_words() {
        let assembly = assemble("A, DEC -1\nB, OCT 17\nC, HEX 0BABE\n END\n");
        assert_eq!(assembly.error_count, 0);
        assert_eq!(
            words(&assembly),
            vec![(0, -1), (1, 15), (2, 0xBABEu16 as i16)]
        );
    }

    #[test]
    fn address_literal_operands() {
        let assembly = assemble(" JUMP 010\n END\n");
        assert_eq!(assembly.error_count, 0);
        assert_eq!(words(&assembly), vec![(0, 0x9010u16 as i16)]);
        assert_eq!(assembly.lines[0].operand_token.as_deref(), Some("010"));

        let assembly = assemble(" JUMP 1000\n END\n");
        assert_eq!(assembly.error_count, 1);
        assert!(assembly.lines[0]
            .diags
            .contains(&AsmErrorKind::AddressOutOfRange));
    }

    #[test]
    fn labels_may_not_start_with_digits() {
        let assembly = assemble("1st, DEC 0\n END\n");
        assert!(assembly.lines[0]
            .diags
            .contains(&AsmErrorKind::InvalidLabelStart));
        assert!(assembly.symbols.is_empty());
    }

    #[test]
    fn unknown_and_missing_instructions() {
        let assembly = assemble(" FROB X\nX, DEC 1\n END\n");
        assert!(assembly.lines[0]
            .diags
            .contains(&AsmErrorKind::UnknownInstruction));
        // The operand still resolved, so the symbol records the reference
        assert_eq!(assembly.symbols.get("X").unwrap().refs, vec![0]);

        let assembly = assemble("alone,\n END\n");
        assert!(assembly.lines[0]
            .diags
            .contains(&AsmErrorKind::MissingInstruction));
    }

    #[test]
    fn missing_operand() {
        let assembly = assemble(" LOAD\n END\n");
        assert!(assembly.lines[0]
            .diags
            .contains(&AsmErrorKind::MissingOperand));
        assert_eq!(assembly.lines[0].lo, LoField::Missing);
    }

    #[test]
    fn lines_after_end_are_not_processed() {
        let assembly = assemble(" HALT\n END\n BOGUS LINE\n");
        assert_eq!(assembly.error_count, 0);
        assert_eq!(assembly.lines.len(), 2);
    }

    #[test]
    fn comments_and_blanks_take_no_addresses() {
        let assembly = assemble("/ header comment\n\n CLEAR / inline\n END\n");
        assert_eq!(assembly.lines[0].addr, None);
        assert_eq!(assembly.lines[1].addr, None);
        assert_eq!(assembly.lines[2].addr, Some(0));
        assert_eq!(assembly.lines[2].comment.as_deref(), Some("/ inline"));
    }

    #[test]
    fn counter_overflow_aborts_the_pass() {
        let assembly = assemble(" ORG 0FFF\n CLEAR\n CLEAR\n CLEAR\n");
        assert!(assembly
            .lines
            .iter()
            .any(|l| l.diags.contains(&AsmErrorKind::MaxAddressExceeded)));
        // The pass stopped at the overflow; the trailing line was never read
        assert_eq!(assembly.lines.len(), 3);
        assert!(assembly.program().is_none());
    }
}
