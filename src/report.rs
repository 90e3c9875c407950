//! Printable report of an analysis.

use crate::error::{CorepError, Result};
use crate::schema::{AnalysisResult, RuleOutcome};
use std::io::Write;

pub trait ReportRenderer: Send + Sync {
    fn render(&self, result: &AnalysisResult) -> Result<Vec<u8>>;

    fn content_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;
}

/// Plain text report in the order the sections are printed.
pub fn report_lines(result: &AnalysisResult) -> Vec<String> {
    let mut lines = vec![
        format!("COREP {} - {}", result.template_id, result.template_name),
        format!(
            "Generated: {}",
            result.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("Extraction source: {:?}", result.extraction_source),
        String::new(),
        "TEMPLATE VALUES".to_string(),
    ];

    for field in &result.fields {
        let value = field
            .value
            .map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
        lines.push(format!(
            "  {:<5} {:<62} {:>14}",
            field.row_id,
            truncate(&field.label, 62),
            value
        ));
    }

    lines.push(String::new());
    lines.push("TOTALS (millions)".to_string());
    for (name, value) in &result.totals {
        lines.push(format!("  {:<24} {}", name.key(), display(*value, "")));
    }

    lines.push(String::new());
    lines.push("CAPITAL RATIOS".to_string());
    for (name, value) in &result.ratios {
        lines.push(format!("  {:<24} {}", name.key(), display(*value, "%")));
    }

    lines.push(String::new());
    lines.push("VALIDATION RESULTS".to_string());
    for check in &result.validation_results {
        let status = match check.outcome {
            RuleOutcome::Passed => "PASS",
            RuleOutcome::Failed => "FAIL",
            RuleOutcome::NotEvaluated => "SKIP",
        };
        lines.push(format!(
            "  [{}] {} {} ({:?}): {}",
            status, check.rule_id, check.name, check.severity, check.message
        ));
    }

    lines.push(String::new());
    lines.push("AUDIT TRAIL".to_string());
    if result.audit_trail.is_empty() {
        lines.push("  No citations".to_string());
    }
    for entry in &result.audit_trail {
        lines.push(format!(
            "  Row {} - {}: {}",
            entry.field, entry.rule_id, entry.explanation
        ));
    }

    lines.push(String::new());
    lines.push("Illustrative output only. Not a regulatory submission.".to_string());
    lines
}

fn display(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}{}", v, unit))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width - 3).collect();
        cut.push_str("...");
        cut
    }
}

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 50;
const FONT_SIZE: u32 = 8;
const LEADING: u32 = 10;
/// Courier glyphs are 0.6 em wide.
const CHARS_PER_LINE: usize =
    ((PAGE_WIDTH - 2 * MARGIN) as usize * 10) / (FONT_SIZE as usize * 6);
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

/// Single-font PDF writer: Courier on US-letter pages, wrapped and paginated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    fn pages(lines: &[String]) -> Vec<Vec<String>> {
        let wrapped: Vec<String> = lines
            .iter()
            .flat_map(|line| wrap(&to_pdf_text(line), CHARS_PER_LINE))
            .collect();

        if wrapped.is_empty() {
            return vec![Vec::new()];
        }
        wrapped
            .chunks(LINES_PER_PAGE)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    fn content_stream(lines: &[String]) -> String {
        let mut stream = format!(
            "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
            FONT_SIZE,
            LEADING,
            MARGIN,
            PAGE_HEIGHT - MARGIN
        );
        for line in lines {
            stream.push_str(&format!("({}) Tj T*\n", escape(line)));
        }
        stream.push_str("ET\n");
        stream
    }

    pub fn render_lines(&self, lines: &[String]) -> Result<Vec<u8>> {
        self.write_document(lines)
            .map_err(|e| CorepError::RenderFailed(e.to_string()))
    }

    fn write_document(&self, lines: &[String]) -> std::io::Result<Vec<u8>> {
        let pages = Self::pages(lines);
        // 1 catalog, 2 page tree, 3 font, then a page and its content per page
        let object_count = 3 + pages.len() * 2;

        let mut out: Vec<u8> = Vec::new();
        let mut offsets: Vec<usize> = Vec::with_capacity(object_count);
        out.write_all(b"%PDF-1.4\n")?;

        offsets.push(out.len());
        write!(out, "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n")?;

        let kids = (0..pages.len())
            .map(|i| format!("{} 0 R", 4 + i * 2))
            .collect::<Vec<_>>()
            .join(" ");
        offsets.push(out.len());
        write!(
            out,
            "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n",
            kids,
            pages.len()
        )?;

        offsets.push(out.len());
        write!(
            out,
            "3 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>\nendobj\n"
        )?;

        for (i, page) in pages.iter().enumerate() {
            let page_id = 4 + i * 2;
            let content_id = page_id + 1;
            let content = Self::content_stream(page);

            offsets.push(out.len());
            write!(
                out,
                "{} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>\nendobj\n",
                page_id, PAGE_WIDTH, PAGE_HEIGHT, content_id
            )?;

            offsets.push(out.len());
            write!(
                out,
                "{} 0 obj\n<< /Length {} >>\nstream\n{}endstream\nendobj\n",
                content_id,
                content.len(),
                content
            )?;
        }

        let xref_offset = out.len();
        write!(out, "xref\n0 {}\n0000000000 65535 f \n", object_count + 1)?;
        for offset in &offsets {
            write!(out, "{:010} 00000 n \n", offset)?;
        }
        write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            object_count + 1,
            xref_offset
        )?;

        Ok(out)
    }
}

impl ReportRenderer for PdfRenderer {
    fn render(&self, result: &AnalysisResult) -> Result<Vec<u8>> {
        self.render_lines(&report_lines(result))
    }

    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn file_extension(&self) -> &'static str {
        "pdf"
    }
}

/// Maps text onto the characters the standard Courier encoding can show.
fn to_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '£' => out.push_str("GBP "),
            '€' => out.push_str("EUR "),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\t' => out.push_str("    "),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn escape(line: &str) -> String {
    line.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

const CONTINUATION: &str = "      ";

/// Breaks at spaces where possible; words longer than `width` are split.
fn wrap(line: &str, width: usize) -> Vec<String> {
    if line.len() <= width {
        return vec![line.to_string()];
    }

    let mut lines = Vec::new();
    let mut current: String = line.chars().take_while(|c| *c == ' ').collect();
    let mut fresh = true;

    for word in line.split_whitespace() {
        if !fresh && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
            current.push_str(CONTINUATION);
            fresh = true;
        }
        if !fresh {
            current.push(' ');
        }
        fresh = false;

        let mut rest = word;
        while current.len() + rest.len() > width {
            let room = width.saturating_sub(current.len()).max(1);
            let (head, tail) = rest.split_at(room.min(rest.len()));
            current.push_str(head);
            lines.push(std::mem::take(&mut current));
            current.push_str(CONTINUATION);
            rest = tail;
        }
        current.push_str(rest);
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }
    lines
}
