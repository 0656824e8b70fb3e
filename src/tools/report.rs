//! Report writer tool: saves the model's content as `output.<fileType>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{fs, io::AsyncWriteExt};

use crate::error::{Result, TaskError};
use crate::tool::{Tool, ToolRegistry};

pub const REPORT_TOOL: &str = "reportService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Doc,
    Pdf,
    Txt,
}

impl ReportFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "doc" => Ok(ReportFormat::Doc),
            "pdf" => Ok(ReportFormat::Pdf),
            "txt" => Ok(ReportFormat::Txt),
            _ => Err(TaskError::InvalidInput(
                "Invalid file type. Supported types: doc, txt, pdf.".into(),
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Doc => "doc",
            ReportFormat::Pdf => "pdf",
            ReportFormat::Txt => "txt",
        }
    }

    pub fn render(&self, content: &str) -> Vec<u8> {
        match self {
            ReportFormat::Txt => content.as_bytes().to_vec(),
            ReportFormat::Pdf => render_pdf(content),
            ReportFormat::Doc => render_rtf(content).into_bytes(),
        }
    }
}

pub fn report_toolkit(output_dir: impl Into<PathBuf>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ReportTool::new(output_dir));
    registry
}

pub struct ReportTool {
    output_dir: PathBuf,
}

impl ReportTool {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write(&self, format: ReportFormat, content: &str) -> std::io::Result<(PathBuf, usize)> {
        fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("output.{}", format.extension()));
        let bytes = format.render(content);
        let mut file = fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok((path, bytes.len()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportInput {
    content: String,
    file_type: String,
}

#[async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        REPORT_TOOL
    }

    fn description(&self) -> &str {
        "Generate a report in doc, pdf or txt format and save it to the output folder."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "Full report text"},
                "fileType": {"type": "string", "enum": ["doc", "pdf", "txt"]}
            },
            "required": ["content", "fileType"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let req: ReportInput = serde_json::from_value(input)
            .map_err(|err| TaskError::InvalidInput(format!("Invalid reportService input: {err}")))?;
        let format = ReportFormat::parse(req.file_type.trim().to_ascii_lowercase().as_str())?;

        let (path, bytes) = self
            .write(format, &req.content)
            .await
            .map_err(|err| TaskError::ToolExecution {
                name: REPORT_TOOL.into(),
                source: Box::new(err),
            })?;
        tracing::info!(path = %path.display(), bytes, "report saved");

        Ok(json!({
            "path": path.display().to_string(),
            "fileType": format.extension(),
            "bytes": bytes,
        }))
    }
}

const PDF_LINE_WIDTH: usize = 90;
const PDF_MAX_LINES: usize = 52;

fn pdf_escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn wrap_lines(content: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in content.lines() {
        let mut current = String::new();
        for word in raw.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

/// Single-page, Helvetica-only PDF. Text past the page is dropped.
fn render_pdf(content: &str) -> Vec<u8> {
    let mut stream = String::from("BT\n/F1 12 Tf\n14 TL\n50 750 Td\n");
    for line in wrap_lines(content, PDF_LINE_WIDTH)
        .iter()
        .take(PDF_MAX_LINES)
    {
        stream.push_str(&format!("({}) Tj T*\n", pdf_escape(line)));
    }
    stream.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 600 800] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.into_bytes()
}

/// Rich Text document; Word opens it as a `.doc`.
fn render_rtf(content: &str) -> String {
    let mut body = String::new();
    for ch in content.chars() {
        match ch {
            '\\' | '{' | '}' => {
                body.push('\\');
                body.push(ch);
            }
            '\n' => body.push_str("\\par\n"),
            '\r' => {}
            c if c.is_ascii() => body.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    body.push_str(&format!("\\u{}?", *unit as i16));
                }
            }
        }
    }
    format!("{{\\rtf1\\ansi\\deff0{{\\fonttbl{{\\f0 Helvetica;}}}}\\f0\\fs24 {body}}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_text_report() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/out");
        let registry = report_toolkit(&target);

        let out = registry
            .invoke(REPORT_TOOL, json!({"content": "hello report", "fileType": "txt"}))
            .await
            .unwrap();

        let path = target.join("output.txt");
        assert_eq!(out["path"], path.display().to_string());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello report");
    }

    #[tokio::test]
    async fn writes_pdf_report() {
        let dir = TempDir::new().unwrap();
        let registry = report_toolkit(dir.path());

        registry
            .invoke(REPORT_TOOL, json!({"content": "AI news (2025)", "fileType": "pdf"}))
            .await
            .unwrap();

        let bytes = std::fs::read(dir.path().join("output.pdf")).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("(AI news \\(2025\\)) Tj"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[tokio::test]
    async fn rejects_unknown_file_type() {
        let dir = TempDir::new().unwrap();
        let registry = report_toolkit(dir.path());

        let err = registry
            .invoke(REPORT_TOOL, json!({"content": "x", "fileType": "xlsx"}))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Supported types: doc, txt, pdf"));
        assert!(!dir.path().join("output.xlsx").exists());
    }

    #[test]
    fn pdf_xref_offsets_point_at_objects() {
        let pdf = String::from_utf8(render_pdf("line one\nline two")).unwrap();
        let xref = pdf.find("xref\n").unwrap();
        let startxref: usize = pdf
            .split("startxref\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert_eq!(startxref, xref);
        let first_entry = pdf[xref..].lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(pdf[offset..].starts_with("1 0 obj"));
    }

    #[test]
    fn rtf_escapes_control_characters() {
        let rtf = render_rtf("a{b}\\c\nnext é");
        assert!(rtf.starts_with("{\\rtf1"));
        assert!(rtf.contains("a\\{b\\}\\\\c\\par\nnext \\u233?"));
        assert!(rtf.ends_with('}'));
    }

    #[test]
    fn wraps_long_lines() {
        let long = "word ".repeat(40);
        let lines = wrap_lines(&long, 20);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.len() <= 20));
    }
}
