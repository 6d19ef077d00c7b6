use std::io::BufWriter;
use std::path::PathBuf;

use async_trait::async_trait;
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};

use super::{CollaboratorError, ReportDocument, ReportRenderer};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 20.0;

/// Writes A4 PDF reports into `report_dir`.
pub struct PdfReportRenderer {
    report_dir: PathBuf,
}

impl PdfReportRenderer {
    pub fn new(report_dir: PathBuf) -> Self {
        Self { report_dir }
    }
}

#[async_trait]
impl ReportRenderer for PdfReportRenderer {
    async fn render(&self, document: &ReportDocument) -> Result<String, CollaboratorError> {
        let filename = format!(
            "report_interview_{}_{}.pdf",
            document.interview.id, document.owner.id
        );
        let path = self.report_dir.join(filename);

        let owned = document.clone();
        let bytes = tokio::task::spawn_blocking(move || render_pdf(&owned))
            .await
            .map_err(|e| CollaboratorError::Io(format!("pdf task failed: {}", e)))??;

        tokio::fs::create_dir_all(&self.report_dir).await?;
        tokio::fs::write(&path, bytes).await?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Cursor over a growing document that starts a new page when it runs out of room.
struct Writer {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl Writer {
    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.ensure_room(12.0);
        self.y -= 4.0;
        self.layer.use_text(text, size, Mm(LEFT), Mm(self.y), &self.bold);
        self.y -= 7.0;
    }

    fn paragraph(&mut self, text: &str, indent: f32, width_chars: usize) {
        for line in wrap_text(text, width_chars) {
            self.ensure_room(5.0);
            self.layer.use_text(&line, 9.5, Mm(LEFT + indent), Mm(self.y), &self.regular);
            self.y -= 4.8;
        }
    }

    fn gap(&mut self, amount: f32) {
        self.y -= amount;
    }
}

fn font_error(e: printpdf::Error) -> CollaboratorError {
    CollaboratorError::Io(format!("PDF font error: {}", e))
}

fn render_pdf(document: &ReportDocument) -> Result<Vec<u8>, CollaboratorError> {
    let title = format!("Interview Report #{}", document.interview.id);
    let (doc, page1, layer1) =
        PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(font_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(font_error)?;

    let mut w = Writer {
        doc,
        layer,
        regular,
        bold,
        y: TOP,
    };

    w.heading("AI Mock Interview Report", 18.0);
    let interview = &document.interview;
    let owner = &document.owner;
    w.paragraph(&format!("Candidate: {} <{}>", owner.name, owner.email), 0.0, 90);
    if !owner.education.is_empty() {
        w.paragraph(&format!("Education: {}", owner.education), 0.0, 90);
    }
    w.paragraph(
        &format!(
            "Interview: {} | {} minutes | skills: {}",
            interview.interview_type.as_str(),
            interview.duration_minutes,
            if interview.skills.is_empty() { "-" } else { &interview.skills }
        ),
        0.0,
        90,
    );
    w.paragraph(
        &format!(
            "Status: {} | rounds: {} | proctoring warnings: {}",
            interview.status.as_str(),
            interview.round,
            interview.warning_count
        ),
        0.0,
        90,
    );
    if let Some(ended_at) = interview.ended_at {
        w.paragraph(&format!("Ended: {}", ended_at.format("%Y-%m-%d %H:%M UTC")), 0.0, 90);
    }

    let scores = &document.scores;
    w.heading("Scores", 13.0);
    for (label, value) in [
        ("Overall", scores.overall_score),
        ("Technical", scores.technical_score),
        ("Communication", scores.communication_score),
        ("HR / Behavioral", scores.hr_score),
    ] {
        w.paragraph(&format!("{:<16} {:>5.0} / 100", label, value), 4.0, 80);
    }

    w.heading("Summary", 13.0);
    w.paragraph(&scores.summary, 0.0, 95);

    w.heading("Strengths", 13.0);
    for item in &scores.strengths {
        w.paragraph(&format!("+ {}", item), 4.0, 90);
    }

    w.heading("Areas to Improve", 13.0);
    for item in &scores.improvements {
        w.paragraph(&format!("- {}", item), 4.0, 90);
    }

    w.heading("Learning Path", 13.0);
    for (idx, item) in document.learning_path.iter().enumerate() {
        w.paragraph(
            &format!(
                "{}. {} [{} | {} priority | ~{}h]",
                idx + 1,
                item.topic,
                item.category,
                item.priority,
                item.estimated_hours
            ),
            4.0,
            90,
        );
        w.paragraph(&item.description, 10.0, 85);
        if !item.resources.is_empty() {
            w.paragraph(&format!("Resources: {}", item.resources.join(", ")), 10.0, 85);
        }
        w.gap(1.5);
    }

    w.heading("Transcript", 13.0);
    for message in &document.transcript {
        w.paragraph(
            &format!("{}: {}", message.role.speaker(), message.content),
            0.0,
            95,
        );
        w.gap(1.5);
    }

    let mut buf = BufWriter::new(Vec::new());
    w.doc
        .save(&mut buf)
        .map_err(|e| CollaboratorError::Io(format!("PDF save error: {}", e)))?;
    buf.into_inner()
        .map_err(|e| CollaboratorError::Io(format!("PDF buffer error: {}", e)))
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        interview::{sample_interview, InterviewStatus},
        message::{Message, MessageRole},
        report::{LearningPathItem, ScoreCard},
        user::OwnerProfile,
    };
    use chrono::Utc;

    fn document(turns: usize) -> ReportDocument {
        let interview = sample_interview(InterviewStatus::Completed);
        let transcript = (0..turns)
            .map(|i| Message {
                id: i as i64,
                interview_id: interview.id,
                role: if i % 2 == 0 { MessageRole::Ai } else { MessageRole::User },
                content: "A reasonably long answer about distributed systems and trade-offs. ".repeat(4),
                created_at: Utc::now(),
            })
            .collect();

        ReportDocument {
            owner: OwnerProfile {
                id: interview.user_id,
                name: "Jane Doe".to_string(),
                email: "jane@example.com".to_string(),
                education: "BSc".to_string(),
            },
            interview,
            scores: ScoreCard {
                overall_score: 70.0,
                technical_score: 65.0,
                communication_score: 80.0,
                hr_score: 72.0,
                strengths: vec!["Clear".to_string()],
                improvements: vec!["Depth".to_string()],
                summary: "Solid interview.".to_string(),
            },
            transcript,
            learning_path: vec![LearningPathItem {
                category: "Technical".to_string(),
                topic: "Consensus".to_string(),
                description: "Raft and Paxos.".to_string(),
                resources: vec!["DDIA".to_string()],
                estimated_hours: 10.0,
                priority: "High".to_string(),
            }],
        }
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six", 9);
        assert_eq!(lines, vec!["one two", "three", "four five", "six"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn renders_a_pdf_spanning_several_pages() {
        let bytes = render_pdf(&document(60)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn render_writes_named_file_into_report_dir() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PdfReportRenderer::new(dir.path().join("reports"));
        let path = renderer.render(&document(4)).await.unwrap();

        assert!(path.ends_with("report_interview_1_7.pdf"));
        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(b"%PDF"));
    }
}
