use crate::clients::ChatMessage;
use crate::models::{
    interview::InterviewType,
    message::{Message, MessageRole},
};

/// User turn that asks the generator for the opening greeting.
pub const OPENING_PROMPT: &str =
    "Hello! Please start the interview by telling me a bit about the candidate.";

pub const FINAL_QUESTION_DIRECTIVE: &str = "IMPORTANT: Only 1 minute remaining in the interview. \
Tell the candidate this is their LAST question, ask them to answer quickly, and wrap up professionally.";

fn persona(interview_type: InterviewType) -> &'static str {
    match interview_type {
        InterviewType::Technical => {
            "You are a strict senior technical interviewer. Focus on coding concepts, system design, \
algorithms, data structures, and technology-specific knowledge. Ask one precise technical question at a time."
        }
        InterviewType::Hr => {
            "You are a professional HR interviewer. Focus on behavioral questions, situational scenarios, \
communication, teamwork, leadership, and career goals. Be warm but professional. Ask one question at a time."
        }
        InterviewType::Mixed => {
            "You are a comprehensive interviewer conducting both technical and HR rounds. Alternate between \
technical depth questions and behavioral/situational questions. Ask one question at a time."
        }
    }
}

pub fn system_prompt(interview_type: InterviewType, skills: &str, duration_minutes: i32) -> String {
    format!(
        "{}\n\nThe candidate's key skills are: {}. The interview duration is {} minutes. \
Start by warmly greeting the candidate and asking them to 'Tell me about yourself'. \
Then proceed with questions derived from their resume and answers. Do NOT repeat questions. \
Keep each question concise (1-3 sentences max). Do NOT provide answers or hints. Be professional and strict.",
        persona(interview_type),
        skills,
        duration_minutes
    )
}

fn resume_note(context: &str) -> String {
    format!(
        "[RESUME CONTEXT, use this to ask informed questions]: {}",
        context
    )
}

/// One generation request in the making.
#[derive(Debug, Clone)]
pub struct ContextAssembler<'a> {
    pub interview_type: InterviewType,
    pub skills: &'a str,
    pub duration_minutes: i32,
    pub resume_context: &'a str,
}

impl ContextAssembler<'_> {
    /// `system prompt, resume note?, transcript, final-question directive?, current turn`.
    /// The transcript is copied through in stored order.
    pub fn assemble(
        &self,
        transcript: &[Message],
        final_question: bool,
        current_turn: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(transcript.len() + 4);
        messages.push(ChatMessage::system(system_prompt(
            self.interview_type,
            self.skills,
            self.duration_minutes,
        )));

        let resume_context = self.resume_context.trim();
        if !resume_context.is_empty() {
            messages.push(ChatMessage::system(resume_note(resume_context)));
        }

        messages.extend(transcript.iter().map(|message| match message.role {
            MessageRole::Ai => ChatMessage::assistant(message.content.clone()),
            MessageRole::User => ChatMessage::user(message.content.clone()),
        }));

        if final_question {
            messages.push(ChatMessage::system(FINAL_QUESTION_DIRECTIVE));
        }

        messages.push(ChatMessage::user(current_turn));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ChatRole;
    use chrono::Utc;

    fn message(id: i64, role: MessageRole, content: &str) -> Message {
        Message {
            id,
            interview_id: 1,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn assembler(resume_context: &str) -> ContextAssembler<'_> {
        ContextAssembler {
            interview_type: InterviewType::Technical,
            skills: "Go,SQL",
            duration_minutes: 10,
            resume_context,
        }
    }

    #[test]
    fn system_prompt_depends_on_type_skills_and_duration() {
        let technical = system_prompt(InterviewType::Technical, "Go,SQL", 10);
        assert!(technical.starts_with("You are a strict senior technical interviewer."));
        assert!(technical.contains("key skills are: Go,SQL."));
        assert!(technical.contains("duration is 10 minutes."));

        assert!(system_prompt(InterviewType::Hr, "", 5).starts_with("You are a professional HR interviewer."));
        assert!(system_prompt(InterviewType::Mixed, "", 5).starts_with("You are a comprehensive interviewer"));
        assert_eq!(technical, system_prompt(InterviewType::Technical, "Go,SQL", 10));
    }

    #[test]
    fn full_context_has_every_part_in_order() {
        let transcript = vec![
            message(1, MessageRole::Ai, "Tell me about yourself."),
            message(2, MessageRole::User, "I build APIs."),
            message(3, MessageRole::Ai, "Which database?"),
        ];
        let messages = assembler("Led payments team").assemble(&transcript, true, "Postgres.");

        let roles: Vec<ChatRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [
                ChatRole::System,
                ChatRole::System,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::System,
                ChatRole::User,
            ]
        );
        assert!(messages[1].content.ends_with("Led payments team"));
        assert_eq!(messages[2].content, "Tell me about yourself.");
        assert_eq!(messages[4].content, "Which database?");
        assert_eq!(messages[5].content, FINAL_QUESTION_DIRECTIVE);
        assert_eq!(messages[6].content, "Postgres.");
    }

    #[test]
    fn blank_resume_context_and_normal_time_omit_optional_notes() {
        let transcript = vec![message(1, MessageRole::Ai, "Hi")];
        let messages = assembler("  \n").assemble(&transcript, false, "Hello");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1], ChatMessage::assistant("Hi"));
        assert_eq!(messages[2], ChatMessage::user("Hello"));
    }
}
