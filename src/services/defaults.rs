use crate::clients::CollaboratorError;
use crate::models::report::{LearningPathItem, ScoreCard};

const FALLBACK_QUESTIONS: &[&str] = &[
    "Can you walk me through a challenging project you've worked on?",
    "How do you approach debugging complex issues?",
    "Describe your experience with the technologies listed on your resume.",
    "What is your greatest professional achievement so far?",
    "Where do you see yourself in 5 years?",
];

const RECOVERY_QUESTION: &str = "Thank you for your response. Let's continue. Can you tell me \
about a time you had to learn something new quickly?";

const OPENING_GREETING: &str = "Hello, and welcome to your interview! \
To begin, please tell me about yourself.";

const CLOSING_MESSAGE: &str = "Time is up! Thank you for your responses today. \
Your interview session has ended. Your detailed report will be ready shortly.";

/// Every value substituted when a collaborator fails, in one place.
#[derive(Debug, Clone, Default)]
pub struct DefaultArtifacts;

impl DefaultArtifacts {
    pub fn opening_greeting(&self) -> String {
        OPENING_GREETING.to_string()
    }

    pub fn closing_message(&self) -> String {
        CLOSING_MESSAGE.to_string()
    }

    /// Question used when generation fails for the turn after `round`. An
    /// unconfigured generator rotates through a fixed list; a failing one
    /// gets a single recovery prompt.
    pub fn question(&self, round: i32, error: &CollaboratorError) -> String {
        match error {
            CollaboratorError::Disabled(_) => {
                let idx = round.max(0) as usize % FALLBACK_QUESTIONS.len();
                FALLBACK_QUESTIONS[idx].to_string()
            }
            _ => RECOVERY_QUESTION.to_string(),
        }
    }

    pub fn scores(&self) -> ScoreCard {
        ScoreCard {
            overall_score: 72.0,
            technical_score: 68.0,
            communication_score: 78.0,
            hr_score: 70.0,
            strengths: strings(&[
                "Good communication skills",
                "Clear project descriptions",
                "Enthusiastic attitude",
            ]),
            improvements: strings(&[
                "Deepen technical depth",
                "Provide more quantified examples",
                "Structure answers using STAR method",
            ]),
            summary: "The candidate showed reasonable communication skills and enthusiasm. \
With more structured, in-depth technical answers and quantified achievements, \
they can significantly improve their interview performance."
                .to_string(),
        }
    }

    pub fn learning_path(&self) -> Vec<LearningPathItem> {
        vec![
            item(
                "Technical",
                "Data Structures & Algorithms",
                "Strengthen core CS fundamentals to better answer technical questions.",
                &["LeetCode", "Cracking the Coding Interview"],
                40.0,
                "High",
            ),
            item(
                "Communication",
                "STAR Method for Behavioral Answers",
                "Structure answers using Situation, Task, Action, Result to improve clarity.",
                &["Big Interview", "YouTube: STAR Method tutorial"],
                5.0,
                "High",
            ),
            item(
                "Technical",
                "System Design Fundamentals",
                "Learn scalable system design concepts essential for senior roles.",
                &["Grokking the System Design Interview", "System Design Primer (GitHub)"],
                20.0,
                "Medium",
            ),
            item(
                "Behavioral",
                "Leadership & Conflict Resolution",
                "Develop compelling stories about leadership and handling workplace challenges.",
                &["Harvard Business Review", "LinkedIn Learning: Leadership Essentials"],
                6.0,
                "Medium",
            ),
            item(
                "Communication",
                "Technical Communication & Presentation",
                "Improve ability to explain complex technical concepts clearly to non-technical audiences.",
                &["Toastmasters", "Coursera: Technical Writing"],
                10.0,
                "Low",
            ),
        ]
    }

    /// Document reference stored when rendering fails.
    pub fn document_path(&self) -> String {
        String::new()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn item(
    category: &str,
    topic: &str,
    description: &str,
    resources: &[&str],
    estimated_hours: f64,
    priority: &str,
) -> LearningPathItem {
    LearningPathItem {
        category: category.to_string(),
        topic: topic.to_string(),
        description: description.to_string(),
        resources: strings(resources),
        estimated_hours,
        priority: priority.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scores_are_in_range_and_complete() {
        let scores = DefaultArtifacts.scores();
        assert_eq!(scores.clone().clamped(), scores);
        assert_eq!(scores.overall_score, 72.0);
        assert_eq!(scores.strengths.len(), 3);
        assert_eq!(scores.improvements.len(), 3);
        assert!(!scores.summary.is_empty());
    }

    #[test]
    fn default_learning_path_has_five_prioritised_items() {
        let path = DefaultArtifacts.learning_path();
        assert_eq!(path.len(), 5);
        assert_eq!(path[0].topic, "Data Structures & Algorithms");
        assert!(path.iter().all(|item| !item.resources.is_empty()));
    }

    #[test]
    fn fallback_question_depends_on_failure_kind() {
        let disabled = CollaboratorError::Disabled("question generation");
        assert_eq!(DefaultArtifacts.question(0, &disabled), FALLBACK_QUESTIONS[0]);
        assert_eq!(DefaultArtifacts.question(6, &disabled), FALLBACK_QUESTIONS[1]);

        let down = CollaboratorError::Transport("timeout".to_string());
        assert_eq!(DefaultArtifacts.question(3, &down), RECOVERY_QUESTION);
    }
}
