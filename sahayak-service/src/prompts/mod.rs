//! Instructional prompt templates and the composer that fills them.
//!
//! Template text lives under `templates/` and is embedded at compile time.
//! Composition is pure: the same request always yields the same instruction.

use crate::dtos::{ContentRequest, LessonPlanRequest, QuickMathQuery, DEFAULT_LOCATION};

/// A fixed template with `{name}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    text: &'static str,
}

impl PromptTemplate {
    pub const fn new(text: &'static str) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    /// Substitute placeholders in one left-to-right pass.
    ///
    /// Unknown placeholders are kept verbatim. Substituted values are not
    /// scanned again, so user text containing braces is inserted literally.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.text.len() + 64);
        let mut rest = self.text;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let value = after.find('}').and_then(|close| {
                let key = &after[..close];
                vars.iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| (*value, close))
            });

            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

pub static SYSTEM_ASSISTANT: PromptTemplate =
    PromptTemplate::new(include_str!("../../templates/system_assistant.txt"));

pub static SYSTEM_VISION: PromptTemplate =
    PromptTemplate::new(include_str!("../../templates/system_vision.txt"));

pub static CONTENT: PromptTemplate =
    PromptTemplate::new(include_str!("../../templates/content.txt"));

pub static IMAGE_ANALYSIS: PromptTemplate =
    PromptTemplate::new(include_str!("../../templates/image_analysis.txt"));

pub static LESSON_PLAN: PromptTemplate =
    PromptTemplate::new(include_str!("../../templates/lesson_plan.txt"));

pub static QUICK_MATH: PromptTemplate =
    PromptTemplate::new(include_str!("../../templates/quick_math.txt"));

/// Used when an image request carries no prompt of its own.
pub const DEFAULT_IMAGE_PROMPT: &str = "Analyze this educational image and provide multi-grade \
     teaching suggestions for a low-resource classroom.";

/// Render a grade list as `[3, 5]`.
pub fn format_grade_levels(grades: &[i32]) -> String {
    let joined = grades
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}

pub fn compose_content(request: &ContentRequest) -> String {
    let grades = format_grade_levels(&request.grade_levels);
    CONTENT.render(&[
        ("location", request.location.as_str()),
        ("grade_levels", grades.as_str()),
        ("subject", request.subject.as_str()),
        ("prompt", request.prompt.as_str()),
    ])
}

pub fn compose_image_analysis(prompt: Option<&str>, grade_levels: &[i32]) -> String {
    let grades = format_grade_levels(grade_levels);
    IMAGE_ANALYSIS.render(&[
        ("prompt", prompt.unwrap_or(DEFAULT_IMAGE_PROMPT)),
        ("grade_levels", grades.as_str()),
    ])
}

pub fn compose_lesson_plan(request: &LessonPlanRequest) -> String {
    let grades = format_grade_levels(&request.grade_levels);
    let duration = request.duration_minutes.to_string();
    LESSON_PLAN.render(&[
        ("topic", request.topic.as_str()),
        ("grade_levels", grades.as_str()),
        ("duration_minutes", duration.as_str()),
        ("resources", request.resources.as_str()),
        ("location", request.location.as_str()),
    ])
}

pub fn compose_quick_math(query: &QuickMathQuery) -> String {
    let grade = query.grade.to_string();
    QUICK_MATH.render(&[
        ("topic", query.topic.as_str()),
        ("grade", grade.as_str()),
        ("location", DEFAULT_LOCATION),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_request(prompt: &str, grades: Vec<i32>) -> ContentRequest {
        ContentRequest {
            prompt: prompt.to_string(),
            grade_levels: grades,
            subject: "mathematics".to_string(),
            location: "rural India".to_string(),
            max_tokens: None,
        }
    }

    #[test]
    fn render_substitutes_known_placeholders() {
        let template = PromptTemplate::new("Hello {name}, grade {grade}.");
        assert_eq!(
            template.render(&[("name", "Asha"), ("grade", "4")]),
            "Hello Asha, grade 4."
        );
    }

    #[test]
    fn render_keeps_unknown_placeholders_and_stray_braces() {
        let template = PromptTemplate::new("{missing} and { open");
        assert_eq!(template.render(&[("name", "x")]), "{missing} and { open");
    }

    #[test]
    fn render_does_not_rescan_values() {
        let template = PromptTemplate::new("{a} then {b}");
        assert_eq!(
            template.render(&[("a", "{b}"), ("b", "B")]),
            "{b} then B"
        );
    }

    #[test]
    fn render_leaves_template_untouched() {
        let template = PromptTemplate::new("Topic: {topic}");
        let _ = template.render(&[("topic", "fractions")]);
        assert_eq!(template.text(), "Topic: {topic}");
    }

    #[test]
    fn content_composition_is_deterministic() {
        let request = content_request("teach fractions", vec![3, 5]);
        let first = compose_content(&request);
        let second = compose_content(&request);
        assert_eq!(first, second);
        assert!(first.contains("User Request: teach fractions"));
        assert!(first.contains("Grade levels: [3, 5]"));
        assert!(first.contains("Subject: mathematics"));
        assert!(first.contains("Multi-grade classroom in rural India"));
    }

    #[test]
    fn image_prompt_falls_back_to_default() {
        let composed = compose_image_analysis(None, &[4, 5, 6]);
        assert!(composed.starts_with(DEFAULT_IMAGE_PROMPT));
        assert!(composed.contains("[4, 5, 6]"));

        let custom = compose_image_analysis(Some("Read the worksheet"), &[2]);
        assert!(custom.starts_with("Read the worksheet"));
    }

    #[test]
    fn lesson_plan_includes_parameters() {
        let request = LessonPlanRequest {
            topic: "Water cycle".to_string(),
            grade_levels: vec![3, 4],
            duration_minutes: 40,
            resources: "chalk".to_string(),
            location: "Bihar".to_string(),
        };
        let composed = compose_lesson_plan(&request);
        assert!(composed.contains("teaching \"Water cycle\""));
        assert!(composed.contains("Duration: 40 minutes"));
        assert!(composed.contains("Available resources: chalk"));
        assert!(composed.contains("Location context: Bihar"));
    }

    #[test]
    fn quick_math_names_grade_and_topic() {
        let composed = compose_quick_math(&QuickMathQuery {
            grade: 3,
            topic: "subtraction".to_string(),
        });
        assert!(composed.contains("about subtraction for grade 3"));
        assert!(!composed.contains('{'));
    }

    #[test]
    fn templates_have_no_unfilled_placeholders_after_composition() {
        let composed = compose_content(&content_request("x", vec![1]));
        assert!(!composed.contains('{'));
    }

    #[test]
    fn format_grades() {
        assert_eq!(format_grade_levels(&[3, 5]), "[3, 5]");
        assert_eq!(format_grade_levels(&[7]), "[7]");
    }
}
