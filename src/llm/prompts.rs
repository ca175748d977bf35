//! Deterministic prompt templates for the orchestration layer

/// Question types supported by question generation
pub const QUESTION_TYPES: &[&str] = &[
    "comprehension",
    "application",
    "analysis",
    "synthesis",
    "evaluation",
];

fn difficulty_description(difficulty: u8) -> &'static str {
    match difficulty {
        1 => "Very Easy - Basic recall and recognition",
        2 => "Easy - Simple understanding and identification",
        3 => "Medium - Application of concepts to familiar situations",
        4 => "Hard - Analysis and synthesis of multiple concepts",
        5 => "Very Hard - Evaluation and creation of new solutions",
        _ => "Medium - Application of concepts to familiar situations",
    }
}

fn question_template(question_type: &str) -> &'static str {
    match question_type {
        "application" => "Create a question that requires applying the concept to solve a problem.",
        "analysis" => "Create a question that requires breaking down the concept into components.",
        "synthesis" => "Create a question that requires combining this concept with others.",
        "evaluation" => "Create a question that requires judging or critiquing the concept.",
        _ => "Create a question that tests understanding of the core concept.",
    }
}

/// System prompt for question generation
pub const QUESTION_SYSTEM_PROMPT: &str = "You are an expert educator creating learning assessment questions. Always follow the exact format requested.";

/// System prompt for answer evaluation
pub const EVALUATION_SYSTEM_PROMPT: &str =
    "You are an expert educator evaluating student answers fairly and consistently.";

/// System prompt for academic context expansion
pub const EXPANSION_SYSTEM_PROMPT: &str =
    "You are an expert academic writer creating educational content.";

/// Build the question-generation prompt. Demands a reply shaped as
/// `QUESTION:` / `EXPECTED_ANSWER:`.
pub fn question_prompt(
    chunk_content: &str,
    concept: &str,
    difficulty: u8,
    context: &str,
    question_type: &str,
) -> String {
    let context = if context.is_empty() {
        "General learning assessment"
    } else {
        context
    };

    format!(
        "You are an expert educator creating assessment questions for online learning.\n\
         \n\
         TASK: {task}\n\
         \n\
         CONTENT TO ANALYZE:\n\
         {chunk_content}\n\
         \n\
         TARGET CONCEPT: {concept}\n\
         DIFFICULTY LEVEL: {difficulty}/5 - {difficulty_desc}\n\
         LEARNING CONTEXT: {context}\n\
         \n\
         REQUIREMENTS:\n\
         1. Create ONE clear, well-formed question (100-500 characters)\n\
         2. Provide ONE comprehensive expected answer (200-1000 characters)\n\
         3. Ensure the question directly relates to the concept: \"{concept}\"\n\
         4. Match the difficulty level: {difficulty}/5\n\
         5. The question should be answerable based on the provided content\n\
         \n\
         FORMAT YOUR RESPONSE EXACTLY AS:\n\
         QUESTION: [Your question here]\n\
         EXPECTED_ANSWER: [Your expected answer here]\n\
         \n\
         QUALITY CRITERIA:\n\
         - Question is clear and unambiguous\n\
         - Question tests the specific concept mentioned\n\
         - Answer is complete and educational\n\
         - Appropriate difficulty for level {difficulty}/5\n\
         - No formatting artifacts or incomplete thoughts",
        task = question_template(question_type),
        chunk_content = chunk_content,
        concept = concept,
        difficulty = difficulty,
        difficulty_desc = difficulty_description(difficulty),
        context = context,
    )
}

/// Build the answer-evaluation prompt. Demands a reply shaped as
/// `SCORE:` / `FEEDBACK:` / `SUGGESTIONS:`.
pub fn evaluation_prompt(
    question: &str,
    expected_answer: &str,
    student_answer: &str,
    context: &str,
    difficulty: u8,
) -> String {
    let context = if context.is_empty() {
        "General learning assessment"
    } else {
        context
    };

    format!(
        "You are an expert educator evaluating a student's answer.\n\
         \n\
         QUESTION: {question}\n\
         \n\
         EXPECTED ANSWER: {expected_answer}\n\
         \n\
         STUDENT ANSWER: {student_answer}\n\
         \n\
         CONTEXT: {context}\n\
         DIFFICULTY LEVEL: {difficulty}/5\n\
         \n\
         TASK: Evaluate the student's answer based on:\n\
         1. Correctness - Does it accurately answer the question?\n\
         2. Completeness - Does it cover all key points from the expected answer?\n\
         3. Understanding - Does it demonstrate comprehension of the concept?\n\
         4. Clarity - Is it well-expressed and clear?\n\
         \n\
         PROVIDE:\n\
         1. A score from 0.0 to 1.0 (where 0.8+ indicates mastery)\n\
         2. Specific feedback on what was done well\n\
         3. Specific feedback on what could be improved\n\
         4. 1-3 suggestions for improvement (only if score < 0.8)\n\
         \n\
         FORMAT YOUR RESPONSE EXACTLY AS:\n\
         SCORE: [decimal between 0.0 and 1.0]\n\
         FEEDBACK: [Detailed feedback combining strengths and areas for improvement]\n\
         SUGGESTIONS: [Comma-separated list of suggestions, or \"None\" if score >= 0.8]\n\
         \n\
         SCORING GUIDELINES:\n\
         - 0.9-1.0: Excellent answer that exceeds expectations\n\
         - 0.8-0.89: Good answer showing mastery of the concept\n\
         - 0.6-0.79: Adequate answer with room for improvement\n\
         - 0.4-0.59: Partial understanding demonstrated\n\
         - 0.2-0.39: Minimal understanding shown\n\
         - 0.0-0.19: Answer misses the point or is incorrect",
        question = question,
        expected_answer = expected_answer,
        student_answer = student_answer,
        context = context,
        difficulty = difficulty,
    )
}

/// Build the academic-context expansion prompt: `n` scholarly sentences
/// expanding the user's query, one per line.
pub fn expansion_prompt(user_input: &str, num_sentences: usize) -> String {
    format!(
        "Generate exactly {num_sentences} academic sentences that expand on the topic below. \
         Each sentence should use scholarly vocabulary a textbook on the subject would use, \
         covering definitions, applications and related concepts.\n\
         \n\
         TOPIC: {user_input}\n\
         \n\
         Write one sentence per line with no numbering or bullets.",
        num_sentences = num_sentences,
        user_input = user_input,
    )
}

/// Build the content-analysis prompt for a given analysis kind.
pub fn analysis_prompt(text: &str, kind: &str) -> String {
    let task = match kind {
        "difficulty" => {
            "Rate the difficulty of this content from 0.0 (introductory) to 1.0 (expert) \
             and explain the rating in two sentences. Reply as:\nDIFFICULTY: [decimal]\nREASON: [explanation]"
        }
        "concepts" => {
            "List the main concepts this content teaches, one per line, most central first. \
             Reply with concept names only."
        }
        "readability" => {
            "Assess the readability of this content for a student audience in three sentences, \
             noting sentence complexity and vocabulary level."
        }
        _ => "Summarize the educational content of this text in three sentences.",
    };

    format!("{task}\n\nCONTENT:\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_prompt_is_deterministic() {
        let a = question_prompt("content", "graphs", 3, "", "comprehension");
        let b = question_prompt("content", "graphs", 3, "", "comprehension");
        assert_eq!(a, b);
    }

    #[test]
    fn test_question_prompt_embeds_inputs() {
        let prompt = question_prompt("the content body", "binary trees", 4, "intro course", "analysis");

        assert!(prompt.contains("the content body"));
        assert!(prompt.contains("binary trees"));
        assert!(prompt.contains("4/5"));
        assert!(prompt.contains("intro course"));
        assert!(prompt.contains("breaking down the concept"));
        assert!(prompt.contains("QUESTION:"));
        assert!(prompt.contains("EXPECTED_ANSWER:"));
    }

    #[test]
    fn test_evaluation_prompt_shape() {
        let prompt = evaluation_prompt("Q?", "expected", "student", "", 3);

        assert!(prompt.contains("SCORE:"));
        assert!(prompt.contains("FEEDBACK:"));
        assert!(prompt.contains("SUGGESTIONS:"));
        assert!(prompt.contains("General learning assessment"));
    }

    #[test]
    fn test_expansion_prompt_counts_sentences() {
        let prompt = expansion_prompt("binary search trees", 5);
        assert!(prompt.contains("exactly 5 academic sentences"));
        assert!(prompt.contains("binary search trees"));
    }

    #[test]
    fn test_unknown_question_type_defaults_to_comprehension() {
        let prompt = question_prompt("c", "x", 3, "", "unknown");
        assert!(prompt.contains("tests understanding of the core concept"));
    }
}
