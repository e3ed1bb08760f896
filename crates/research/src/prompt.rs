//! Research prompt assembly.
//!
//! The runner receives one flat prompt built from the intake answers
//! plus any answered follow-up questions.

use epistle_core::snapshot::JobSnapshot;

/// Build the deep-research prompt for a job.
pub fn build_research_prompt(snapshot: &JobSnapshot) -> String {
    let form = &snapshot.form;
    let mut prompt = format!(
        "Research the following issue for a formal letter.\n\n\
         Issue:\n{}\n\n\
         Affected parties:\n{}\n\n\
         Background:\n{}\n\n\
         Desired outcome:\n{}\n",
        form.issue.trim(),
        form.affected_parties.trim(),
        form.background.trim(),
        form.desired_outcome.trim(),
    );

    let answered: Vec<(&String, &String)> = snapshot
        .follow_up_questions
        .iter()
        .zip(snapshot.follow_up_answers.iter())
        .filter(|(_, answer)| !answer.trim().is_empty())
        .collect();

    if !answered.is_empty() {
        prompt.push_str("\nClarifications:\n");
        for (question, answer) in answered {
            prompt.push_str(&format!("Q: {}\nA: {}\n", question.trim(), answer.trim()));
        }
    }

    prompt
}
