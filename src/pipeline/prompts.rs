//! Agent personas and task prompts for the drafting crew.

use crate::mail::{EmailMessage, MailMessage};

/// Per-message body cap in thread transcripts.
const THREAD_BODY_MAX_CHARS: usize = 2000;

/// Role, goal and backstory for one crew member.
#[derive(Debug, Clone, Copy)]
pub struct AgentProfile {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

pub const FILTER_AGENT: AgentProfile = AgentProfile {
    role: "Senior Email Analyst",
    goal: "Filter out non-essential emails like newsletters and promotional content",
    backstory: "As a senior email analyst, you have extensive experience in email content analysis. \
        You are adept at distinguishing important emails from spam, newsletters, and other non-essential content. \
        You know the patterns and markers that signify the importance of an email.",
};

pub const ACTION_AGENT: AgentProfile = AgentProfile {
    role: "Email Action Specialist",
    goal: "Identify the action-required emails and understand what each one asks for.",
    backstory: "With a keen eye for detail and a knack for understanding context, you specialize in \
        identifying emails that require action. You interpret the urgency and importance of an email \
        from the conversation around it.",
};

pub const WRITER_AGENT: AgentProfile = AgentProfile {
    role: "Email Response Writer",
    goal: "Draft responses to action-required emails",
    backstory: "You are a skilled writer who crafts clear, concise and effective email responses. \
        Each response you write is tailored to the needs and context of the email it answers.",
};

/// System prompt for an agent: persona followed by the output contract.
pub fn agent_system_prompt(agent: &AgentProfile, output: &str) -> String {
    format!(
        "You are the {role}.\nGoal: {goal}\n\n{backstory}\n\n{output}",
        role = agent.role,
        goal = agent.goal,
        backstory = agent.backstory,
    )
}

pub const FILTER_OUTPUT: &str = "Respond with ONLY a JSON object:\n\
    {\"checked_email_ids\": [\"...\"], \"action_required_email\": [\"...\"]}\n\n\
    - \"checked_email_ids\": every email ID you were given\n\
    - \"action_required_email\": the IDs that need a response or action\n\
    Use the IDs exactly as given. Never invent IDs.";

pub const ANALYSIS_OUTPUT: &str = "Respond with ONLY a JSON object:\n\
    {\"thread_id\": \"...\", \"summary\": \"...\", \"main_points\": [\"...\"], \"user\": \"...\", \
    \"recipient\": \"...\", \"communication_style\": \"...\", \"sender_email\": \"...\"}\n\n\
    - \"user\": the person who will write the reply\n\
    - \"recipient\": the person the reply goes to\n\
    - \"sender_email\": the address the reply should be sent to";

pub const WRITER_OUTPUT: &str = "Respond with ONLY a JSON object:\n\
    {\"to\": \"...\", \"subject\": \"...\", \"message\": \"...\"}\n\n\
    - \"to\": the recipient's email address\n\
    - \"message\": the reply body, plain text, no quoted history\n\
    Never claim the reply was sent. It will be saved as a draft for review.";

/// Render a batch the way the filter task expects it.
pub fn format_emails(emails: &[MailMessage]) -> String {
    emails
        .iter()
        .map(|email| {
            format!(
                "ID: {}\n- Thread ID: {}\n- Snippet: {}\n- From: {}\n...............................",
                email.id, email.thread_id, email.snippet, email.sender
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn filter_task(emails: &[MailMessage]) -> String {
    format!(
        "Filter through the following emails and identify which ones require action:\n\n\
         {}\n\n\
         Determine which emails need a response or action. Consider factors like:\n\
         - Urgency of the request\n\
         - Importance of the sender\n\
         - Complexity of the task requested\n\
         - Deadline mentioned in the email",
        format_emails(emails)
    )
}

pub fn analysis_task(email: &MailMessage, thread: &[EmailMessage]) -> String {
    format!(
        "Analyze the complete thread below (Thread ID: {thread_id}). It contains email {id}, \
         which requires action.\n\
         Understand the context, key points and overall sentiment of the conversation, and \
         identify the main query or concerns the response must address.\n\n\
         {transcript}",
        thread_id = email.thread_id,
        id = email.id,
        transcript = format_thread(thread),
    )
}

pub fn writer_task(analysis_json: &str, self_address: &str) -> String {
    format!(
        "Draft a response for this action-required email thread.\n\
         Assume the persona of the user ({self_address}) and mimic the communication style \
         in the thread. Address the specific needs and concerns outlined below.\n\n\
         Thread analysis:\n{analysis_json}"
    )
}

/// Oldest-first transcript with per-message bodies capped.
pub fn format_thread(thread: &[EmailMessage]) -> String {
    thread
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            let body: String = msg.content.chars().take(THREAD_BODY_MAX_CHARS).collect();
            let date = msg
                .timestamp
                .map(|t| t.to_rfc2822())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "[{n}] From: {from}{me}\nTo: {to}\nDate: {date}\nSubject: {subject}\n\n{body}",
                n = i + 1,
                from = msg.from,
                me = if msg.is_outgoing { " (me)" } else { "" },
                to = msg.to.join(", "),
                subject = msg.subject,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
