//! Prompt assembly and reply post-processing

use chrono::{DateTime, TimeZone};
use regex_lite::Regex;
use std::sync::OnceLock;

use crate::history::GUEST_USERNAME;

/// Chunk whose text lists the human support contacts
pub const SUPPORT_CHUNK: &str = "SUPPORT";

const BASE_PROMPT: &str = "\
You are MoMoChat, a highly efficient and concise company chatbot mainly dedicated to answering customer queries based mainly on the knowledge provided for the MTN Momo Congo Products and Services.
DO NOT use outside knowledge for company specific questions, except for general questions. If the answer to a company-specific question is not contained in this knowledge base, state clearly that you do not have that information.
You can also answer other questions not related to the company in general.
Your tone should be professional and helpful.
You are multilingual, identify the user's language and answer accordingly. You also understand Lingala, that will be of great help to those who only speak Lingala.
Avoid using markdown formatting. Use well-indented bullet points (•), or (❖) when making a list of items (never use numbers), hanging indent for each item. Use (❖) for main items and use (•) for sub-items.
Here's an example output:
Eligibility Requirements
 • The customer must be active on MTN Mobile Money.
 • Must have been subscribed to MoMo for at least 6 months.
 • Since MoMo Advance is a credit facility, MTN evaluates the customer's creditworthiness to determine eligibility.
 • The customer must be at least 18 years old.

this example shows proper indentation while providing a list.";

const NO_SUPPORT: &str = "No support contacts are available.";

/// System message for one chat turn.
///
/// The `Knowledge Base Data:` section is only present when `context` has
/// content.
pub fn system_prompt<Tz>(username: &str, support: Option<&str>, context: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut prompt = String::with_capacity(BASE_PROMPT.len() + context.len() + 1024);
    prompt.push_str(BASE_PROMPT);

    prompt.push_str(
        "\nHere are references for human customer support when a problem is beyond what you can handle or beyond your knowledge base:\n",
    );
    prompt.push_str(support.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(NO_SUPPORT));

    prompt.push_str(&format!(
        "\nIn case you're asked, the current time is {}, and today's date is {}.",
        now.format("%H:%M:%S"),
        now.format("%d %B %Y"),
    ));

    prompt.push_str(&format!("\n\nThe current user's username is {}.", username));
    if username == GUEST_USERNAME {
        prompt.push_str(" Guest is not a name, it's the status of the user.");
    }
    prompt.push_str(
        "\nOccasionally respond using this name if appropriate to make the chat experience more personalized.",
    );

    let context = context.trim();
    if !context.is_empty() {
        prompt.push_str("\n\nKnowledge Base Data:\n");
        prompt.push_str(context);
    }

    prompt
}

fn line_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[#=>]\s*").expect("valid line marker pattern"))
}

fn list_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:([*-])|\d+\.)\s+(\S.*)$").expect("valid list marker pattern")
    })
}

/// Drop emphasis, heading and quote markers, keep list markers.
pub fn strip_markdown(text: &str) -> String {
    let text = text
        .replace("***", "")
        .replace("**", "")
        .replace("###", "")
        .replace("##", "")
        .replace(" ```", "")
        .replace("``", "")
        .replace("__", "");

    text.lines()
        .map(|line| line_marker().replace(line, "").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_instruction_line(line: &str) -> bool {
    line.contains("->") || line.contains('→') || line.contains("=>")
}

/// Indent list items: bullets become `•`, numbered items are renumbered
/// from 1 within each run. Lines with arrows are USSD paths and pass
/// through untouched.
pub fn enforce_list_indentation(text: &str, indent_spaces: usize) -> String {
    let indent = " ".repeat(indent_spaces);
    let mut counter = 0usize;

    text.lines()
        .map(|line| {
            if is_instruction_line(line) {
                counter = 0;
                return line.to_string();
            }

            match list_marker().captures(line) {
                Some(caps) => {
                    let content = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
                    if caps.get(1).is_some() {
                        counter = 0;
                        format!("{}• {}", indent, content)
                    } else {
                        counter += 1;
                        format!("{}{}. {}", indent, counter, content)
                    }
                }
                None => {
                    counter = 0;
                    line.to_string()
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Model reply as shown to the user
pub fn post_process(reply: &str) -> String {
    enforce_list_indentation(&strip_markdown(reply), 2)
}
